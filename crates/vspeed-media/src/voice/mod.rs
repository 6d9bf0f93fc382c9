//! Speech-rate normalization of voice segments.
//!
//! Subtitle lines are sanitized, transcribed to phonemes in one request and
//! measured as phonemes per second. Rates of nearby lines are pooled into
//! groups, mapped linearly onto a target range and turned into one bounded
//! inverse-speed factor per voice segment.
//!
//! ```text
//! subtitles ─► sanitize ─► transcribe ─► measure ─► group ─► quality
//!                                                              │
//!        VoiceFactors ◄─ segment_factor ◄─ map_accelerations ◄─┘
//! ```
//!
//! Every failure degrades to the constant voice factor; nothing here returns
//! an error to the caller.

mod audit;
mod normalize;
mod quality;
mod rate;
mod sanitize;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vspeed_models::{AccelerationSettings, Segment, SettingWarning, SubtitleLine, VoiceReference};

use crate::sampler::{LanguageDetector, PhonemeTranscriber};

pub use audit::AuditTable;
pub use normalize::{
    correct_target_speeds, map_accelerations, segment_factor, SegmentFactor, TargetSpeeds,
};
pub use quality::{assess_quality, QualityCriteria, QualityIssue, QualityReport};
pub use rate::{group_lines, measure_lines, with_group_rates, LineGroup, LineMeasurement, PreparedLine};
pub use sanitize::sanitize_text;

/// Voice factor per base-timeline index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoiceFactors(BTreeMap<usize, f64>);

impl VoiceFactors {
    /// Same factor for every voice segment of `timeline`.
    pub fn constant(timeline: &[Segment], factor: f64) -> Self {
        Self(
            timeline
                .iter()
                .enumerate()
                .filter(|(_, s)| s.kind.is_voice())
                .map(|(i, _)| (i, factor))
                .collect(),
        )
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.0.get(&index).copied()
    }

    pub fn insert(&mut self, index: usize, factor: f64) {
        self.0.insert(index, factor);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.0.iter().map(|(i, f)| (*i, *f))
    }
}

/// Everything produced by one normalization run.
#[derive(Debug, Clone, Default)]
pub struct VoiceOutcome {
    pub factors: VoiceFactors,
    pub lines: Vec<LineMeasurement>,
    pub audit: AuditTable,
    pub quality: Option<QualityReport>,
    pub targets: Option<TargetSpeeds>,
    pub warnings: Vec<SettingWarning>,
    /// True when the constant factor was used for every voice segment.
    pub constant: bool,
}

impl VoiceOutcome {
    fn constant(timeline: &[Segment], settings: &AccelerationSettings) -> Self {
        Self {
            factors: VoiceFactors::constant(timeline, settings.voice_constant_factor()),
            constant: true,
            ..Default::default()
        }
    }
}

/// Sanitize subtitle text and drop lines left empty.
pub fn prepare_lines(subtitles: &[SubtitleLine]) -> Vec<PreparedLine> {
    subtitles
        .iter()
        .enumerate()
        .filter_map(|(index, line)| {
            let graphemes = sanitize_text(&line.text);
            if graphemes.is_empty() {
                debug!(line = index, "Dropping subtitle line without text");
                None
            } else {
                Some(PreparedLine {
                    index,
                    line: line.clone(),
                    graphemes,
                })
            }
        })
        .collect()
}

/// Computes voice factors from a subtitle track.
pub struct SpeechRateNormalizer {
    transcriber: Arc<dyn PhonemeTranscriber>,
    detector: Arc<dyn LanguageDetector>,
}

impl SpeechRateNormalizer {
    pub fn new(transcriber: Arc<dyn PhonemeTranscriber>, detector: Arc<dyn LanguageDetector>) -> Self {
        Self {
            transcriber,
            detector,
        }
    }

    /// Factor for every voice segment of `timeline`.
    pub async fn normalize(
        &self,
        timeline: &[Segment],
        subtitles: &[SubtitleLine],
        settings: &AccelerationSettings,
    ) -> VoiceOutcome {
        if settings.voice_reference == VoiceReference::Constant {
            info!(
                factor = settings.voice_constant_factor(),
                "Constant voice reference, skipping speech-rate measurement"
            );
            return VoiceOutcome::constant(timeline, settings);
        }

        let prepared = prepare_lines(subtitles);
        if prepared.is_empty() {
            warn!(
                lines = subtitles.len(),
                "No subtitle line has usable text, using constant voice factor"
            );
            return VoiceOutcome::constant(timeline, settings);
        }

        let corpus: Vec<String> = prepared.iter().map(|p| p.graphemes.clone()).collect();
        let phonemes = match self.transcriber.transcribe(&corpus, &settings.language).await {
            Ok(phonemes) => phonemes,
            Err(e) => {
                warn!(error = %e, "Phoneme transcription failed, using constant voice factor");
                return VoiceOutcome::constant(timeline, settings);
            }
        };
        if phonemes.len() != prepared.len() {
            warn!(
                expected = prepared.len(),
                received = phonemes.len(),
                "Transcription is not aligned with the subtitle lines, using constant voice factor"
            );
            return VoiceOutcome::constant(timeline, settings);
        }

        let measured = measure_lines(&prepared, &phonemes);
        let groups = group_lines(&measured, settings.group_gap_threshold);
        let rated = with_group_rates(&measured, &groups);
        debug!(lines = rated.len(), groups = groups.len(), "Measured speaking rates");

        let criteria = QualityCriteria {
            min_speed: settings.min_speed,
            max_speed: settings.max_speed,
            min_line_count: settings.min_subtitle_count,
            language: &settings.language,
        };
        let quality = assess_quality(&rated, &criteria, self.detector.as_ref());
        info!(
            score = quality.score,
            errors = quality.error_count(),
            mean_speed_1s = ?quality.mean_speed_1s,
            "Subtitle track assessed"
        );

        let (Some(mean_speed_1s), Some(max_speed_1s)) = (quality.mean_speed_1s, quality.max_speed_1s)
        else {
            warn!("No line has a measurable speaking rate, using constant voice factor");
            return VoiceOutcome {
                audit: AuditTable::new(&rated, Some(&quality), None),
                lines: rated,
                quality: Some(quality),
                ..VoiceOutcome::constant(timeline, settings)
            };
        };

        let (targets, warnings) = correct_target_speeds(
            settings.target_min_speed,
            settings.target_max_speed,
            mean_speed_1s,
            max_speed_1s,
        );
        for warning in &warnings {
            warn!(field = %warning.field, "{}", warning.message);
        }

        let mapped = map_accelerations(&rated, &targets);
        let bounds = settings.voice_factor_bounds();
        let fallback = settings.voice_constant_factor();

        let mut factors = VoiceFactors::default();
        for (index, segment) in timeline.iter().enumerate() {
            if !segment.kind.is_voice() {
                continue;
            }
            match segment_factor(segment, &mapped, bounds) {
                Some(result) => {
                    if result.was_bounded() {
                        info!(
                            segment = index,
                            raw = result.raw,
                            factor = result.factor,
                            "Voice factor bounded"
                        );
                    }
                    debug!(
                        segment = index,
                        lines = result.contributing_lines,
                        factor = result.factor,
                        "Voice factor"
                    );
                    factors.insert(index, result.factor);
                }
                None => {
                    debug!(segment = index, factor = fallback, "Voice segment without lines");
                    factors.insert(index, fallback);
                }
            }
        }

        VoiceOutcome {
            factors,
            audit: AuditTable::new(&mapped, Some(&quality), Some(&targets)),
            lines: mapped,
            quality: Some(quality),
            targets: Some(targets),
            warnings,
            constant: false,
        }
    }
}
