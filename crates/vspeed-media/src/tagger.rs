//! Merging voice factors and else sub-segments into the annotated timeline.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use vspeed_models::{
    check_timeline, AccelerationSettings, AnnotatedSegment, FragmentJob, Segment,
    SegmentKind, TimelineIssue,
};

use crate::motion::MotionFactors;
use crate::voice::VoiceFactors;

/// The base timeline with one factor per physical fragment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedTimeline {
    pub entries: Vec<AnnotatedSegment>,
    /// Structural problems found after merging; reported, not repaired.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<TimelineIssue>,
}

impl AnnotatedTimeline {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `voice0.588` / `else0.1` labels, in timeline order.
    pub fn labels(&self) -> Vec<String> {
        self.entries.iter().map(AnnotatedSegment::label).collect()
    }

    pub fn source_secs(&self) -> f64 {
        self.entries.iter().map(|e| e.duration_secs()).sum()
    }

    /// Output length predicted from the factors alone.
    pub fn expected_output_secs(&self) -> f64 {
        self.entries.iter().map(|e| e.expected_output_secs()).sum()
    }

    /// One encoding job per entry.
    pub fn jobs(&self, source: &Path, out_dir: &Path) -> Vec<FragmentJob> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, entry)| FragmentJob::from_segment(i, entry, PathBuf::from(source), out_dir))
            .collect()
    }
}

/// Attach factors to every segment of `timeline`.
///
/// Voice segments without a factor get the constant voice factor; else
/// segments without sub-segments are kept whole at minimum acceleration.
pub fn tag_timeline(
    timeline: &[Segment],
    voice: &VoiceFactors,
    motion: &MotionFactors,
    settings: &AccelerationSettings,
) -> AnnotatedTimeline {
    let mut entries = Vec::with_capacity(timeline.len());

    for (index, segment) in timeline.iter().enumerate() {
        match segment.kind {
            SegmentKind::Voice => {
                let factor = voice.get(index).unwrap_or_else(|| {
                    warn!(segment = index, "Voice segment without factor, using constant");
                    settings.voice_constant_factor()
                });
                entries.push(AnnotatedSegment::new(
                    segment.start_ms,
                    segment.end_ms,
                    SegmentKind::Voice,
                    factor,
                ));
            }
            SegmentKind::Else => match motion.get(&index) {
                Some(subs) if !subs.is_empty() => entries.extend(subs.iter().copied()),
                _ => {
                    let (_, slowest) = settings.motion_factor_bounds();
                    warn!(segment = index, "Else segment without sub-segments, kept whole");
                    entries.push(AnnotatedSegment::new(
                        segment.start_ms,
                        segment.end_ms,
                        SegmentKind::Else,
                        slowest,
                    ));
                }
            },
        }
    }

    entries.sort_by_key(|e| e.start_ms);

    let issues = check_timeline(entries.iter().map(|e| (e.start_ms, e.end_ms)));
    for issue in &issues {
        warn!(issue = %issue, "Annotated timeline is not contiguous");
    }

    let tagged = AnnotatedTimeline { entries, issues };
    info!(
        entries = tagged.len(),
        source_secs = tagged.source_secs(),
        expected_secs = tagged.expected_output_secs(),
        "Timeline annotated"
    );
    tagged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeline() -> Vec<Segment> {
        vec![
            Segment::new(0, 2000, SegmentKind::Voice),
            Segment::new(2000, 5000, SegmentKind::Else),
            Segment::new(5000, 6000, SegmentKind::Voice),
            Segment::new(6000, 7000, SegmentKind::Else),
        ]
    }

    #[test]
    fn test_merge_in_order() {
        let mut voice = VoiceFactors::default();
        voice.insert(0, 0.588);
        voice.insert(2, 0.8);
        let mut motion = MotionFactors::new();
        motion.insert(
            1,
            vec![
                AnnotatedSegment::new(2000, 3500, SegmentKind::Else, 0.1),
                AnnotatedSegment::new(3500, 5000, SegmentKind::Else, 0.25),
            ],
        );
        motion.insert(3, vec![AnnotatedSegment::new(6000, 7000, SegmentKind::Else, 0.5)]);

        let tagged = tag_timeline(&timeline(), &voice, &motion, &AccelerationSettings::default());
        assert!(tagged.issues.is_empty());
        assert_eq!(
            tagged.labels(),
            vec!["voice0.588", "else0.1", "else0.25", "voice0.8", "else0.5"]
        );
        assert_eq!(tagged.source_secs(), 7.0);
        let expected = 2.0 * 0.588 + 1.5 * 0.1 + 1.5 * 0.25 + 0.8 + 0.5;
        assert!((tagged.expected_output_secs() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_missing_factors_fall_back() {
        let tagged = tag_timeline(
            &timeline(),
            &VoiceFactors::default(),
            &MotionFactors::new(),
            &AccelerationSettings::default(),
        );
        assert_eq!(tagged.labels(), vec!["voice0.741", "else1", "voice0.741", "else1"]);
    }

    #[test]
    fn test_gap_reported() {
        let mut motion = MotionFactors::new();
        motion.insert(1, vec![AnnotatedSegment::new(2000, 4000, SegmentKind::Else, 0.1)]);
        let tagged = tag_timeline(
            &timeline(),
            &VoiceFactors::default(),
            &motion,
            &AccelerationSettings::default(),
        );
        assert_eq!(
            tagged.issues,
            vec![TimelineIssue::Gap {
                index: 2,
                gap_ms: 1000
            }]
        );
    }

    #[test]
    fn test_jobs_named_by_label() {
        let tagged = tag_timeline(
            &timeline()[..1],
            &VoiceFactors::default(),
            &MotionFactors::new(),
            &AccelerationSettings::default(),
        );
        let jobs = tagged.jobs(Path::new("/in/video.mp4"), Path::new("/out"));
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].output, PathBuf::from("/out/00000_voice0.741.ts"));
    }
}
