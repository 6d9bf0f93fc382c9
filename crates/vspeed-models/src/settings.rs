//! Acceleration settings and their lenient resolution.
//!
//! Settings arrive as raw strings (environment variables, CLI). Resolution
//! never fails: anything unusable is replaced by its default and reported as a
//! [`SettingWarning`].

use serde::{Deserialize, Serialize};

use crate::utils::{round_to, FACTOR_DECIMALS};

pub const DEFAULT_ACC_VOICE_MAX: f64 = 1.7;
pub const DEFAULT_ACC_VOICE_MIN: f64 = 1.0;
pub const DEFAULT_ACC_MOTION_MAX: f64 = 10.0;
pub const DEFAULT_ACC_MOTION_MIN: f64 = 1.0;
pub const DEFAULT_MIN_VIDEO_DURATION: f64 = 1.0;
pub const DEFAULT_MIN_ACC_SCENE_DURATION: f64 = 0.5;
pub const DEFAULT_GROUP_GAP_THRESHOLD: f64 = 1.0;
pub const DEFAULT_FRAME_SKIP: usize = 5;
pub const DEFAULT_SCENE_CUT_THRESHOLD: f64 = 0.2;
pub const DEFAULT_LANGUAGE: &str = "es";
pub const DEFAULT_MIN_SPEED: f64 = 4.0;
pub const DEFAULT_MAX_SPEED: f64 = 20.0;
pub const DEFAULT_MIN_SUBTITLE_COUNT: usize = 50;

/// Unparsed settings, one optional string per parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSettings {
    pub acc_voice_max: Option<String>,
    pub acc_voice_min: Option<String>,
    pub acc_motion_max: Option<String>,
    pub acc_motion_min: Option<String>,
    pub min_video_duration: Option<String>,
    pub min_acc_scene_duration: Option<String>,
    pub group_gap_threshold: Option<String>,
    pub frame_skip: Option<String>,
    pub scene_cut_threshold: Option<String>,
    pub language: Option<String>,
    pub min_speed: Option<String>,
    pub max_speed: Option<String>,
    pub min_subtitle_count: Option<String>,
    pub target_min_speed: Option<String>,
    pub target_max_speed: Option<String>,
}

impl RawSettings {
    /// Build from any key lookup, e.g. the process environment.
    ///
    /// Keys are upper-cased field names with `prefix` prepended.
    pub fn from_lookup<F>(prefix: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{}{}", prefix, name));
        Self {
            acc_voice_max: get("ACC_VOICE_MAX"),
            acc_voice_min: get("ACC_VOICE_MIN"),
            acc_motion_max: get("ACC_MOTION_MAX"),
            acc_motion_min: get("ACC_MOTION_MIN"),
            min_video_duration: get("MIN_VIDEO_DURATION"),
            min_acc_scene_duration: get("MIN_ACC_SCENE_DURATION"),
            group_gap_threshold: get("GROUP_GAP_THRESHOLD"),
            frame_skip: get("FRAME_SKIP"),
            scene_cut_threshold: get("SCENE_CUT_THRESHOLD"),
            language: get("LANGUAGE"),
            min_speed: get("MIN_SPEED"),
            max_speed: get("MAX_SPEED"),
            min_subtitle_count: get("MIN_SUBTITLE_COUNT"),
            target_min_speed: get("TARGET_MIN_SPEED"),
            target_max_speed: get("TARGET_MAX_SPEED"),
        }
    }
}

/// A substituted or suspicious setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingWarning {
    pub field: String,
    pub message: String,
}

impl SettingWarning {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SettingWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Where voice accelerations come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceReference {
    /// Measure the speaking rate from the subtitle track.
    #[default]
    Subtitles,
    /// No usable text: every voice segment gets the constant factor.
    Constant,
}

/// Fully resolved acceleration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccelerationSettings {
    pub acc_voice_max: f64,
    pub acc_voice_min: f64,
    pub acc_motion_max: f64,
    pub acc_motion_min: f64,
    /// Seconds; also the hysteresis window length.
    pub min_video_duration: f64,
    /// Seconds an accelerated scene must last at least.
    pub min_acc_scene_duration: f64,
    /// Seconds between voice lines still grouped together.
    pub group_gap_threshold: f64,
    pub frame_skip: usize,
    pub scene_cut_threshold: f64,
    /// ISO 639-1 code of the expected speech language.
    pub language: String,
    /// Phonemes per second below which a line counts as slow.
    pub min_speed: f64,
    /// Phonemes per second above which a line counts as fast.
    pub max_speed: f64,
    pub min_subtitle_count: usize,
    /// Parsed but uncorrected; fixed once corpus statistics exist.
    pub target_min_speed: Option<f64>,
    pub target_max_speed: Option<f64>,
    pub voice_reference: VoiceReference,
    /// Skip motion analysis and use `acc_motion_constant` for all else segments.
    pub podcast: bool,
    pub acc_motion_constant: f64,
}

impl Default for AccelerationSettings {
    fn default() -> Self {
        Self {
            acc_voice_max: DEFAULT_ACC_VOICE_MAX,
            acc_voice_min: DEFAULT_ACC_VOICE_MIN,
            acc_motion_max: DEFAULT_ACC_MOTION_MAX,
            acc_motion_min: DEFAULT_ACC_MOTION_MIN,
            min_video_duration: DEFAULT_MIN_VIDEO_DURATION,
            min_acc_scene_duration: DEFAULT_MIN_ACC_SCENE_DURATION,
            group_gap_threshold: DEFAULT_GROUP_GAP_THRESHOLD,
            frame_skip: DEFAULT_FRAME_SKIP,
            scene_cut_threshold: DEFAULT_SCENE_CUT_THRESHOLD,
            language: DEFAULT_LANGUAGE.to_string(),
            min_speed: DEFAULT_MIN_SPEED,
            max_speed: DEFAULT_MAX_SPEED,
            min_subtitle_count: DEFAULT_MIN_SUBTITLE_COUNT,
            target_min_speed: None,
            target_max_speed: None,
            voice_reference: VoiceReference::Subtitles,
            podcast: false,
            acc_motion_constant: DEFAULT_ACC_MOTION_MAX,
        }
    }
}

struct Resolver {
    warnings: Vec<SettingWarning>,
}

impl Resolver {
    fn parse_f64(&mut self, field: &str, raw: &Option<String>) -> Option<f64> {
        let raw = raw.as_deref()?.trim();
        match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => Some(v),
            _ => {
                self.warnings
                    .push(SettingWarning::new(field, format!("'{}' is not a number", raw)));
                None
            }
        }
    }

    fn positive(&mut self, field: &str, raw: &Option<String>, default: f64) -> f64 {
        match self.parse_f64(field, raw) {
            Some(v) if v > 0.0 => v,
            Some(v) => {
                self.warnings.push(SettingWarning::new(
                    field,
                    format!("{} is not positive, using {}", v, default),
                ));
                default
            }
            None => default,
        }
    }

    fn count(&mut self, field: &str, raw: &Option<String>, default: usize) -> usize {
        let Some(raw) = raw.as_deref().map(str::trim) else {
            return default;
        };
        match raw.parse::<usize>() {
            Ok(v) => v,
            Err(_) => {
                self.warnings.push(SettingWarning::new(
                    field,
                    format!("'{}' is not a non-negative integer, using {}", raw, default),
                ));
                default
            }
        }
    }
}

impl AccelerationSettings {
    /// Resolve raw settings, substituting defaults for unusable values.
    pub fn resolve(raw: &RawSettings) -> (Self, Vec<SettingWarning>) {
        let mut r = Resolver {
            warnings: Vec::new(),
        };

        let acc_voice_max = r.positive("acc_voice_max", &raw.acc_voice_max, DEFAULT_ACC_VOICE_MAX);
        let acc_voice_min = r.positive("acc_voice_min", &raw.acc_voice_min, DEFAULT_ACC_VOICE_MIN);
        if acc_voice_max < acc_voice_min {
            r.warnings.push(SettingWarning::new(
                "acc_voice_max",
                format!("{} is below acc_voice_min {}", acc_voice_max, acc_voice_min),
            ));
        }

        let acc_motion_max =
            r.positive("acc_motion_max", &raw.acc_motion_max, DEFAULT_ACC_MOTION_MAX);
        let acc_motion_min =
            r.positive("acc_motion_min", &raw.acc_motion_min, DEFAULT_ACC_MOTION_MIN);
        if acc_motion_max < acc_motion_min {
            r.warnings.push(SettingWarning::new(
                "acc_motion_max",
                format!("{} is below acc_motion_min {}", acc_motion_max, acc_motion_min),
            ));
        }

        let group_gap_threshold = r
            .parse_f64("group_gap_threshold", &raw.group_gap_threshold)
            .unwrap_or(DEFAULT_GROUP_GAP_THRESHOLD);
        let recommended = (DEFAULT_GROUP_GAP_THRESHOLD / 4.0)..=(DEFAULT_GROUP_GAP_THRESHOLD * 2.0);
        if !recommended.contains(&group_gap_threshold) {
            r.warnings.push(SettingWarning::new(
                "group_gap_threshold",
                format!(
                    "{} is outside the recommended range [{}, {}]",
                    group_gap_threshold,
                    recommended.start(),
                    recommended.end()
                ),
            ));
        }

        let min_video_duration = r.positive(
            "min_video_duration",
            &raw.min_video_duration,
            DEFAULT_MIN_VIDEO_DURATION,
        );
        let min_acc_scene_duration = r.positive(
            "min_acc_scene_duration",
            &raw.min_acc_scene_duration,
            DEFAULT_MIN_ACC_SCENE_DURATION,
        );
        if min_video_duration < min_acc_scene_duration {
            r.warnings.push(SettingWarning::new(
                "min_video_duration",
                format!(
                    "{} is below min_acc_scene_duration {}",
                    min_video_duration, min_acc_scene_duration
                ),
            ));
        }
        if min_video_duration > group_gap_threshold {
            r.warnings.push(SettingWarning::new(
                "min_video_duration",
                format!(
                    "{} exceeds group_gap_threshold {}, short fragments may not be accelerated as expected",
                    min_video_duration, group_gap_threshold
                ),
            ));
        }

        let frame_skip = r.count("frame_skip", &raw.frame_skip, DEFAULT_FRAME_SKIP);

        let scene_cut_threshold = match r.parse_f64("scene_cut_threshold", &raw.scene_cut_threshold)
        {
            Some(v) if v > 0.0 && v < 1.0 => v,
            Some(v) => {
                r.warnings.push(SettingWarning::new(
                    "scene_cut_threshold",
                    format!("{} is outside (0, 1), using {}", v, DEFAULT_SCENE_CUT_THRESHOLD),
                ));
                DEFAULT_SCENE_CUT_THRESHOLD
            }
            None => DEFAULT_SCENE_CUT_THRESHOLD,
        };

        let language = match raw.language.as_deref().map(str::trim) {
            Some(lang) if !lang.is_empty() && lang.chars().all(|c| c.is_ascii_alphabetic()) => {
                lang.to_ascii_lowercase()
            }
            Some(lang) => {
                r.warnings.push(SettingWarning::new(
                    "language",
                    format!("'{}' is not a language code, using {}", lang, DEFAULT_LANGUAGE),
                ));
                DEFAULT_LANGUAGE.to_string()
            }
            None => DEFAULT_LANGUAGE.to_string(),
        };

        let min_speed = r.positive("min_speed", &raw.min_speed, DEFAULT_MIN_SPEED);
        let max_speed = r.positive("max_speed", &raw.max_speed, DEFAULT_MAX_SPEED);
        let min_subtitle_count = r.count(
            "min_subtitle_count",
            &raw.min_subtitle_count,
            DEFAULT_MIN_SUBTITLE_COUNT,
        );

        let target_min_speed = r.parse_f64("target_min_speed", &raw.target_min_speed);
        let target_max_speed = r.parse_f64("target_max_speed", &raw.target_max_speed);

        let settings = Self {
            acc_voice_max,
            acc_voice_min,
            acc_motion_max,
            acc_motion_min,
            min_video_duration,
            min_acc_scene_duration,
            group_gap_threshold,
            frame_skip,
            scene_cut_threshold,
            language,
            min_speed,
            max_speed,
            min_subtitle_count,
            target_min_speed,
            target_max_speed,
            voice_reference: VoiceReference::Subtitles,
            podcast: false,
            acc_motion_constant: acc_motion_max,
        };

        (settings, r.warnings)
    }

    /// Builder-style setter for podcast mode.
    pub fn with_podcast(mut self, podcast: bool) -> Self {
        self.podcast = podcast;
        self
    }

    /// Builder-style setter for the voice reference.
    pub fn with_voice_reference(mut self, reference: VoiceReference) -> Self {
        self.voice_reference = reference;
        self
    }

    /// Builder-style setter for the target speed range.
    pub fn with_target_speeds(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.target_min_speed = min;
        self.target_max_speed = max;
        self
    }

    /// Inverse factor used for voice segments without a measurement.
    pub fn voice_constant_factor(&self) -> f64 {
        round_to(
            2.0 / (self.acc_voice_max + self.acc_voice_min),
            FACTOR_DECIMALS,
        )
    }

    /// Inverse factor used for every else segment in podcast mode.
    pub fn motion_constant_factor(&self) -> f64 {
        round_to(1.0 / self.acc_motion_constant, FACTOR_DECIMALS)
    }

    /// Allowed voice factor range `(lowest, highest)`.
    pub fn voice_factor_bounds(&self) -> (f64, f64) {
        (1.0 / self.acc_voice_max, 1.0 / self.acc_voice_min)
    }

    /// Allowed motion factor range `(lowest, highest)`.
    pub fn motion_factor_bounds(&self) -> (f64, f64) {
        (1.0 / self.acc_motion_max, 1.0 / self.acc_motion_min)
    }
}
