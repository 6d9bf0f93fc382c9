#![deny(unreachable_patterns)]
//! Adaptive acceleration engine for long-form video.
//!
//! This crate provides:
//! - Signal sampling through FFmpeg, espeak and `whatlang`
//! - Speech-rate normalization of voice segments
//! - Motion-driven, scene-aware acceleration of else segments
//! - Merging of both into an annotated timeline
//! - Fragment encoding and concatenation
//! - Subtitle reconstruction from measured fragment durations

/// Lazily compiled regex for a literal pattern.
macro_rules! regex {
    ($re:literal $(,)?) => {{
        static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
        RE.get_or_init(|| regex::Regex::new($re).unwrap())
    }};
}

pub mod command;
pub mod encoder;
pub mod error;
pub mod motion;
pub mod probe;
pub mod reconstruct;
pub mod sampler;
pub mod tagger;
pub mod voice;

pub use command::{check_ffmpeg, check_ffprobe, check_tool, FfmpegCommand, FfmpegRunner};
pub use encoder::{
    atempo_chain, retime, retime_factor, Concatenator, EncodeSettings, FfmpegConcatenator,
    FfmpegFragmentEncoder, FfmpegRetimer, FragmentEncoder, Retimer,
};
pub use error::{MediaError, MediaResult};
pub use motion::{GlobalMotionStats, MotionFactors, MotionParams, MotionSegmenter};
pub use probe::{probe_duration, probe_media, MediaInfo};
pub use reconstruct::{reconstruct, reduction_factor, Reconstruction};
pub use sampler::{
    EspeakTranscriber, FfmpegMotionProbe, FfmpegSceneDetector, LanguageDetector, MotionProbe,
    PhonemeTranscriber, SceneCutDetector, WhatlangDetector,
};
pub use tagger::{tag_timeline, AnnotatedTimeline};
pub use voice::{AuditTable, QualityReport, SpeechRateNormalizer, VoiceFactors, VoiceOutcome};
