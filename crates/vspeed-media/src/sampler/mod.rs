//! Signal sampling: motion traces, scene cuts, phonemes and language.
//!
//! Every extraction goes through a trait so the engine can be driven by
//! in-process fakes. The provided implementations shell out to FFmpeg and
//! espeak, or use `whatlang` for language identification.

mod language;
mod motion;
mod phonemes;
mod scene;

use std::path::Path;

use async_trait::async_trait;
use vspeed_models::Segment;

use crate::error::MediaResult;

pub use language::WhatlangDetector;
pub use motion::{
    peak_window_magnitude, sample_motion, FfmpegMotionProbe, MotionSample, MotionTrace,
    PEAK_PERCENTILE, WINDOW_ROWS, WINDOW_STEP,
};
pub use phonemes::{count_phonemes, split_nuclei, EspeakTranscriber, ESPEAK_SEPARATOR};
pub use scene::{parse_scene_cuts, FfmpegSceneDetector};

/// Produces a per-sample motion magnitude series for one span of a source.
#[async_trait]
pub trait MotionProbe: Send + Sync {
    async fn trace(
        &self,
        source: &Path,
        segment: &Segment,
        frame_skip: usize,
    ) -> MediaResult<MotionTrace>;
}

/// Finds scene cuts inside one span of a source.
#[async_trait]
pub trait SceneCutDetector: Send + Sync {
    /// Cut times relative to the span start, terminated by the span duration.
    async fn scene_cuts(&self, source: &Path, segment: &Segment, threshold: f64)
        -> MediaResult<Vec<f64>>;
}

/// Converts grapheme text to phoneme strings.
#[async_trait]
pub trait PhonemeTranscriber: Send + Sync {
    /// Transcribe the whole corpus in one request; output holds one string per
    /// sample, in input order.
    async fn transcribe(&self, samples: &[String], language: &str) -> MediaResult<Vec<String>>;
}

/// Identifies the language of a text.
pub trait LanguageDetector: Send + Sync {
    /// ISO 639-1 code, `None` when undecided.
    fn detect(&self, text: &str) -> Option<String>;
}
