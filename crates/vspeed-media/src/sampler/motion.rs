//! Motion magnitude sampling.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use vspeed_models::{mean, percentile, Segment};

use super::MotionProbe;
use crate::command::{FfmpegCommand, FfmpegRunner, STDOUT};
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_media;

/// Rows per sliding window when reducing a magnitude field.
pub const WINDOW_ROWS: usize = 15;
/// Rows between consecutive windows.
pub const WINDOW_STEP: usize = 5;
/// Percentile of window means that marks a high-motion region.
pub const PEAK_PERCENTILE: f64 = 90.0;

/// Raw per-sample magnitudes of one span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionTrace {
    pub fps: f64,
    pub duration_secs: f64,
    pub magnitudes: Vec<f64>,
}

/// One motion measurement, positioned inside its segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    pub frame_index: u64,
    /// Seconds from the segment start.
    pub time: f64,
    /// Seconds left until the segment end.
    pub remaining: f64,
    pub magnitude: f64,
}

/// Position every magnitude of `trace` on its segment's time axis.
pub fn sample_motion(trace: &MotionTrace, frame_skip: usize) -> Vec<MotionSample> {
    trace
        .magnitudes
        .iter()
        .enumerate()
        .map(|(k, &magnitude)| {
            let frame_index = if frame_skip > 0 {
                (frame_skip + k * frame_skip) as u64
            } else {
                k as u64
            };
            let time = if trace.fps > 0.0 {
                frame_index as f64 / trace.fps
            } else {
                0.0
            };
            MotionSample {
                frame_index,
                time,
                remaining: trace.duration_secs - time,
                magnitude,
            }
        })
        .collect()
}

/// Reduce a row-major magnitude field to one number.
///
/// Means of horizontal bands ([`WINDOW_ROWS`] tall, every [`WINDOW_STEP`]
/// rows) are computed; the result is the mean of the band means strictly above
/// their 90th percentile, or the percentile itself when none is above it.
/// `None` when the field is too short for a single band.
pub fn peak_window_magnitude(field: &[f64], width: usize, height: usize) -> Option<f64> {
    if width == 0 || field.len() < width * height || height <= WINDOW_ROWS {
        return None;
    }

    let band_means: Vec<f64> = (0..height - WINDOW_ROWS)
        .step_by(WINDOW_STEP)
        .filter_map(|row| mean(&field[row * width..(row + WINDOW_ROWS) * width]))
        .collect();

    let threshold = percentile(&band_means, PEAK_PERCENTILE)?;
    let above: Vec<f64> = band_means.into_iter().filter(|m| *m > threshold).collect();
    Some(mean(&above).unwrap_or(threshold))
}

/// Absolute per-pixel difference of two grayscale frames.
fn frame_difference(previous: &[u8], current: &[u8]) -> Vec<f64> {
    previous
        .iter()
        .zip(current)
        .map(|(a, b)| (*a as f64 - *b as f64).abs())
        .collect()
}

/// Motion probe that decodes downscaled grayscale frames through FFmpeg.
///
/// Every `frame_skip`-th frame is compared with the previously sampled one;
/// the absolute difference serves as the magnitude field.
///
/// This approximates optical flow. Magnitudes are grayscale pixel differences
/// in `0..=255`, not flow vectors in pixels per frame, so percentiles derived
/// from them only make sense relative to each other.
#[derive(Debug, Clone)]
pub struct FfmpegMotionProbe {
    runner: FfmpegRunner,
    width: usize,
    height: usize,
}

impl FfmpegMotionProbe {
    pub fn new(runner: FfmpegRunner) -> Self {
        Self {
            runner,
            width: 160,
            height: 90,
        }
    }

    /// Builder-style setter for the analysis resolution.
    pub fn with_resolution(mut self, width: usize, height: usize) -> Self {
        self.width = width.max(1);
        self.height = height.max(1);
        self
    }

    fn command(&self, source: &Path, segment: &Segment, frame_skip: usize) -> FfmpegCommand {
        let step = frame_skip.max(1);
        FfmpegCommand::new(source, STDOUT)
            .span(segment.start_secs(), segment.end_secs())
            .video_filter(format!(
                "select=not(mod(n\\,{})),scale={}:{},format=gray",
                step, self.width, self.height
            ))
            .no_audio()
            .output_args(["-fps_mode", "passthrough", "-pix_fmt", "gray"])
            .format("rawvideo")
    }

    fn magnitudes(&self, raw: &[u8]) -> Vec<f64> {
        let frame_size = self.width * self.height;
        let mut frames = raw.chunks_exact(frame_size);
        let Some(mut previous) = frames.next() else {
            return Vec::new();
        };

        let mut magnitudes = Vec::new();
        for frame in frames {
            let field = frame_difference(previous, frame);
            if let Some(value) = peak_window_magnitude(&field, self.width, self.height) {
                magnitudes.push(value);
            }
            previous = frame;
        }
        magnitudes
    }
}

#[async_trait]
impl MotionProbe for FfmpegMotionProbe {
    async fn trace(
        &self,
        source: &Path,
        segment: &Segment,
        frame_skip: usize,
    ) -> MediaResult<MotionTrace> {
        let info = probe_media(source).await?;
        let fps = info
            .fps
            .ok_or_else(|| MediaError::invalid_media("no video stream to measure motion on"))?;

        let raw = self
            .runner
            .run_capture(&self.command(source, segment, frame_skip))
            .await?;
        let magnitudes = self.magnitudes(&raw);

        debug!(
            start_ms = segment.start_ms,
            end_ms = segment.end_ms,
            fps,
            samples = magnitudes.len(),
            "Motion trace extracted"
        );

        Ok(MotionTrace {
            fps,
            duration_secs: segment.duration_secs(),
            magnitudes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vspeed_models::SegmentKind;

    #[test]
    fn test_sample_motion_positions() {
        let trace = MotionTrace {
            fps: 25.0,
            duration_secs: 2.0,
            magnitudes: vec![1.0, 2.0, 3.0],
        };
        let samples = sample_motion(&trace, 5);
        assert_eq!(samples[0].frame_index, 5);
        assert_eq!(samples[2].frame_index, 15);
        assert!((samples[0].time - 0.2).abs() < 1e-9);
        assert!((samples[2].remaining - 1.4).abs() < 1e-9);

        let unskipped = sample_motion(&trace, 0);
        assert_eq!(unskipped[0].frame_index, 0);
        assert_eq!(unskipped[1].time, 1.0 / 25.0);
    }

    #[test]
    fn test_peak_window_uniform_field() {
        let field = vec![2.0; 10 * 40];
        // Every band has the same mean, so nothing is strictly above the percentile.
        assert_eq!(peak_window_magnitude(&field, 10, 40), Some(2.0));
    }

    #[test]
    fn test_peak_window_picks_hot_band() {
        let width = 4;
        let height = 66;
        let mut field = vec![0.0; width * height];
        // Light up the top 15 rows: only band 0 covers them fully.
        for value in field.iter_mut().take(width * 15) {
            *value = 10.0;
        }
        let peak = peak_window_magnitude(&field, width, height).unwrap();
        assert!((peak - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_peak_window_too_short() {
        assert_eq!(peak_window_magnitude(&[1.0; 15 * 3], 3, 15), None);
        assert_eq!(peak_window_magnitude(&[], 0, 40), None);
    }

    #[test]
    fn test_magnitudes_from_raw_frames() {
        let probe = FfmpegMotionProbe::new(FfmpegRunner::new()).with_resolution(2, 20);
        let mut raw = vec![0u8; 40];
        raw.extend(vec![4u8; 40]);
        raw.extend(vec![4u8; 40]);
        let magnitudes = probe.magnitudes(&raw);
        assert_eq!(magnitudes, vec![4.0, 0.0]);
    }

    #[test]
    fn test_difference_is_in_pixel_units() {
        assert_eq!(frame_difference(&[0, 255, 10], &[255, 0, 10]), vec![255.0, 255.0, 0.0]);
    }

    #[test]
    fn test_probe_command_selects_frames() {
        let probe = FfmpegMotionProbe::new(FfmpegRunner::new());
        let segment = Segment::new(1000, 4000, SegmentKind::Else);
        let args = probe
            .command(Path::new("in.mp4"), &segment, 5)
            .build_args();
        assert!(args
            .iter()
            .any(|a| a == "select=not(mod(n\\,5)),scale=160:90,format=gray"));
        assert_eq!(args.last().unwrap(), STDOUT);
    }
}
