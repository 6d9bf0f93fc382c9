//! Fragment encoding, concatenation and uniform retiming through FFmpeg.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};
use vspeed_models::FragmentJob;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_duration;

/// Slowest and fastest tempo a single `atempo` stage accepts.
pub const ATEMPO_RANGE: (f64, f64) = (0.5, 2.0);

/// Split a tempo change into `atempo` stages that each stay in range.
///
/// The product of the stages equals `speedup`; `1.0` needs no stage.
pub fn atempo_chain(speedup: f64) -> Vec<f64> {
    let (slowest, fastest) = ATEMPO_RANGE;
    let mut stages = Vec::new();
    if !(speedup.is_finite() && speedup > 0.0) {
        return stages;
    }
    let mut rest = speedup;
    while rest > fastest {
        stages.push(fastest);
        rest /= fastest;
    }
    while rest < slowest {
        stages.push(slowest);
        rest /= slowest;
    }
    if (rest - 1.0).abs() > 1e-9 {
        stages.push(rest);
    }
    stages
}

fn atempo_filter(speedup: f64) -> Option<String> {
    let stages = atempo_chain(speedup);
    if stages.is_empty() {
        return None;
    }
    Some(
        stages
            .iter()
            .map(|s| format!("atempo={}", trim_number(*s)))
            .collect::<Vec<_>>()
            .join(","),
    )
}

fn trim_number(value: f64) -> String {
    let fixed = format!("{:.6}", value);
    fixed.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Encoding parameters shared by fragments and retiming.
#[derive(Debug, Clone)]
pub struct EncodeSettings {
    pub video_codec: String,
    pub preset: String,
    pub crf: u8,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub has_video: bool,
    pub has_audio: bool,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            preset: "veryfast".to_string(),
            crf: 20,
            audio_codec: "aac".to_string(),
            audio_bitrate: "128k".to_string(),
            has_video: true,
            has_audio: true,
        }
    }
}

impl EncodeSettings {
    /// Builder-style setter for the streams present in the source.
    pub fn with_streams(mut self, has_video: bool, has_audio: bool) -> Self {
        self.has_video = has_video;
        self.has_audio = has_audio;
        self
    }

    /// Apply `factor` (inverse speed) to both streams.
    fn apply(&self, mut cmd: FfmpegCommand, factor: f64) -> FfmpegCommand {
        if self.has_video {
            cmd = cmd
                .video_filter(format!("setpts={}*PTS", trim_number(factor)))
                .video_codec(self.video_codec.as_str())
                .output_args([
                    "-preset",
                    self.preset.as_str(),
                    "-crf",
                    self.crf.to_string().as_str(),
                ]);
        } else {
            cmd = cmd.no_video();
        }
        if self.has_audio {
            if let Some(filter) = atempo_filter(1.0 / factor) {
                cmd = cmd.audio_filter(filter);
            }
            cmd = cmd
                .audio_codec(self.audio_codec.as_str())
                .output_args(["-b:a", self.audio_bitrate.as_str()]);
        } else {
            cmd = cmd.no_audio();
        }
        cmd
    }
}

/// Produces one physical fragment per job.
#[async_trait]
pub trait FragmentEncoder: Send + Sync {
    /// Encode `job` and return the measured duration of the written file.
    async fn encode(&self, job: &FragmentJob) -> MediaResult<f64>;
}

/// Joins encoded fragments into one output.
#[async_trait]
pub trait Concatenator: Send + Sync {
    /// Concatenate `parts` in order and return the measured output duration.
    async fn concat(&self, parts: &[PathBuf], output: &Path) -> MediaResult<f64>;
}

/// Fragment encoder writing MPEG-TS through FFmpeg.
#[derive(Debug, Clone, Default)]
pub struct FfmpegFragmentEncoder {
    runner: FfmpegRunner,
    settings: EncodeSettings,
}

impl FfmpegFragmentEncoder {
    pub fn new(runner: FfmpegRunner, settings: EncodeSettings) -> Self {
        Self { runner, settings }
    }

    pub fn command(&self, job: &FragmentJob) -> FfmpegCommand {
        let cmd = FfmpegCommand::new(&job.source, &job.output).span(
            job.start_ms as f64 / 1000.0,
            job.end_ms as f64 / 1000.0,
        );
        self.settings
            .apply(cmd, job.factor)
            .output_args(["-avoid_negative_ts", "make_zero"])
            .format("mpegts")
    }
}

#[async_trait]
impl FragmentEncoder for FfmpegFragmentEncoder {
    async fn encode(&self, job: &FragmentJob) -> MediaResult<f64> {
        if job.factor <= 0.0 || !job.factor.is_finite() {
            return Err(MediaError::internal(format!(
                "fragment {} has unusable factor {}",
                job.index, job.factor
            )));
        }
        if let Some(parent) = job.output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        self.runner.run(&self.command(job)).await?;
        let measured = probe_duration(&job.output).await?;
        debug!(
            fragment = job.index,
            factor = job.factor,
            span_secs = job.duration_secs(),
            measured,
            "Fragment encoded"
        );
        Ok(measured)
    }
}

/// Render a concat demuxer list.
pub fn concat_list(parts: &[PathBuf]) -> String {
    parts
        .iter()
        .map(|p| format!("file '{}'\n", p.display().to_string().replace('\'', "'\\''")))
        .collect()
}

/// Concatenator using the concat demuxer with stream copy.
#[derive(Debug, Clone, Default)]
pub struct FfmpegConcatenator {
    runner: FfmpegRunner,
}

impl FfmpegConcatenator {
    pub fn new(runner: FfmpegRunner) -> Self {
        Self { runner }
    }

    pub fn command(list: &Path, output: &Path) -> FfmpegCommand {
        let cmd = FfmpegCommand::new(list, output)
            .input_args(["-f", "concat", "-safe", "0"])
            .output_args(["-c", "copy"]);
        let is_mp4 = output
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| e.eq_ignore_ascii_case("mp4") || e.eq_ignore_ascii_case("mov"));
        if is_mp4 {
            cmd.output_args(["-movflags", "+faststart"])
        } else {
            cmd
        }
    }
}

#[async_trait]
impl Concatenator for FfmpegConcatenator {
    async fn concat(&self, parts: &[PathBuf], output: &Path) -> MediaResult<f64> {
        if parts.is_empty() {
            return Err(MediaError::internal("nothing to concatenate"));
        }
        let dir = tempfile::tempdir()?;
        let list = dir.path().join("concat.txt");
        tokio::fs::write(&list, concat_list(parts)).await?;

        self.runner.run(&Self::command(&list, output)).await?;
        let measured = probe_duration(output).await?;
        info!(parts = parts.len(), measured, "Fragments concatenated");
        Ok(measured)
    }
}

/// Uniform factor that brings `current_secs` to `target_secs`.
///
/// `None` when either duration is unusable or no change is needed.
pub fn retime_factor(current_secs: f64, target_secs: f64) -> Option<f64> {
    let factor = target_secs / current_secs;
    (factor.is_finite() && factor > 0.0 && (factor - 1.0).abs() > 1e-6).then_some(factor)
}

/// Applies one uniform factor to a whole file.
#[async_trait]
pub trait Retimer: Send + Sync {
    /// Re-encode `input` into `output` and return the measured duration.
    async fn retime(&self, input: &Path, output: &Path, factor: f64) -> MediaResult<f64>;
}

/// Retimer re-encoding through FFmpeg with the fragment settings.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRetimer {
    runner: FfmpegRunner,
    settings: EncodeSettings,
}

impl FfmpegRetimer {
    pub fn new(runner: FfmpegRunner, settings: EncodeSettings) -> Self {
        Self { runner, settings }
    }
}

#[async_trait]
impl Retimer for FfmpegRetimer {
    async fn retime(&self, input: &Path, output: &Path, factor: f64) -> MediaResult<f64> {
        retime(&self.runner, &self.settings, input, output, factor).await
    }
}

/// Re-encode `input` at a uniform factor and return the new duration.
pub async fn retime(
    runner: &FfmpegRunner,
    settings: &EncodeSettings,
    input: &Path,
    output: &Path,
    factor: f64,
) -> MediaResult<f64> {
    let cmd = settings.apply(FfmpegCommand::new(input, output), factor);
    runner.run(&cmd).await?;
    let measured = probe_duration(output).await?;
    info!(factor, measured, "Output retimed");
    Ok(measured)
}
