//! FFprobe media information.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::command::{check_ffprobe, run_process, stderr_tail};
use crate::error::{MediaError, MediaResult};

/// Media file information relevant to acceleration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Duration in seconds
    pub duration: f64,
    /// Frame rate, `None` for audio-only files
    pub fps: Option<f64>,
    pub has_video: bool,
    pub has_audio: bool,
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    #[serde(default)]
    disposition: Option<FfprobeDisposition>,
}

#[derive(Debug, Deserialize)]
struct FfprobeDisposition {
    #[serde(default)]
    attached_pic: u8,
}

async fn ffprobe_json(path: &Path, extra: &[&str]) -> MediaResult<FfprobeOutput> {
    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }
    check_ffprobe()?;

    let mut args: Vec<String> = ["-v", "quiet", "-print_format", "json"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    args.extend(extra.iter().map(|s| s.to_string()));
    args.push(path.to_string_lossy().to_string());

    let output = run_process("ffprobe", &args, None).await?;
    if !output.status.success() {
        return Err(MediaError::ffprobe_failed(
            "FFprobe failed",
            Some(stderr_tail(&output.stderr)),
        ));
    }

    Ok(serde_json::from_slice(&output.stdout)?)
}

fn parse_duration(format: &FfprobeFormat) -> MediaResult<f64> {
    format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| MediaError::invalid_media("container reports no duration"))
}

/// Container duration in seconds. Works for audio-only files.
pub async fn probe_duration(path: impl AsRef<Path>) -> MediaResult<f64> {
    let path = path.as_ref();
    let probe = ffprobe_json(path, &["-show_entries", "format=duration"]).await?;
    let duration = parse_duration(&probe.format)?;
    debug!(path = %path.display(), duration, "Probed duration");
    Ok(duration)
}

/// Probe duration, frame rate and stream presence.
pub async fn probe_media(path: impl AsRef<Path>) -> MediaResult<MediaInfo> {
    let probe = ffprobe_json(path.as_ref(), &["-show_format", "-show_streams"]).await?;
    media_info_from(&probe)
}

fn media_info_from(probe: &FfprobeOutput) -> MediaResult<MediaInfo> {
    let duration = parse_duration(&probe.format)?;

    // Cover art shows up as a video stream on audio files.
    let video = probe.streams.iter().find(|s| {
        s.codec_type == "video"
            && s.disposition
                .as_ref()
                .map(|d| d.attached_pic == 0)
                .unwrap_or(true)
    });

    let fps = video.and_then(|s| {
        s.avg_frame_rate
            .as_deref()
            .and_then(parse_frame_rate)
            .or_else(|| s.r_frame_rate.as_deref().and_then(parse_frame_rate))
    });

    Ok(MediaInfo {
        duration,
        fps,
        has_video: video.is_some(),
        has_audio: probe.streams.iter().any(|s| s.codec_type == "audio"),
    })
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
pub fn parse_frame_rate(s: &str) -> Option<f64> {
    let rate = if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den <= 0.0 {
            return None;
        }
        num / den
    } else {
        s.parse().ok()?
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}
