//! Scene-cut detection through FFmpeg's `scene` score.

use std::path::Path;

use async_trait::async_trait;
use tracing::debug;
use vspeed_models::Segment;

use super::SceneCutDetector;
use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

/// Extract cut times from `metadata=print` output and append `duration`.
pub fn parse_scene_cuts(output: &str, duration: f64) -> Vec<f64> {
    let mut cuts: Vec<f64> = output
        .lines()
        .filter_map(|line| regex!(r"pts_time:(\d+(?:\.\d+)?)").captures(line))
        .filter_map(|caps| caps.get(1)?.as_str().parse::<f64>().ok())
        .filter(|t| *t < duration)
        .collect();
    cuts.push(duration);
    cuts
}

/// Scene detector running `select='gt(scene,T)',metadata=print`.
#[derive(Debug, Clone)]
pub struct FfmpegSceneDetector {
    runner: FfmpegRunner,
}

impl FfmpegSceneDetector {
    pub fn new(runner: FfmpegRunner) -> Self {
        Self { runner }
    }

    fn command(source: &Path, segment: &Segment, threshold: f64) -> FfmpegCommand {
        FfmpegCommand::analysis(source)
            .span(segment.start_secs(), segment.end_secs())
            .video_filter(format!(
                "select='gt(scene,{})',metadata=print:file=-",
                threshold
            ))
            .no_audio()
    }
}

#[async_trait]
impl SceneCutDetector for FfmpegSceneDetector {
    async fn scene_cuts(
        &self,
        source: &Path,
        segment: &Segment,
        threshold: f64,
    ) -> MediaResult<Vec<f64>> {
        let stdout = self
            .runner
            .run_capture(&Self::command(source, segment, threshold))
            .await?;
        let cuts = parse_scene_cuts(&String::from_utf8_lossy(&stdout), segment.duration_secs());
        debug!(
            start_ms = segment.start_ms,
            cuts = cuts.len() - 1,
            "Scene cuts detected"
        );
        Ok(cuts)
    }
}
