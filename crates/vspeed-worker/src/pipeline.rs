//! Plan, encode and reconstruct stages.
//!
//! Planning measures voice and motion and produces the annotated timeline.
//! Encoding fans fragment jobs out under a semaphore, concatenates whatever
//! succeeded and optionally retimes the result. Reconstruction lays the
//! subtitle lines out on the measured output.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn, Instrument};
use vspeed_media::{
    reconstruct, retime_factor, tag_timeline, AnnotatedTimeline, Concatenator, EncodeSettings,
    EspeakTranscriber, FfmpegConcatenator, FfmpegFragmentEncoder, FfmpegMotionProbe,
    FfmpegRetimer, FfmpegRunner, FfmpegSceneDetector, FragmentEncoder, LanguageDetector,
    MotionProbe, MotionSegmenter, PhonemeTranscriber, Reconstruction, Retimer, SceneCutDetector,
    SpeechRateNormalizer, VoiceOutcome, WhatlangDetector,
};
use vspeed_models::{
    check_timeline, AccelerationSettings, FragmentEncoding, FragmentJob, Segment, SubtitleLine,
};

use crate::artifacts::{
    write_json, FragmentManifest, ANNOTATED_TIMELINE, FRAGMENTS, FRAGMENT_DIR, QUALITY_REPORT,
    SPEEDUP_SUBS, VOICE_AUDIT,
};
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::RunLogger;

/// Reconstructed output longer or shorter than this is reported.
const RECONSTRUCTION_TOLERANCE_SECS: f64 = 0.5;

/// External collaborators of every stage.
#[derive(Clone)]
pub struct Collaborators {
    pub transcriber: Arc<dyn PhonemeTranscriber>,
    pub detector: Arc<dyn LanguageDetector>,
    pub probe: Arc<dyn MotionProbe>,
    pub scenes: Arc<dyn SceneCutDetector>,
    pub encoder: Arc<dyn FragmentEncoder>,
    pub concatenator: Arc<dyn Concatenator>,
    pub retimer: Arc<dyn Retimer>,
}

impl Collaborators {
    /// FFmpeg, espeak and `whatlang` backed collaborators.
    pub fn ffmpeg(config: &WorkerConfig, encode: EncodeSettings) -> Self {
        let runner = FfmpegRunner::new().with_timeout(config.timeout_secs());
        Self {
            transcriber: Arc::new(EspeakTranscriber::new().with_timeout(config.timeout_secs())),
            detector: Arc::new(WhatlangDetector),
            probe: Arc::new(FfmpegMotionProbe::new(runner.clone())),
            scenes: Arc::new(FfmpegSceneDetector::new(runner.clone())),
            encoder: Arc::new(FfmpegFragmentEncoder::new(runner.clone(), encode.clone())),
            concatenator: Arc::new(FfmpegConcatenator::new(runner.clone())),
            retimer: Arc::new(FfmpegRetimer::new(runner, encode)),
        }
    }
}

/// Result of the plan stage.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub annotated: AnnotatedTimeline,
    pub voice: VoiceOutcome,
}

/// Everything a full run needs.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub source: PathBuf,
    pub timeline: Vec<Segment>,
    pub subtitles: Vec<SubtitleLine>,
    pub settings: AccelerationSettings,
    pub out_dir: PathBuf,
    /// Merged video path.
    pub output: PathBuf,
    /// Retime the merged video to this many seconds.
    pub target_secs: Option<f64>,
}

/// Summary of a full run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub annotated: AnnotatedTimeline,
    pub manifest: FragmentManifest,
    pub reconstruction: Reconstruction,
}

/// Drives the acceleration stages for one source.
pub struct Pipeline {
    config: WorkerConfig,
    collaborators: Collaborators,
    logger: RunLogger,
}

impl Pipeline {
    pub fn new(config: WorkerConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
            logger: RunLogger::new("pipeline"),
        }
    }

    /// Builder-style setter for the run id carried by every log line.
    pub fn with_run_id(mut self, run_id: &str) -> Self {
        self.logger = RunLogger::with_run_id(run_id, "pipeline");
        self
    }

    pub fn run_id(&self) -> &str {
        self.logger.run_id()
    }

    /// Scratch directory of this run.
    pub fn work_dir(&self) -> PathBuf {
        self.config.work_dir.join(self.run_id())
    }

    /// Remove the scratch directory after a successful run.
    ///
    /// Manifest fragment paths point into it and dangle afterwards.
    async fn cleanup_work_dir(&self) {
        let work_dir = self.work_dir();
        if self.config.keep_work_dir {
            debug!(work_dir = %work_dir.display(), "Keeping work directory");
            return;
        }
        if work_dir.exists() {
            info!("Cleaning up work directory: {}", work_dir.display());
            if let Err(e) = tokio::fs::remove_dir_all(&work_dir).await {
                warn!("Failed to cleanup work directory: {}", e);
            }
        }
    }

    /// Measure voice and motion, merge them and write the plan artifacts.
    pub async fn plan(
        &self,
        source: &Path,
        timeline: &[Segment],
        subtitles: &[SubtitleLine],
        settings: &AccelerationSettings,
        out_dir: &Path,
    ) -> WorkerResult<PlanOutcome> {
        let logger = self.logger.stage("plan");
        logger.log_start(&format!("{} segments, {} subtitle lines", timeline.len(), subtitles.len()));

        if timeline.is_empty() {
            return Err(WorkerError::invalid_input("timeline holds no segment"));
        }
        tokio::fs::create_dir_all(out_dir).await?;

        for issue in check_timeline(timeline.iter().map(|s| (s.start_ms, s.end_ms))) {
            logger.log_warning(&format!("base timeline: {}", issue));
        }

        let normalizer = SpeechRateNormalizer::new(
            Arc::clone(&self.collaborators.transcriber),
            Arc::clone(&self.collaborators.detector),
        );
        let segmenter = MotionSegmenter::new(
            Arc::clone(&self.collaborators.probe),
            Arc::clone(&self.collaborators.scenes),
        )
        .with_max_parallel(self.config.max_parallel);

        let (voice, motion) = tokio::join!(
            normalizer.normalize(timeline, subtitles, settings),
            segmenter.run(source, timeline, settings)
        );
        debug!(
            voice_segments = voice.factors.len(),
            else_segments = motion.len(),
            constant_voice = voice.constant,
            "Voice and motion measured"
        );

        let annotated = tag_timeline(timeline, &voice.factors, &motion, settings);

        write_json(out_dir.join(ANNOTATED_TIMELINE), &annotated).await?;
        if !voice.audit.is_empty() {
            voice.audit.write(out_dir.join(VOICE_AUDIT)).await?;
        }
        if let Some(quality) = &voice.quality {
            write_json(out_dir.join(QUALITY_REPORT), quality).await?;
        }

        logger.log_completion(&format!(
            "{} fragments, {:.1}s expected from {:.1}s",
            annotated.len(),
            annotated.expected_output_secs(),
            annotated.source_secs()
        ));
        Ok(PlanOutcome { annotated, voice })
    }

    /// Encode every fragment, concatenate and optionally retime.
    ///
    /// Fragments are written under the run's work directory; the manifest
    /// goes to `out_dir`.
    ///
    /// A fragment that fails to encode is recorded with no output and left
    /// out of the merged video; the stage only fails when nothing is left.
    pub async fn encode(
        &self,
        annotated: &AnnotatedTimeline,
        source: &Path,
        output: &Path,
        target_secs: Option<f64>,
        out_dir: &Path,
    ) -> WorkerResult<FragmentManifest> {
        let logger = self.logger.stage("encode");
        let parts_dir = self.work_dir().join(FRAGMENT_DIR);
        tokio::fs::create_dir_all(&parts_dir).await?;

        let jobs = annotated.jobs(source, &parts_dir);
        if jobs.is_empty() {
            return Err(WorkerError::invalid_input("annotated timeline holds no fragment"));
        }
        logger.log_start(&format!("{} fragments", jobs.len()));

        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel));
        let futures: Vec<_> = jobs
            .iter()
            .map(|job| {
                let semaphore = Arc::clone(&semaphore);
                async move {
                    let _permit = semaphore.acquire().await.ok();
                    self.encode_one(job).await
                }
            })
            .collect();
        let fragments = join_all(futures).await;
        logger.log_progress(&format!("{} fragments encoded, merging", fragments.len()));

        let parts: Vec<PathBuf> = fragments
            .iter()
            .filter(|f| f.is_usable())
            .filter_map(|f| f.output.clone())
            .collect();
        let failed = fragments.len() - parts.len();
        if failed > 0 {
            logger.log_warning(&format!("{} of {} fragments left out", failed, fragments.len()));
        }
        if parts.is_empty() {
            return Err(WorkerError::stage_failed("no fragment could be encoded"));
        }

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let merged = match target_secs {
            Some(_) => untimed_path(output, &self.work_dir()),
            None => output.to_path_buf(),
        };
        let merged_secs = self.collaborators.concatenator.concat(&parts, &merged).await?;
        info!(
            expected_secs = annotated.expected_output_secs(),
            measured_secs = merged_secs,
            "Merged output measured"
        );

        let (final_secs, applied) = match target_secs {
            Some(target) => self.retime_to(&merged, output, merged_secs, target).await?,
            None => (merged_secs, None),
        };

        let manifest = FragmentManifest {
            output: output.to_path_buf(),
            final_secs,
            retime_factor: applied,
            fragments,
        };
        write_json(out_dir.join(FRAGMENTS), &manifest).await?;

        logger.log_completion(&format!(
            "{} fragments merged into {:.3}s",
            manifest.usable_count(),
            final_secs
        ));
        Ok(manifest)
    }

    async fn encode_one(&self, job: &FragmentJob) -> FragmentEncoding {
        let (measured_secs, output) = match self.collaborators.encoder.encode(job).await {
            Ok(measured) if measured.is_finite() && measured > 0.0 => {
                (measured, Some(job.output.clone()))
            }
            Ok(measured) => {
                warn!(fragment = job.index, measured, "Fragment encoded to nothing, leaving it out");
                (0.0, None)
            }
            Err(e) => {
                warn!(fragment = job.index, factor = job.factor, error = %e, "Fragment encoding failed, leaving it out");
                (0.0, None)
            }
        };
        FragmentEncoding {
            segment_index: job.index,
            kind: job.kind,
            start_ms: job.start_ms,
            end_ms: job.end_ms,
            factor: job.factor,
            measured_secs,
            output,
        }
    }

    async fn retime_to(
        &self,
        merged: &Path,
        output: &Path,
        merged_secs: f64,
        target_secs: f64,
    ) -> WorkerResult<(f64, Option<f64>)> {
        match retime_factor(merged_secs, target_secs) {
            Some(factor) => {
                let retimed = self
                    .collaborators
                    .retimer
                    .retime(merged, output, factor)
                    .await?;
                if let Err(e) = tokio::fs::remove_file(merged).await {
                    debug!(path = %merged.display(), error = %e, "Could not remove untimed output");
                }
                info!(factor, target_secs, measured_secs = retimed, "Output retimed to target");
                Ok((retimed, Some(factor)))
            }
            None => {
                warn!(merged_secs, target_secs, "Target duration unusable or already met, not retiming");
                if tokio::fs::rename(merged, output).await.is_err() {
                    tokio::fs::copy(merged, output).await?;
                    tokio::fs::remove_file(merged).await.ok();
                }
                Ok((merged_secs, None))
            }
        }
    }

    /// Time the subtitle lines on the merged output and write them.
    pub async fn reconstruct(
        &self,
        manifest: &FragmentManifest,
        subtitles: &[SubtitleLine],
        out_dir: &Path,
    ) -> WorkerResult<Reconstruction> {
        let logger = self.logger.stage("reconstruct");
        logger.log_start(&format!(
            "{} lines over {} fragments",
            subtitles.len(),
            manifest.fragments.len()
        ));

        let result = reconstruct(&manifest.fragments, subtitles, manifest.final_secs);
        let drift = (result.total_secs() - manifest.final_secs).abs();
        if drift > RECONSTRUCTION_TOLERANCE_SECS {
            logger.log_warning(&format!(
                "reconstructed {:.3}s against measured {:.3}s",
                result.total_secs(),
                manifest.final_secs
            ));
        }

        tokio::fs::create_dir_all(out_dir).await?;
        write_json(out_dir.join(SPEEDUP_SUBS), &result.subtitles).await?;

        logger.log_completion(&format!("{} subtitles placed", result.subtitles.len()));
        Ok(result)
    }

    /// Plan, encode and reconstruct in one go.
    pub async fn run(&self, request: &RunRequest) -> WorkerResult<RunReport> {
        let span = self.logger.create_span();
        let result = async move {
            let plan = self
                .plan(
                    &request.source,
                    &request.timeline,
                    &request.subtitles,
                    &request.settings,
                    &request.out_dir,
                )
                .await?;
            let manifest = self
                .encode(
                    &plan.annotated,
                    &request.source,
                    &request.output,
                    request.target_secs,
                    &request.out_dir,
                )
                .await?;
            let reconstruction = self
                .reconstruct(&manifest, &request.subtitles, &request.out_dir)
                .await?;
            self.cleanup_work_dir().await;

            Ok::<_, WorkerError>(RunReport {
                run_id: self.run_id().to_string(),
                annotated: plan.annotated,
                manifest,
                reconstruction,
            })
        }
        .instrument(span)
        .await;

        if let Err(e) = &result {
            self.logger.log_error(&e.to_string());
        }
        result
    }
}

/// Where the merged video waits before retiming.
fn untimed_path(output: &Path, work_dir: &Path) -> PathBuf {
    let extension = output
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("mp4");
    work_dir.join(format!("untimed.{}", extension))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untimed_path_keeps_extension() {
        assert_eq!(
            untimed_path(Path::new("/out/final.mkv"), Path::new("/work")),
            PathBuf::from("/work/untimed.mkv")
        );
        assert_eq!(
            untimed_path(Path::new("/out/final"), Path::new("/work")),
            PathBuf::from("/work/untimed.mp4")
        );
    }
}
