//! End-to-end stage tests with in-process collaborators.
//!
//! Fragment "files" hold their duration as text so that concatenation and
//! retiming can be measured without FFmpeg.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use vspeed_media::sampler::MotionTrace;
use vspeed_media::{
    Concatenator, FragmentEncoder, LanguageDetector, MediaError, MediaResult, MotionProbe,
    PhonemeTranscriber, Retimer, SceneCutDetector,
};
use vspeed_models::{
    AccelerationSettings, FragmentJob, ReconstructedSubtitle, Segment, SegmentKind, SubtitleLine,
    VoiceReference,
};
use vspeed_worker::artifacts::{
    ANNOTATED_TIMELINE, FRAGMENTS, QUALITY_REPORT, SPEEDUP_SUBS, VOICE_AUDIT,
};
use vspeed_worker::{
    read_json, Collaborators, FragmentManifest, Pipeline, RunRequest, WorkerConfig, WorkerError,
};

struct EchoTranscriber;

#[async_trait]
impl PhonemeTranscriber for EchoTranscriber {
    async fn transcribe(&self, samples: &[String], _language: &str) -> MediaResult<Vec<String>> {
        Ok(samples.iter().map(|_| "ˈola aˈmiɣos ke tal".to_string()).collect())
    }
}

struct Spanish;

impl LanguageDetector for Spanish {
    fn detect(&self, _text: &str) -> Option<String> {
        Some("es".to_string())
    }
}

/// Calm first half, busy second half.
struct SteppedProbe;

#[async_trait]
impl MotionProbe for SteppedProbe {
    async fn trace(
        &self,
        _source: &Path,
        segment: &Segment,
        _frame_skip: usize,
    ) -> MediaResult<MotionTrace> {
        let count = (segment.duration_secs() * 5.0) as usize;
        let magnitudes = (0..count)
            .map(|i| if i < count / 2 { 0.5 } else { 6.0 })
            .collect();
        Ok(MotionTrace {
            fps: 25.0,
            duration_secs: segment.duration_secs(),
            magnitudes,
        })
    }
}

struct NoCuts;

#[async_trait]
impl SceneCutDetector for NoCuts {
    async fn scene_cuts(
        &self,
        _source: &Path,
        segment: &Segment,
        _threshold: f64,
    ) -> MediaResult<Vec<f64>> {
        Ok(vec![segment.duration_secs()])
    }
}

/// Writes `span * factor` into the fragment file; fails for `fail_index`.
struct TextEncoder {
    fail_index: Option<usize>,
}

#[async_trait]
impl FragmentEncoder for TextEncoder {
    async fn encode(&self, job: &FragmentJob) -> MediaResult<f64> {
        if Some(job.index) == self.fail_index {
            return Err(MediaError::ffmpeg_failed("encoder crashed", None, Some(1)));
        }
        let secs = job.duration_secs() * job.factor;
        tokio::fs::write(&job.output, secs.to_string()).await?;
        Ok(secs)
    }
}

async fn read_secs(path: &Path) -> MediaResult<f64> {
    let text = tokio::fs::read_to_string(path).await?;
    text.trim()
        .parse()
        .map_err(|_| MediaError::invalid_media(format!("{} holds no duration", path.display())))
}

struct TextConcatenator;

#[async_trait]
impl Concatenator for TextConcatenator {
    async fn concat(&self, parts: &[PathBuf], output: &Path) -> MediaResult<f64> {
        let mut total = 0.0;
        for part in parts {
            total += read_secs(part).await?;
        }
        tokio::fs::write(output, total.to_string()).await?;
        Ok(total)
    }
}

struct TextRetimer;

#[async_trait]
impl Retimer for TextRetimer {
    async fn retime(&self, input: &Path, output: &Path, factor: f64) -> MediaResult<f64> {
        let secs = read_secs(input).await? * factor;
        tokio::fs::write(output, secs.to_string()).await?;
        Ok(secs)
    }
}

fn collaborators(fail_index: Option<usize>) -> Collaborators {
    Collaborators {
        transcriber: Arc::new(EchoTranscriber),
        detector: Arc::new(Spanish),
        probe: Arc::new(SteppedProbe),
        scenes: Arc::new(NoCuts),
        encoder: Arc::new(TextEncoder { fail_index }),
        concatenator: Arc::new(TextConcatenator),
        retimer: Arc::new(TextRetimer),
    }
}

fn config(root: &Path) -> WorkerConfig {
    WorkerConfig {
        max_parallel: 2,
        process_timeout: Duration::from_secs(5),
        work_dir: root.join("work"),
        keep_work_dir: false,
    }
}

fn pipeline(root: &Path, fail_index: Option<usize>) -> Pipeline {
    Pipeline::new(config(root), collaborators(fail_index)).with_run_id("test-run")
}

fn timeline() -> Vec<Segment> {
    vec![
        Segment::new(0, 4000, SegmentKind::Voice),
        Segment::new(4000, 14_000, SegmentKind::Else),
        Segment::new(14_000, 18_000, SegmentKind::Voice),
    ]
}

fn subtitles() -> Vec<SubtitleLine> {
    vec![
        SubtitleLine::new(500, 3500, "Hola amigos, ¿qué tal?"),
        SubtitleLine::new(14_500, 17_500, "Muy bien, gracias."),
    ]
}

/// Constant voice and uniform else factors: 4 s at 0.741, 10 s at 0.1, 4 s at 0.741.
fn uniform_settings() -> AccelerationSettings {
    AccelerationSettings::default()
        .with_podcast(true)
        .with_voice_reference(VoiceReference::Constant)
}

fn request(root: &Path, target_secs: Option<f64>) -> RunRequest {
    RunRequest {
        source: PathBuf::from("/in/talk.mp4"),
        timeline: timeline(),
        subtitles: subtitles(),
        settings: uniform_settings(),
        out_dir: root.join("out"),
        output: root.join("out").join("accelerated.mp4"),
        target_secs,
    }
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 2e-3
}

#[tokio::test]
async fn test_run_uniform_factors() {
    let dir = tempfile::tempdir().unwrap();
    let report = pipeline(dir.path(), None)
        .run(&request(dir.path(), None))
        .await
        .unwrap();

    assert_eq!(report.run_id, "test-run");
    assert_eq!(report.annotated.labels(), vec!["voice0.741", "else0.1", "voice0.741"]);
    assert!(close(report.manifest.final_secs, 6.928));
    assert_eq!(report.manifest.usable_count(), 3);
    assert!(close(report.reconstruction.reduction_factor, 1.0));

    let subs = &report.reconstruction.subtitles;
    assert_eq!(subs.len(), 2);
    assert!(close(subs[0].start, 0.0) && close(subs[0].end, 2.964));
    assert!(close(subs[1].start, 3.964) && close(subs[1].end, 6.928));

    let out = dir.path().join("out");
    assert!(out.join(ANNOTATED_TIMELINE).exists());
    assert!(out.join("accelerated.mp4").exists());
    // Constant voice reference: nothing was measured.
    assert!(!out.join(VOICE_AUDIT).exists());
    assert!(!out.join(QUALITY_REPORT).exists());

    let written: Vec<ReconstructedSubtitle> = read_json(out.join(SPEEDUP_SUBS)).await.unwrap();
    assert_eq!(&written, subs);
    let manifest: FragmentManifest = read_json(out.join(FRAGMENTS)).await.unwrap();
    assert_eq!(manifest, report.manifest);
    assert!(manifest.fragments[0]
        .output
        .as_ref()
        .unwrap()
        .starts_with(dir.path().join("work").join("test-run")));
    // Fragments are scratch data once the run succeeded.
    assert!(!dir.path().join("work").join("test-run").exists());
}

#[tokio::test]
async fn test_keep_work_dir_retains_fragments() {
    let dir = tempfile::tempdir().unwrap();
    let config = WorkerConfig {
        keep_work_dir: true,
        ..config(dir.path())
    };
    let report = Pipeline::new(config, collaborators(None))
        .with_run_id("kept-run")
        .run(&request(dir.path(), None))
        .await
        .unwrap();

    for fragment in &report.manifest.fragments {
        let output = fragment.output.as_ref().unwrap();
        assert!(output.starts_with(dir.path().join("work").join("kept-run")));
        assert!(output.exists());
    }
}

#[tokio::test]
async fn test_failed_fragment_left_out() {
    let dir = tempfile::tempdir().unwrap();
    let report = pipeline(dir.path(), Some(1))
        .run(&request(dir.path(), None))
        .await
        .unwrap();

    let failed = &report.manifest.fragments[1];
    assert!(failed.output.is_none());
    assert_eq!(failed.measured_secs, 0.0);
    assert_eq!(report.manifest.usable_count(), 2);
    assert!(close(report.manifest.final_secs, 5.928));

    // The else fragment is gone from the output, so the second line follows the first.
    let subs = &report.reconstruction.subtitles;
    assert!(close(subs[1].start, 2.964));
    assert!(close(report.reconstruction.total_secs(), report.manifest.final_secs));
}

#[tokio::test]
async fn test_every_fragment_failing_fails_the_stage() {
    let dir = tempfile::tempdir().unwrap();
    let timeline = vec![Segment::new(0, 4000, SegmentKind::Voice)];
    let mut req = request(dir.path(), None);
    req.timeline = timeline;

    let err = pipeline(dir.path(), Some(0)).run(&req).await.unwrap_err();
    assert!(matches!(err, WorkerError::StageFailed(_)));
    // A failed run keeps its scratch directory for inspection.
    assert!(dir.path().join("work").join("test-run").exists());
}

#[tokio::test]
async fn test_retime_to_target_duration() {
    let dir = tempfile::tempdir().unwrap();
    let report = pipeline(dir.path(), None)
        .run(&request(dir.path(), Some(3.464)))
        .await
        .unwrap();

    let factor = report.manifest.retime_factor.unwrap();
    assert!((factor - 0.5).abs() < 1e-6);
    assert!(close(report.manifest.final_secs, 3.464));
    assert!(close(report.reconstruction.reduction_factor, 2.0));

    // Uniform retiming halves every subtitle position.
    let subs = &report.reconstruction.subtitles;
    assert!(close(subs[1].start, 1.982));
    assert!(close(subs[1].end, 3.464));
    assert!(!dir.path().join("work").join("test-run").join("untimed.mp4").exists());
}

#[tokio::test]
async fn test_plan_measures_voice_and_motion() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let settings = AccelerationSettings::default();

    let outcome = pipeline(dir.path(), None)
        .plan(Path::new("/in/talk.mp4"), &timeline(), &subtitles(), &settings, &out)
        .await
        .unwrap();

    let annotated = &outcome.annotated;
    assert!(annotated.issues.is_empty());
    assert_eq!(annotated.entries.first().unwrap().start_ms, 0);
    assert_eq!(annotated.entries.last().unwrap().end_ms, 18_000);
    for pair in annotated.entries.windows(2) {
        assert_eq!(pair[0].end_ms, pair[1].start_ms);
    }

    let (voice_lo, voice_hi) = settings.voice_factor_bounds();
    let (motion_lo, motion_hi) = settings.motion_factor_bounds();
    for entry in &annotated.entries {
        let (lo, hi) = match entry.kind {
            SegmentKind::Voice => (voice_lo, voice_hi),
            SegmentKind::Else => (motion_lo, motion_hi),
        };
        assert!(entry.factor >= lo - 1e-9 && entry.factor <= hi + 1e-9, "{:?}", entry);
    }

    assert!(!outcome.voice.constant);
    assert!(out.join(ANNOTATED_TIMELINE).exists());
    assert!(out.join(VOICE_AUDIT).exists());
    assert!(out.join(QUALITY_REPORT).exists());
}

#[tokio::test]
async fn test_reconstruct_from_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(dir.path(), None);
    let report = pipeline.run(&request(dir.path(), None)).await.unwrap();

    // A container that came out 10% longer stretches every subtitle.
    let mut manifest = report.manifest.clone();
    manifest.final_secs *= 1.1;
    let result = pipeline
        .reconstruct(&manifest, &subtitles(), &dir.path().join("again"))
        .await
        .unwrap();

    assert!(close(result.subtitles[1].start, 3.964 * 1.1));
    assert!(dir.path().join("again").join(SPEEDUP_SUBS).exists());
}
