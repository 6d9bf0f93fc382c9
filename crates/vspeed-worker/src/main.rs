//! `vspeed` command line entry point.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

use vspeed_media::{check_ffmpeg, check_ffprobe, check_tool, probe_media, EncodeSettings};
use vspeed_models::{parse_timestamp, AccelerationSettings, SubtitleLine, VoiceReference};
use vspeed_worker::{
    load_subtitles, load_timeline, read_json, settings_from_env, Collaborators, FragmentManifest,
    Pipeline, RunRequest, WorkerConfig,
};

#[derive(Parser, Debug)]
#[command(name = "vspeed", version)]
#[command(about = "Adaptive smart speed-up for long-form video")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute the annotated timeline without encoding
    Plan(PlanArgs),
    /// Plan, encode, concatenate and reconstruct subtitles
    Run(RunArgs),
    /// Rebuild subtitle timing from a fragments manifest
    Reconstruct(ReconstructArgs),
    /// Verify external tools and the work directory
    Check,
}

#[derive(Args, Debug)]
struct PlanArgs {
    /// Source video or audio file
    #[arg(short, long)]
    source: PathBuf,

    /// Base voice/else timeline (JSON)
    #[arg(short, long)]
    timeline: PathBuf,

    /// Subtitle track (JSON); without it every voice segment gets the constant factor
    #[arg(long)]
    subtitles: Option<PathBuf>,

    /// Output directory for artifacts
    #[arg(short, long)]
    out_dir: PathBuf,

    /// Skip motion analysis, accelerate else segments uniformly
    #[arg(long, default_value_t = false)]
    podcast: bool,

    /// Ignore subtitle speaking rates, use the constant voice factor
    #[arg(long, default_value_t = false)]
    constant_voice: bool,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    plan: PlanArgs,

    /// Merged video path; defaults to `accelerated.mp4` in the output directory
    #[arg(long)]
    output: Option<PathBuf>,

    /// Retime the merged video to this length (`HH:MM:SS.mmm`, `MM:SS` or seconds)
    #[arg(long, value_parser = parse_timestamp)]
    target_duration: Option<f64>,
}

#[derive(Args, Debug)]
struct ReconstructArgs {
    /// Fragments manifest written by `run`
    #[arg(short, long)]
    fragments: PathBuf,

    /// Subtitle track (JSON) of the source
    #[arg(long)]
    subtitles: PathBuf,

    /// Output directory for the reconstructed subtitles
    #[arg(short, long)]
    out_dir: PathBuf,

    /// Measured output duration, overriding the manifest
    #[arg(long)]
    final_secs: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    match cli.command {
        Command::Plan(args) => plan(config, args).await,
        Command::Run(args) => run(config, args).await,
        Command::Reconstruct(args) => reconstruct(config, args).await,
        Command::Check => check(&config).await,
    }
}

fn init_tracing() {
    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("vspeed=info".parse().unwrap_or_else(|_| LevelFilter::INFO.into()));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

/// Settings from the environment, adjusted by command line flags.
fn resolve_settings(args: &PlanArgs, has_subtitles: bool) -> AccelerationSettings {
    let (settings, warnings) = settings_from_env();
    for warning in &warnings {
        warn!(field = %warning.field, "{}", warning.message);
    }

    let reference = if args.constant_voice || !has_subtitles {
        VoiceReference::Constant
    } else {
        VoiceReference::Subtitles
    };
    settings
        .with_podcast(args.podcast)
        .with_voice_reference(reference)
}

struct Prepared {
    pipeline: Pipeline,
    settings: AccelerationSettings,
    subtitles: Vec<SubtitleLine>,
}

async fn prepare(config: WorkerConfig, args: &PlanArgs) -> Result<Prepared> {
    let info = probe_media(&args.source)
        .await
        .with_context(|| format!("Failed to probe {}", args.source.display()))?;
    info!(
        duration = info.duration,
        fps = ?info.fps,
        has_video = info.has_video,
        has_audio = info.has_audio,
        "Source probed"
    );

    let subtitles = match &args.subtitles {
        Some(path) => load_subtitles(path).await?,
        None => Vec::new(),
    };

    let mut settings = resolve_settings(args, args.subtitles.is_some());
    if !info.has_video && !settings.podcast {
        warn!("Source has no video stream, accelerating else segments uniformly");
        settings = settings.with_podcast(true);
    }

    let encode = EncodeSettings::default().with_streams(info.has_video, info.has_audio);
    let collaborators = Collaborators::ffmpeg(&config, encode);
    Ok(Prepared {
        pipeline: Pipeline::new(config, collaborators),
        settings,
        subtitles,
    })
}

async fn plan(config: WorkerConfig, args: PlanArgs) -> Result<()> {
    let timeline = load_timeline(&args.timeline).await?;
    let prepared = prepare(config, &args).await?;

    let outcome = prepared
        .pipeline
        .plan(
            &args.source,
            &timeline,
            &prepared.subtitles,
            &prepared.settings,
            &args.out_dir,
        )
        .await?;

    println!("{}", outcome.annotated.labels().join("\n"));
    Ok(())
}

async fn run(config: WorkerConfig, args: RunArgs) -> Result<()> {
    let timeline = load_timeline(&args.plan.timeline).await?;
    let prepared = prepare(config, &args.plan).await?;

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| args.plan.out_dir.join("accelerated.mp4"));
    let request = RunRequest {
        source: args.plan.source.clone(),
        timeline,
        subtitles: prepared.subtitles,
        settings: prepared.settings,
        out_dir: args.plan.out_dir.clone(),
        output,
        target_secs: args.target_duration,
    };

    let report = prepared.pipeline.run(&request).await?;
    info!(
        run_id = %report.run_id,
        source_secs = report.annotated.source_secs(),
        final_secs = report.manifest.final_secs,
        subtitles = report.reconstruction.subtitles.len(),
        "Run complete"
    );
    println!("{}", report.manifest.output.display());
    Ok(())
}

async fn reconstruct(config: WorkerConfig, args: ReconstructArgs) -> Result<()> {
    let mut manifest: FragmentManifest = read_json(&args.fragments).await?;
    if let Some(final_secs) = args.final_secs {
        manifest.final_secs = final_secs;
    }
    let subtitles = load_subtitles(&args.subtitles).await?;

    // Reconstruction touches no collaborator.
    let collaborators = Collaborators::ffmpeg(&config, EncodeSettings::default());
    let result = Pipeline::new(config, collaborators)
        .reconstruct(&manifest, &subtitles, &args.out_dir)
        .await?;

    info!(
        reduction_factor = result.reduction_factor,
        subtitles = result.subtitles.len(),
        "Reconstruction complete"
    );
    Ok(())
}

async fn check(config: &WorkerConfig) -> Result<()> {
    ensure_workdir(&config.work_dir).await?;
    let ffmpeg = check_ffmpeg().context("ffmpeg not available")?;
    let ffprobe = check_ffprobe().context("ffprobe not available")?;
    info!(ffmpeg = %ffmpeg.display(), ffprobe = %ffprobe.display(), "FFmpeg found");

    match check_tool("espeak") {
        Ok(path) => info!(espeak = %path.display(), "espeak found"),
        Err(e) => warn!(error = %e, "espeak missing, voice segments will use the constant factor"),
    }

    println!("vspeed check: ok");
    Ok(())
}

async fn ensure_workdir(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .with_context(|| format!("Cannot create work dir {}", path.display()))
}
