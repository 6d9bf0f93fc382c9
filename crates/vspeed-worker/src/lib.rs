//! Acceleration pipeline worker.
//!
//! This crate provides:
//! - Worker configuration from the environment
//! - The plan, encode and reconstruct stages
//! - Output artifacts (annotated timeline, audit, fragments, subtitles)
//! - Structured run logging

pub mod artifacts;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;

pub use artifacts::{load_subtitles, load_timeline, read_json, write_json, FragmentManifest};
pub use config::{settings_from_env, WorkerConfig};
pub use error::{WorkerError, WorkerResult};
pub use logging::RunLogger;
pub use pipeline::{Collaborators, Pipeline, PlanOutcome, RunReport, RunRequest};
