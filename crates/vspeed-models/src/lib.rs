//! Shared data models for the vspeed acceleration engine.
//!
//! This crate provides Serde-serializable types for:
//! - The voice/else base timeline and its annotated form
//! - Subtitle lines before and after acceleration
//! - Fragment encoding jobs and measurements
//! - Acceleration settings and their lenient resolution

pub mod fragment;
pub mod segment;
pub mod settings;
pub mod subtitle;
pub mod timestamp;
pub mod utils;

// Re-export common types
pub use fragment::{FragmentEncoding, FragmentJob};
pub use segment::{check_timeline, AnnotatedSegment, Segment, SegmentKind, TimelineIssue};
pub use settings::{AccelerationSettings, RawSettings, SettingWarning, VoiceReference};
pub use subtitle::{ReconstructedSubtitle, SubtitleLine};
pub use timestamp::{format_ms, parse_timestamp, secs_to_ms, TimestampError};
pub use utils::{bound_factor, mean, percentile, round_to, FACTOR_DECIMALS, SPEED_DECIMALS};
