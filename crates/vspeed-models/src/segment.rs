//! Voice/else timeline segments.
//!
//! The base timeline is produced by an external subtitle formatter and is
//! already gapless and ordered. The acceleration tagger annotates it with one
//! inverse-speed factor per physical fragment.

use serde::{Deserialize, Serialize};

/// Kind of content covered by a timeline segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    /// Speech is present; sped up gently.
    Voice,
    /// Anything else (music, noise, silence); sped up according to motion.
    Else,
}

impl SegmentKind {
    /// Tag used by the annotated timeline labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentKind::Voice => "voice",
            SegmentKind::Else => "else",
        }
    }

    pub fn is_voice(&self) -> bool {
        matches!(self, SegmentKind::Voice)
    }
}

impl std::fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A time segment of the base timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Start time in milliseconds.
    pub start_ms: u64,
    /// End time in milliseconds.
    pub end_ms: u64,
    /// Voice or else.
    pub kind: SegmentKind,
}

impl Segment {
    pub fn new(start_ms: u64, end_ms: u64, kind: SegmentKind) -> Self {
        Self {
            start_ms,
            end_ms,
            kind,
        }
    }

    /// Duration of this segment in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }

    /// Duration of this segment in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.duration_ms() as f64 / 1000.0
    }

    pub fn start_secs(&self) -> f64 {
        self.start_ms as f64 / 1000.0
    }

    pub fn end_secs(&self) -> f64 {
        self.end_ms as f64 / 1000.0
    }

    /// Whether `[start_ms, end_ms)` lies entirely inside this segment.
    pub fn contains_span(&self, start_ms: u64, end_ms: u64) -> bool {
        start_ms >= self.start_ms && end_ms <= self.end_ms
    }
}

/// A timeline entry carrying the factor handed to the encoder.
///
/// `factor` is an inverse-speed multiplier: the encoder's `setpts` filter is
/// parameterized with it directly, so `0.5` plays twice as fast.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedSegment {
    pub start_ms: u64,
    pub end_ms: u64,
    pub kind: SegmentKind,
    pub factor: f64,
}

impl AnnotatedSegment {
    pub fn new(start_ms: u64, end_ms: u64, kind: SegmentKind, factor: f64) -> Self {
        Self {
            start_ms,
            end_ms,
            kind,
            factor,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_ms() as f64 / 1000.0
    }

    /// Speed-up relative to the original (`1 / factor`).
    pub fn speedup(&self) -> f64 {
        if self.factor > 0.0 {
            1.0 / self.factor
        } else {
            1.0
        }
    }

    /// Duration the fragment should have after encoding, in seconds.
    ///
    /// Only an estimate: encoder rounding makes the measured duration the
    /// authoritative value.
    pub fn expected_output_secs(&self) -> f64 {
        self.duration_secs() * self.factor
    }

    /// Label in the `voice0.588` / `else0.1` form used by the fragment files.
    pub fn label(&self) -> String {
        format!("{}{}", self.kind.as_str(), trim_factor(self.factor))
    }
}

fn trim_factor(factor: f64) -> String {
    let rounded = format!("{:.3}", factor);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// A structural problem found while checking a timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimelineIssue {
    /// Segment ends before (or where) it starts.
    EmptySegment { index: usize },
    /// Segment starts before the previous one ends.
    Overlap { index: usize, overlap_ms: u64 },
    /// Segment starts after the previous one ends.
    Gap { index: usize, gap_ms: u64 },
}

impl std::fmt::Display for TimelineIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptySegment { index } => write!(f, "segment {} has no duration", index),
            Self::Overlap { index, overlap_ms } => {
                write!(f, "segment {} overlaps its predecessor by {} ms", index, overlap_ms)
            }
            Self::Gap { index, gap_ms } => {
                write!(f, "segment {} leaves a {} ms gap after its predecessor", index, gap_ms)
            }
        }
    }
}

/// Check that `spans` are ordered, non-empty, gapless and non-overlapping.
///
/// Returns every problem found; an empty list means the timeline is sound.
pub fn check_timeline<I>(spans: I) -> Vec<TimelineIssue>
where
    I: IntoIterator<Item = (u64, u64)>,
{
    let mut issues = Vec::new();
    let mut previous_end: Option<u64> = None;

    for (index, (start, end)) in spans.into_iter().enumerate() {
        if end <= start {
            issues.push(TimelineIssue::EmptySegment { index });
        }
        if let Some(prev_end) = previous_end {
            if start < prev_end {
                issues.push(TimelineIssue::Overlap {
                    index,
                    overlap_ms: prev_end - start,
                });
            } else if start > prev_end {
                issues.push(TimelineIssue::Gap {
                    index,
                    gap_ms: start - prev_end,
                });
            }
        }
        previous_end = Some(end);
    }

    issues
}
