//! Subtitle timing on the accelerated output.
//!
//! Fragment durations are measured after encoding and the merged output is
//! measured again; the ratio of the two (the reduction factor) absorbs
//! container and concatenation drift. Voice lines are laid out inside their
//! fragment by share of the fragment's original span.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vspeed_models::{round_to, FragmentEncoding, ReconstructedSubtitle, SegmentKind, SubtitleLine};

const TIME_DECIMALS: i32 = 3;

/// `Σ measured / final`; `1.0` when either side is unusable.
pub fn reduction_factor(encodings: &[FragmentEncoding], final_secs: f64) -> f64 {
    let measured: f64 = encodings
        .iter()
        .filter(|e| e.is_usable())
        .map(|e| e.measured_secs)
        .sum();
    let factor = measured / final_secs;
    if factor.is_finite() && factor > 0.0 {
        factor
    } else {
        warn!(measured, final_secs, "Unusable reduction factor, assuming 1.0");
        1.0
    }
}

/// Part of a fragment's output attributed to one line, or to nothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Share {
    pub fraction: f64,
    /// Index into the subtitle lines.
    pub line: Option<usize>,
}

/// Shares of every fragment; each list sums to one.
///
/// A line belongs to the voice fragment containing its midpoint. Lines of one
/// fragment are tiled over its span: the first starts at the fragment start,
/// each next one at its predecessor's end and the last one runs to the
/// fragment end.
pub fn share_lists(encodings: &[FragmentEncoding], lines: &[SubtitleLine]) -> Vec<Vec<Share>> {
    let mut members: Vec<Vec<usize>> = vec![Vec::new(); encodings.len()];
    for (i, line) in lines.iter().enumerate() {
        let mid = line.midpoint_ms();
        let owner = encodings.iter().position(|e| {
            e.kind == SegmentKind::Voice && e.start_ms <= mid && mid < e.end_ms
        });
        match owner {
            Some(fragment) => members[fragment].push(i),
            None => debug!(line = i, "Subtitle line outside every voice fragment"),
        }
    }

    encodings
        .iter()
        .zip(members)
        .map(|(encoding, mut owned)| {
            let span = encoding.end_ms.saturating_sub(encoding.start_ms);
            if owned.is_empty() || span == 0 {
                return vec![Share {
                    fraction: 1.0,
                    line: None,
                }];
            }
            owned.sort_by_key(|&i| lines[i].start_ms);

            let mut cursor = encoding.start_ms;
            let last = owned.len() - 1;
            owned
                .iter()
                .enumerate()
                .map(|(k, &i)| {
                    let end = if k == last {
                        encoding.end_ms
                    } else {
                        lines[i].end_ms.clamp(cursor, encoding.end_ms)
                    };
                    let fraction = (end - cursor) as f64 / span as f64;
                    cursor = end;
                    Share {
                        fraction,
                        line: Some(i),
                    }
                })
                .collect()
        })
        .collect()
}

/// One slice of the output timeline before filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedShare {
    pub start: f64,
    pub end: f64,
    pub kind: SegmentKind,
    pub line: Option<usize>,
}

/// Result of a reconstruction run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconstruction {
    pub reduction_factor: f64,
    /// Every slice, else fragments included, in output order.
    pub slices: Vec<TimedShare>,
    pub subtitles: Vec<ReconstructedSubtitle>,
}

impl Reconstruction {
    /// End of the last slice.
    pub fn total_secs(&self) -> f64 {
        self.slices.last().map_or(0.0, |s| s.end)
    }
}

/// Place every voice line on the output timeline.
///
/// Fragments that failed to encode are skipped: they are not part of the
/// merged output.
pub fn reconstruct(
    encodings: &[FragmentEncoding],
    lines: &[SubtitleLine],
    final_secs: f64,
) -> Reconstruction {
    let factor = reduction_factor(encodings, final_secs);
    let shares = share_lists(encodings, lines);

    let mut cursor = 0.0;
    let mut slices = Vec::new();
    for (encoding, fragment_shares) in encodings.iter().zip(&shares) {
        if !encoding.is_usable() {
            warn!(
                segment = encoding.segment_index,
                "Fragment missing from output, its lines are dropped"
            );
            continue;
        }
        for share in fragment_shares {
            let duration = encoding.measured_secs * share.fraction / factor;
            slices.push(TimedShare {
                start: cursor,
                end: cursor + duration,
                kind: encoding.kind,
                line: share.line,
            });
            cursor += duration;
        }
    }

    let subtitles: Vec<ReconstructedSubtitle> = slices
        .iter()
        .filter(|s| s.kind == SegmentKind::Voice)
        .filter_map(|s| {
            let text = lines.get(s.line?)?.text.trim();
            (!text.is_empty()).then(|| ReconstructedSubtitle {
                start: round_to(s.start, TIME_DECIMALS),
                end: round_to(s.end, TIME_DECIMALS),
                text: text.to_string(),
            })
        })
        .collect();

    info!(
        reduction_factor = factor,
        subtitles = subtitles.len(),
        total_secs = cursor,
        final_secs,
        "Subtitles reconstructed"
    );

    Reconstruction {
        reduction_factor: factor,
        slices,
        subtitles,
    }
}
