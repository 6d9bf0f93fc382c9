//! Grouping of equal-speed runs into else sub-segments.

use serde::{Deserialize, Serialize};
use vspeed_models::{bound_factor, round_to, secs_to_ms, AnnotatedSegment, Segment, SegmentKind, FACTOR_DECIMALS};

use super::hysteresis::ClassifiedSample;

/// Consecutive samples that end up with the same inverse factor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionGroup {
    /// Index of the first sample.
    pub first: usize,
    /// Index of the last sample, inclusive.
    pub last: usize,
    pub acc: f64,
}

fn inverse(acc: f64) -> f64 {
    round_to(1.0 / acc, FACTOR_DECIMALS)
}

/// Merge consecutive samples whose rounded inverse acceleration matches the
/// current group's; the group keeps its first acceleration.
pub fn coalesce(samples: &[ClassifiedSample]) -> Vec<MotionGroup> {
    samples
        .iter()
        .enumerate()
        .fold(Vec::<MotionGroup>::new(), |mut groups, (i, s)| {
            match groups.last_mut() {
                Some(group) if inverse(group.acc) == inverse(s.acc) => group.last = i,
                _ => groups.push(MotionGroup {
                    first: i,
                    last: i,
                    acc: s.acc,
                }),
            }
            groups
        })
}

/// Lay groups out on the timeline of `segment`.
///
/// Each group runs from its predecessor's last sample to its own last sample;
/// the first group starts at the segment start and the last one ends at the
/// segment end, so the sub-segments tile the segment.
pub fn emit_subsegments(
    segment: &Segment,
    samples: &[ClassifiedSample],
    groups: &[MotionGroup],
    bounds: (f64, f64),
) -> Vec<AnnotatedSegment> {
    let at = |sample: usize| {
        (segment.start_ms + secs_to_ms(samples[sample].sample.time)).min(segment.end_ms)
    };

    groups
        .iter()
        .enumerate()
        .map(|(i, group)| {
            let start_ms = if i == 0 {
                segment.start_ms
            } else {
                at(groups[i - 1].last)
            };
            let end_ms = if i + 1 == groups.len() {
                segment.end_ms
            } else {
                at(group.last)
            };
            AnnotatedSegment::new(
                start_ms,
                end_ms,
                SegmentKind::Else,
                bound_factor(inverse(group.acc), bounds.0, bounds.1),
            )
        })
        .collect()
}

/// The whole segment at one acceleration.
pub fn single_subsegment(segment: &Segment, acc: f64, bounds: (f64, f64)) -> AnnotatedSegment {
    AnnotatedSegment::new(
        segment.start_ms,
        segment.end_ms,
        SegmentKind::Else,
        bound_factor(inverse(acc), bounds.0, bounds.1),
    )
}
