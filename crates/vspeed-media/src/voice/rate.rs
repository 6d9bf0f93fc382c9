//! Phoneme rates per line and per group of nearby lines.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use vspeed_models::{round_to, SubtitleLine, SPEED_DECIMALS};

use crate::sampler::{count_phonemes, split_nuclei};

/// A subtitle line that survived sanitizing, with its grapheme text.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedLine {
    /// Position in the original subtitle track.
    pub index: usize,
    pub line: SubtitleLine,
    pub graphemes: String,
}

/// Everything measured about one voice line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineMeasurement {
    pub index: usize,
    pub start_ms: u64,
    pub end_ms: u64,
    pub graphemes: String,
    /// Transcription with nuclei split by `_`.
    pub phonemes: String,
    pub phoneme_count: usize,
    /// Seconds, possibly non-positive on malformed tracks.
    pub duration: f64,
    /// Phonemes per second of this line alone.
    pub speed: Option<f64>,
    /// Phonemes per second of the line's group.
    pub speed_1s: Option<f64>,
    pub group: usize,
    /// Group rate mapped into the target range.
    pub target_speed_1s: Option<f64>,
    /// `target_speed_1s / speed_1s`.
    pub acceleration_1s: Option<f64>,
}

impl LineMeasurement {
    pub fn start_secs(&self) -> f64 {
        self.start_ms as f64 / 1000.0
    }

    pub fn end_secs(&self) -> f64 {
        self.end_ms as f64 / 1000.0
    }
}

/// A maximal run of lines separated by small gaps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineGroup {
    /// Indices into the measurement list.
    pub range: Range<usize>,
    pub phonemes: usize,
    /// Sum of the member lines' durations.
    pub duration: f64,
    pub speed_1s: Option<f64>,
}

fn rate(phonemes: usize, duration: f64) -> Option<f64> {
    if duration > 0.0 {
        Some(round_to(phonemes as f64 / duration, SPEED_DECIMALS))
    } else {
        None
    }
}

/// Pair prepared lines with their transcription and measure each one.
///
/// `phonemes` must hold one string per line; the normalizer rejects any
/// other length before measuring.
pub fn measure_lines(lines: &[PreparedLine], phonemes: &[String]) -> Vec<LineMeasurement> {
    lines
        .iter()
        .zip(phonemes)
        .map(|(prepared, raw)| {
            let split = split_nuclei(raw);
            let phoneme_count = count_phonemes(&split);
            let duration = round_to(prepared.line.duration_secs(), SPEED_DECIMALS);
            LineMeasurement {
                index: prepared.index,
                start_ms: prepared.line.start_ms,
                end_ms: prepared.line.end_ms,
                graphemes: prepared.graphemes.clone(),
                phonemes: split,
                phoneme_count,
                duration,
                speed: rate(phoneme_count, duration),
                speed_1s: None,
                group: 0,
                target_speed_1s: None,
                acceleration_1s: None,
            }
        })
        .collect()
}

/// Group consecutive lines whose gap is at most `gap_threshold` seconds.
///
/// Groups are contiguous, ordered and cover every line exactly once.
pub fn group_lines(lines: &[LineMeasurement], gap_threshold: f64) -> Vec<LineGroup> {
    let threshold_ms = (gap_threshold * 1000.0).round() as i64;

    lines
        .iter()
        .enumerate()
        .fold(Vec::<LineGroup>::new(), |mut groups, (i, line)| {
            let joins_previous = i > 0 && {
                let gap = line.start_ms as i64 - lines[i - 1].end_ms as i64;
                gap <= threshold_ms
            };
            match groups.last_mut() {
                Some(group) if joins_previous => {
                    group.range.end = i + 1;
                    group.phonemes += line.phoneme_count;
                    group.duration += line.duration;
                }
                _ => groups.push(LineGroup {
                    range: i..i + 1,
                    phonemes: line.phoneme_count,
                    duration: line.duration,
                    speed_1s: None,
                }),
            }
            groups
        })
        .into_iter()
        .map(|group| LineGroup {
            speed_1s: rate(group.phonemes, group.duration),
            ..group
        })
        .collect()
}

/// Copy group rates onto their member lines.
pub fn with_group_rates(lines: &[LineMeasurement], groups: &[LineGroup]) -> Vec<LineMeasurement> {
    let mut measured = lines.to_vec();
    for (group_index, group) in groups.iter().enumerate() {
        for line in &mut measured[group.range.clone()] {
            line.speed_1s = group.speed_1s;
            line.group = group_index;
        }
    }
    measured
}
