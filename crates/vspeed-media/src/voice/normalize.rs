//! Mapping group speaking rates onto a target range.

use serde::{Deserialize, Serialize};
use vspeed_models::{bound_factor, round_to, Segment, SettingWarning, FACTOR_DECIMALS, SPEED_DECIMALS};

use super::rate::LineMeasurement;

/// Target speaking-rate range after correction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetSpeeds {
    pub min: f64,
    pub max: f64,
}

/// Fill in missing or unusable target speeds from corpus statistics.
///
/// A missing or non-positive minimum becomes the corpus mean rate; a missing,
/// non-positive or too small maximum becomes the corpus maximum rate. Both end
/// up rounded to one decimal.
pub fn correct_target_speeds(
    requested_min: Option<f64>,
    requested_max: Option<f64>,
    mean_speed_1s: f64,
    max_speed_1s: f64,
) -> (TargetSpeeds, Vec<SettingWarning>) {
    let mut warnings = Vec::new();

    let min = match requested_min {
        Some(v) if v > 0.0 => v,
        other => {
            warnings.push(SettingWarning::new(
                "target_min_speed",
                format!(
                    "{} is unusable, using the mean rate {}",
                    describe(other),
                    mean_speed_1s
                ),
            ));
            mean_speed_1s
        }
    };

    let max = match requested_max {
        Some(v) if v > 0.0 && v >= min => v,
        other => {
            warnings.push(SettingWarning::new(
                "target_max_speed",
                format!(
                    "{} is unusable with minimum {}, using the maximum rate {}",
                    describe(other),
                    min,
                    max_speed_1s
                ),
            ));
            max_speed_1s
        }
    };

    (
        TargetSpeeds {
            min: round_to(min, 1),
            max: round_to(max, 1),
        },
        warnings,
    )
}

fn describe(value: Option<f64>) -> String {
    value.map_or_else(|| "missing value".to_string(), |v| v.to_string())
}

/// Map every line's group rate into `targets` and derive its acceleration.
///
/// Normalization uses the corpus extremes; when they coincide every line maps
/// to `targets.min`.
pub fn map_accelerations(lines: &[LineMeasurement], targets: &TargetSpeeds) -> Vec<LineMeasurement> {
    let rates: Vec<f64> = lines
        .iter()
        .filter_map(|l| l.speed_1s)
        .filter(|s| s.is_finite() && *s > 0.0)
        .collect();
    let lowest = rates.iter().copied().reduce(f64::min);
    let highest = rates.iter().copied().reduce(f64::max);

    lines
        .iter()
        .map(|line| {
            let mut mapped = line.clone();
            if let (Some(speed), Some(lo), Some(hi)) = (line.speed_1s, lowest, highest) {
                if speed.is_finite() && speed > 0.0 {
                    let target = if hi > lo {
                        (targets.max - targets.min) / (hi - lo) * (speed - lo) + targets.min
                    } else {
                        targets.min
                    };
                    let target = round_to(target, SPEED_DECIMALS);
                    mapped.target_speed_1s = Some(target);
                    mapped.acceleration_1s = Some(round_to(target / speed, SPEED_DECIMALS));
                }
            }
            mapped
        })
        .collect()
}

/// Factor chosen for one voice segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentFactor {
    /// Inverse speed before bounding, rounded to three decimals.
    pub raw: f64,
    pub factor: f64,
    pub contributing_lines: usize,
}

impl SegmentFactor {
    pub fn was_bounded(&self) -> bool {
        self.raw != self.factor
    }
}

/// Inverse-speed factor for `segment` from the lines lying fully inside it.
///
/// `None` when no measured line falls inside the segment.
pub fn segment_factor(
    segment: &Segment,
    lines: &[LineMeasurement],
    bounds: (f64, f64),
) -> Option<SegmentFactor> {
    let accelerations: Vec<f64> = lines
        .iter()
        .filter(|l| segment.contains_span(l.start_ms, l.end_ms))
        .filter_map(|l| l.acceleration_1s)
        .filter(|a| a.is_finite() && *a > 0.0)
        .collect();

    if accelerations.is_empty() {
        return None;
    }

    let total: f64 = accelerations.iter().sum();
    let raw = round_to(accelerations.len() as f64 / total, FACTOR_DECIMALS);
    Some(SegmentFactor {
        raw,
        factor: bound_factor(raw, bounds.0, bounds.1),
        contributing_lines: accelerations.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vspeed_models::SegmentKind;

    fn line(start_ms: u64, end_ms: u64, speed_1s: f64) -> LineMeasurement {
        LineMeasurement {
            index: 0,
            start_ms,
            end_ms,
            graphemes: String::new(),
            phonemes: String::new(),
            phoneme_count: 0,
            duration: (end_ms - start_ms) as f64 / 1000.0,
            speed: Some(speed_1s),
            speed_1s: Some(speed_1s),
            group: 0,
            target_speed_1s: None,
            acceleration_1s: None,
        }
    }

    #[test]
    fn test_targets_kept_when_valid() {
        let (targets, warnings) = correct_target_speeds(Some(12.04), Some(15.0), 10.0, 18.0);
        assert!(warnings.is_empty());
        assert_eq!(targets, TargetSpeeds { min: 12.0, max: 15.0 });
    }

    #[test]
    fn test_targets_substituted() {
        let (targets, warnings) = correct_target_speeds(None, Some(-1.0), 11.26, 17.98);
        assert_eq!(warnings.len(), 2);
        assert_eq!(targets, TargetSpeeds { min: 11.3, max: 18.0 });
    }

    #[test]
    fn test_target_max_below_min() {
        let (targets, warnings) = correct_target_speeds(Some(14.0), Some(12.0), 10.0, 16.0);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "target_max_speed");
        assert_eq!(targets, TargetSpeeds { min: 14.0, max: 16.0 });
    }

    #[test]
    fn test_linear_mapping() {
        let lines = vec![line(0, 1000, 10.0), line(1000, 2000, 15.0), line(2000, 3000, 20.0)];
        let targets = TargetSpeeds { min: 12.0, max: 16.0 };
        let mapped = map_accelerations(&lines, &targets);
        assert_eq!(mapped[0].target_speed_1s, Some(12.0));
        assert_eq!(mapped[1].target_speed_1s, Some(14.0));
        assert_eq!(mapped[2].target_speed_1s, Some(16.0));
        assert_eq!(mapped[0].acceleration_1s, Some(1.2));
        assert_eq!(mapped[2].acceleration_1s, Some(0.8));
    }

    #[test]
    fn test_degenerate_range_uses_minimum() {
        let lines = vec![line(0, 1000, 10.0), line(1000, 2000, 10.0)];
        let targets = TargetSpeeds { min: 12.0, max: 16.0 };
        let mapped = map_accelerations(&lines, &targets);
        assert!(mapped.iter().all(|l| l.target_speed_1s == Some(12.0)));
        assert!(mapped.iter().all(|l| l.acceleration_1s == Some(1.2)));
    }

    #[test]
    fn test_segment_factor_inverse_of_mean() {
        let mut lines = vec![line(0, 1000, 10.0), line(1000, 2000, 10.0), line(5000, 6000, 10.0)];
        lines[0].acceleration_1s = Some(1.5);
        lines[1].acceleration_1s = Some(1.9);
        lines[2].acceleration_1s = Some(3.0);
        let segment = Segment::new(0, 2500, SegmentKind::Voice);
        let result = segment_factor(&segment, &lines, (1.0 / 1.7, 1.0)).unwrap();
        assert_eq!(result.contributing_lines, 2);
        assert_eq!(result.raw, 0.588);
        // 0.588 is just below 1/1.7, so the bound applies.
        assert!((result.factor - 1.0 / 1.7).abs() < 1e-12);
        assert!(result.was_bounded());
    }

    #[test]
    fn test_segment_factor_within_bounds() {
        let mut lines = vec![line(0, 1000, 10.0)];
        lines[0].acceleration_1s = Some(1.25);
        let segment = Segment::new(0, 1000, SegmentKind::Voice);
        let result = segment_factor(&segment, &lines, (1.0 / 1.7, 1.0)).unwrap();
        assert_eq!(result.factor, 0.8);
        assert!(!result.was_bounded());
    }

    #[test]
    fn test_segment_without_lines() {
        let lines = vec![line(0, 1000, 10.0)];
        let segment = Segment::new(3000, 4000, SegmentKind::Voice);
        assert_eq!(segment_factor(&segment, &lines, (0.5, 1.0)), None);
    }
}
