//! Advisory quality assessment of a subtitle track.

use serde::{Deserialize, Serialize};
use tracing::warn;
use vspeed_models::{round_to, SPEED_DECIMALS};

use super::rate::LineMeasurement;
use crate::sampler::{LanguageDetector, ESPEAK_SEPARATOR};

/// A structural problem that lowers the quality score by one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QualityIssue {
    UnsortedStart,
    UnsortedEnd,
    NonPositiveDuration { lines: usize },
    TooFewLines { found: usize, required: usize },
    Overlap { index: usize },
    LanguageMismatch {
        expected: String,
        detected: Option<String>,
    },
}

impl std::fmt::Display for QualityIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsortedStart => write!(f, "lines are not sorted by start time"),
            Self::UnsortedEnd => write!(f, "lines are not sorted by end time"),
            Self::NonPositiveDuration { lines } => {
                write!(f, "{} line(s) have zero or negative duration", lines)
            }
            Self::TooFewLines { found, required } => {
                write!(f, "{} non-empty lines, at least {} required", found, required)
            }
            Self::Overlap { index } => write!(f, "line {} overlaps the next one", index),
            Self::LanguageMismatch { expected, detected } => write!(
                f,
                "text is not in '{}' (detected {})",
                expected,
                detected.as_deref().unwrap_or("nothing")
            ),
        }
    }
}

/// Thresholds used by [`assess_quality`].
#[derive(Debug, Clone)]
pub struct QualityCriteria<'a> {
    pub min_speed: f64,
    pub max_speed: f64,
    pub min_line_count: usize,
    pub language: &'a str,
}

/// Summary of the track's measurements and structural problems.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub line_count: usize,
    /// Lines whose group rate is below the slow bound.
    pub below_min_speed: usize,
    /// Lines whose group rate is above the fast bound.
    pub above_max_speed: usize,
    pub issues: Vec<QualityIssue>,
    /// `1 - (fraction too slow + fraction too fast)`.
    pub speed_score: f64,
    /// `speed_score` minus one point per issue.
    pub score: f64,
    pub detected_language: Option<String>,
    pub mean_speed: Option<f64>,
    pub max_speed: Option<f64>,
    pub min_speed: Option<f64>,
    pub mean_speed_1s: Option<f64>,
    pub max_speed_1s: Option<f64>,
    pub min_speed_1s: Option<f64>,
}

impl QualityReport {
    pub fn error_count(&self) -> usize {
        self.issues.len()
    }
}

fn finite(values: impl Iterator<Item = Option<f64>>) -> Vec<f64> {
    values.flatten().filter(|v| v.is_finite()).collect()
}

fn stats(values: &[f64]) -> (Option<f64>, Option<f64>, Option<f64>) {
    let mean = vspeed_models::mean(values).map(|m| round_to(m, SPEED_DECIMALS));
    let max = values.iter().copied().reduce(f64::max);
    let min = values.iter().copied().reduce(f64::min);
    (mean, max, min)
}

fn is_sorted_by<F: Fn(&LineMeasurement) -> u64>(lines: &[LineMeasurement], key: F) -> bool {
    lines.windows(2).all(|pair| key(&pair[0]) <= key(&pair[1]))
}

/// Validate a measured track and compute its score.
pub fn assess_quality(
    lines: &[LineMeasurement],
    criteria: &QualityCriteria<'_>,
    detector: &dyn LanguageDetector,
) -> QualityReport {
    let mut issues = Vec::new();

    if !is_sorted_by(lines, |l| l.start_ms) {
        issues.push(QualityIssue::UnsortedStart);
    }
    if !is_sorted_by(lines, |l| l.end_ms) {
        issues.push(QualityIssue::UnsortedEnd);
    }

    let non_positive = lines.iter().filter(|l| l.duration <= 0.0).count();
    if non_positive > 0 {
        issues.push(QualityIssue::NonPositiveDuration {
            lines: non_positive,
        });
    }

    if lines.len() < criteria.min_line_count {
        issues.push(QualityIssue::TooFewLines {
            found: lines.len(),
            required: criteria.min_line_count,
        });
    }

    for (i, pair) in lines.windows(2).enumerate() {
        if pair[1].start_ms < pair[0].end_ms {
            issues.push(QualityIssue::Overlap { index: i });
        }
    }

    let mut detected_language = None;
    if lines.len() > 1 {
        let corpus = lines
            .iter()
            .map(|l| l.graphemes.as_str())
            .collect::<Vec<_>>()
            .join(ESPEAK_SEPARATOR);
        detected_language = detector.detect(&corpus);
        if detected_language.as_deref() != Some(criteria.language) {
            issues.push(QualityIssue::LanguageMismatch {
                expected: criteria.language.to_string(),
                detected: detected_language.clone(),
            });
        }
    }

    let below_min_speed = lines
        .iter()
        .filter(|l| matches!(l.speed_1s, Some(s) if s < criteria.min_speed))
        .count();
    let above_max_speed = lines
        .iter()
        .filter(|l| matches!(l.speed_1s, Some(s) if s > criteria.max_speed))
        .count();

    let speed_score = if lines.is_empty() {
        1.0
    } else {
        let n = lines.len() as f64;
        round_to(
            1.0 - (below_min_speed as f64 / n + above_max_speed as f64 / n),
            SPEED_DECIMALS,
        )
    };
    let score = speed_score - issues.len() as f64;

    for issue in &issues {
        warn!(issue = %issue, "Subtitle track quality problem");
    }
    if below_min_speed > 0 || above_max_speed > 0 {
        warn!(
            below_min_speed,
            above_max_speed,
            min_speed = criteria.min_speed,
            max_speed = criteria.max_speed,
            "Lines outside the expected speaking rate"
        );
    }

    let (mean_speed, max_speed, min_speed) = stats(&finite(lines.iter().map(|l| l.speed)));
    let (mean_speed_1s, max_speed_1s, min_speed_1s) =
        stats(&finite(lines.iter().map(|l| l.speed_1s)));

    QualityReport {
        line_count: lines.len(),
        below_min_speed,
        above_max_speed,
        issues,
        speed_score,
        score,
        detected_language,
        mean_speed,
        max_speed,
        min_speed,
        mean_speed_1s,
        max_speed_1s,
        min_speed_1s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedLanguage(Option<&'static str>);

    impl LanguageDetector for FixedLanguage {
        fn detect(&self, _text: &str) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    fn line(start_ms: u64, end_ms: u64, speed_1s: f64) -> LineMeasurement {
        LineMeasurement {
            index: 0,
            start_ms,
            end_ms,
            graphemes: "hola".to_string(),
            phonemes: String::new(),
            phoneme_count: 0,
            duration: (end_ms as f64 - start_ms as f64) / 1000.0,
            speed: Some(speed_1s),
            speed_1s: Some(speed_1s),
            group: 0,
            target_speed_1s: None,
            acceleration_1s: None,
        }
    }

    fn criteria(min_line_count: usize) -> QualityCriteria<'static> {
        QualityCriteria {
            min_speed: 4.0,
            max_speed: 20.0,
            min_line_count,
            language: "es",
        }
    }

    #[test]
    fn test_clean_track_scores_one() {
        let lines = vec![line(0, 1000, 10.0), line(1000, 2000, 12.0)];
        let report = assess_quality(&lines, &criteria(2), &FixedLanguage(Some("es")));
        assert!(report.issues.is_empty());
        assert_eq!(report.score, 1.0);
        assert_eq!(report.mean_speed_1s, Some(11.0));
        assert_eq!(report.max_speed_1s, Some(12.0));
        assert_eq!(report.min_speed_1s, Some(10.0));
    }

    #[test]
    fn test_speed_fractions() {
        let lines = vec![
            line(0, 1000, 2.0),
            line(1000, 2000, 10.0),
            line(2000, 3000, 25.0),
            line(3000, 4000, 10.0),
        ];
        let report = assess_quality(&lines, &criteria(1), &FixedLanguage(Some("es")));
        assert_eq!(report.below_min_speed, 1);
        assert_eq!(report.above_max_speed, 1);
        assert_eq!(report.speed_score, 0.5);
        assert_eq!(report.score, 0.5);
    }

    #[test]
    fn test_structural_errors_subtract() {
        // Second line starts before the first ends and ends earlier: unsorted end + overlap.
        let lines = vec![line(0, 3000, 10.0), line(1000, 2000, 10.0), line(2000, 2000, 10.0)];
        let report = assess_quality(&lines, &criteria(50), &FixedLanguage(Some("en")));
        let kinds: Vec<String> = report.issues.iter().map(|i| format!("{:?}", i)).collect();
        assert_eq!(report.error_count(), 5, "{:?}", kinds);
        assert!(report.issues.contains(&QualityIssue::UnsortedEnd));
        assert!(report.issues.contains(&QualityIssue::NonPositiveDuration { lines: 1 }));
        assert!(report.issues.contains(&QualityIssue::Overlap { index: 0 }));
        assert!(report
            .issues
            .contains(&QualityIssue::TooFewLines { found: 3, required: 50 }));
        assert!((report.score - (1.0 - 5.0)).abs() < 1e-9);
    }

    #[test]
    fn test_language_skipped_for_single_line() {
        let lines = vec![line(0, 1000, 10.0)];
        let report = assess_quality(&lines, &criteria(1), &FixedLanguage(None));
        assert!(report.issues.is_empty());
        assert_eq!(report.detected_language, None);
    }
}
