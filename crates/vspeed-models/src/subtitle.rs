//! Subtitle lines before and after acceleration.

use serde::{Deserialize, Serialize};

/// One line of the original subtitle track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleLine {
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
}

impl SubtitleLine {
    pub fn new(start_ms: u64, end_ms: u64, text: impl Into<String>) -> Self {
        Self {
            start_ms,
            end_ms,
            text: text.into(),
        }
    }

    /// Signed duration in milliseconds; malformed tracks can have negative lines.
    pub fn duration_ms(&self) -> i64 {
        self.end_ms as i64 - self.start_ms as i64
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_ms() as f64 / 1000.0
    }

    /// Midpoint of the line, used to assign it to a fragment.
    pub fn midpoint_ms(&self) -> u64 {
        self.start_ms + self.end_ms.saturating_sub(self.start_ms) / 2
    }
}

/// A subtitle placed on the accelerated output timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructedSubtitle {
    /// Start in seconds on the output timeline.
    pub start: f64,
    /// End in seconds on the output timeline.
    pub end: f64,
    pub text: String,
}

impl ReconstructedSubtitle {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_duration_and_midpoint() {
        let line = SubtitleLine::new(2200, 3000, "hola");
        assert_eq!(line.duration_ms(), 800);
        assert!((line.duration_secs() - 0.8).abs() < 1e-9);
        assert_eq!(line.midpoint_ms(), 2600);

        let inverted = SubtitleLine::new(3000, 2000, "mal");
        assert_eq!(inverted.duration_ms(), -1000);
        assert_eq!(inverted.midpoint_ms(), 3000);
    }

    #[test]
    fn test_subtitle_json() {
        let parsed: Vec<SubtitleLine> =
            serde_json::from_str(r#"[{"start_ms":0,"end_ms":2000,"text":"uno"}]"#).unwrap();
        assert_eq!(parsed[0].text, "uno");
    }
}
