//! Per-line audit table of the speech-rate measurements.
//!
//! Rendered as `;`-separated text with decimal commas so that spreadsheet
//! tools in comma-decimal locales open it directly. Corpus-wide values are
//! only filled on the first data row.

use std::path::Path;

use vspeed_models::format_ms;

use super::normalize::TargetSpeeds;
use super::quality::QualityReport;
use super::rate::LineMeasurement;
use crate::error::MediaResult;

const SEPARATOR: char = ';';

const COLUMNS: &[&str] = &[
    "index",
    "start-time",
    "end-time",
    "subtitles-graphemes",
    "subtitles-phonemes",
    "phonemes-number",
    "time-diff",
    "speed",
    "group",
    "speed-1s",
    "target-speed-1s",
    "acceleration-factor-1s",
    "n_errors",
    "subtitle-score",
    "mean-speed",
    "max-speed",
    "min-speed",
    "mean-speed-1s",
    "max-speed-1s",
    "min-speed-1s",
    "index-min-speed",
    "index-max-speed",
    "target-speed-min",
    "target-speed-max",
];

/// Rendered audit rows, header excluded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditTable {
    rows: Vec<Vec<String>>,
}

fn decimal(value: f64) -> String {
    value.to_string().replace('.', ",")
}

fn optional(value: Option<f64>) -> String {
    value.map(decimal).unwrap_or_default()
}

fn quote(cell: &str) -> String {
    if cell.contains(SEPARATOR) || cell.contains('"') || cell.contains('\n') {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

impl AuditTable {
    pub fn new(
        lines: &[LineMeasurement],
        report: Option<&QualityReport>,
        targets: Option<&TargetSpeeds>,
    ) -> Self {
        let rows = lines
            .iter()
            .enumerate()
            .map(|(i, line)| {
                let mut row = vec![
                    line.index.to_string(),
                    format_ms(line.start_ms),
                    format_ms(line.end_ms),
                    line.graphemes.clone(),
                    line.phonemes.clone(),
                    line.phoneme_count.to_string(),
                    decimal(line.duration),
                    optional(line.speed),
                    line.group.to_string(),
                    optional(line.speed_1s),
                    optional(line.target_speed_1s),
                    optional(line.acceleration_1s),
                ];
                match (i, report) {
                    (0, Some(report)) => {
                        row.extend([
                            report.error_count().to_string(),
                            decimal(report.score),
                            optional(report.mean_speed),
                            optional(report.max_speed),
                            optional(report.min_speed),
                            optional(report.mean_speed_1s),
                            optional(report.max_speed_1s),
                            optional(report.min_speed_1s),
                            report.below_min_speed.to_string(),
                            report.above_max_speed.to_string(),
                            optional(targets.map(|t| t.min)),
                            optional(targets.map(|t| t.max)),
                        ]);
                    }
                    _ => row.resize(COLUMNS.len(), String::new()),
                }
                row
            })
            .collect();

        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn render(&self) -> String {
        let mut out = COLUMNS.join(&SEPARATOR.to_string());
        out.push('\n');
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(|c| quote(c)).collect();
            out.push_str(&cells.join(&SEPARATOR.to_string()));
            out.push('\n');
        }
        out
    }

    pub async fn write(&self, path: impl AsRef<Path>) -> MediaResult<()> {
        tokio::fs::write(path.as_ref(), self.render()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(index: usize, text: &str) -> LineMeasurement {
        LineMeasurement {
            index,
            start_ms: 1500,
            end_ms: 3250,
            graphemes: text.to_string(),
            phonemes: "ˈo_l_a".to_string(),
            phoneme_count: 3,
            duration: 1.75,
            speed: Some(1.7143),
            speed_1s: Some(1.7143),
            group: 0,
            target_speed_1s: Some(12.0),
            acceleration_1s: None,
        }
    }

    fn report() -> QualityReport {
        QualityReport {
            line_count: 2,
            below_min_speed: 2,
            above_max_speed: 0,
            issues: Vec::new(),
            speed_score: 0.0,
            score: 0.0,
            detected_language: Some("es".to_string()),
            mean_speed: Some(1.7143),
            max_speed: Some(1.7143),
            min_speed: Some(1.7143),
            mean_speed_1s: Some(1.7143),
            max_speed_1s: Some(1.7143),
            min_speed_1s: Some(1.7143),
        }
    }

    #[test]
    fn test_render_layout() {
        let targets = TargetSpeeds { min: 12.0, max: 15.5 };
        let table = AuditTable::new(&[line(0, "hola"), line(1, "adiós")], Some(&report()), Some(&targets));
        let text = table.render();
        let rows: Vec<&str> = text.lines().collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].starts_with("index;start-time;end-time"));

        let first: Vec<&str> = rows[1].split(';').collect();
        assert_eq!(first.len(), COLUMNS.len());
        assert_eq!(first[1], "00:00:01.500");
        assert_eq!(first[6], "1,75");
        assert_eq!(first[11], "");
        assert_eq!(first[COLUMNS.len() - 1], "15,5");

        let second: Vec<&str> = rows[2].split(';').collect();
        assert_eq!(second.len(), COLUMNS.len());
        assert!(second[12..].iter().all(|c| c.is_empty()));
    }

    #[test]
    fn test_separator_in_text_is_quoted() {
        let table = AuditTable::new(&[line(0, "uno; dos")], None, None);
        assert!(table.render().contains("\"uno; dos\""));
    }

    #[tokio::test]
    async fn test_write_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voice_audit.csv");
        let table = AuditTable::new(&[line(0, "hola")], Some(&report()), None);
        table.write(&path).await.unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, table.render());
    }
}
