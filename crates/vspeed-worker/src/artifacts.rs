//! Pipeline inputs and the files written into the output directory.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use vspeed_models::{FragmentEncoding, Segment, SubtitleLine};

use crate::error::{WorkerError, WorkerResult};

pub const ANNOTATED_TIMELINE: &str = "annotated_timeline.json";
pub const VOICE_AUDIT: &str = "voice_audit.csv";
pub const QUALITY_REPORT: &str = "quality_report.json";
pub const FRAGMENTS: &str = "fragments.json";
pub const SPEEDUP_SUBS: &str = "speedup_subs.json";
/// Subdirectory holding the encoded fragments.
pub const FRAGMENT_DIR: &str = "fragments";

/// Measured fragments plus the merged output they went into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentManifest {
    pub output: PathBuf,
    /// Measured duration of `output`, after retiming when one was applied.
    pub final_secs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retime_factor: Option<f64>,
    pub fragments: Vec<FragmentEncoding>,
}

impl FragmentManifest {
    pub fn usable_count(&self) -> usize {
        self.fragments.iter().filter(|f| f.is_usable()).count()
    }
}

/// Read and parse a JSON file.
pub async fn read_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> WorkerResult<T> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| WorkerError::artifact_read(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| WorkerError::artifact_read(path, e))
}

/// Serialize `value` as pretty JSON into `path`.
pub async fn write_json<T: Serialize>(path: impl AsRef<Path>, value: &T) -> WorkerResult<()> {
    let path = path.as_ref();
    let json = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(path, json).await?;
    debug!(path = %path.display(), "Artifact written");
    Ok(())
}

/// Load the base timeline.
pub async fn load_timeline(path: impl AsRef<Path>) -> WorkerResult<Vec<Segment>> {
    let timeline: Vec<Segment> = read_json(path.as_ref()).await?;
    if timeline.is_empty() {
        return Err(WorkerError::invalid_input(format!(
            "{} holds no segment",
            path.as_ref().display()
        )));
    }
    Ok(timeline)
}

/// Load a subtitle track; lines are returned sorted by start.
pub async fn load_subtitles(path: impl AsRef<Path>) -> WorkerResult<Vec<SubtitleLine>> {
    let mut lines: Vec<SubtitleLine> = read_json(path).await?;
    lines.sort_by_key(|l| l.start_ms);
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vspeed_models::SegmentKind;

    #[tokio::test]
    async fn test_timeline_roundtrip_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timeline.json");

        tokio::fs::write(
            &path,
            r#"[{"start_ms":0,"end_ms":1500,"kind":"voice"},{"start_ms":1500,"end_ms":4000,"kind":"else"}]"#,
        )
        .await
        .unwrap();
        let timeline = load_timeline(&path).await.unwrap();
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline[1].kind, SegmentKind::Else);

        tokio::fs::write(&path, "[]").await.unwrap();
        let err = load_timeline(&path).await.unwrap_err();
        assert!(matches!(err, WorkerError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_subtitles_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subs.json");
        write_json(
            &path,
            &vec![
                SubtitleLine::new(3000, 4000, "dos"),
                SubtitleLine::new(0, 2000, "uno"),
            ],
        )
        .await
        .unwrap();

        let lines = load_subtitles(&path).await.unwrap();
        assert_eq!(lines[0].text, "uno");
    }

    #[tokio::test]
    async fn test_missing_file_names_path() {
        let err = read_json::<Vec<Segment>>("/nonexistent/vspeed/timeline.json")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/vspeed/timeline.json"));
    }
}
