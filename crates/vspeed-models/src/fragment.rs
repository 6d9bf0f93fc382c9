//! Fragment encoding jobs and their measured results.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::segment::{AnnotatedSegment, SegmentKind};

/// Everything an encoder needs to produce one physical fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentJob {
    /// Position in the annotated timeline.
    pub index: usize,
    pub source: PathBuf,
    pub start_ms: u64,
    pub end_ms: u64,
    pub kind: SegmentKind,
    /// Inverse-speed factor (`setpts` multiplier).
    pub factor: f64,
    pub output: PathBuf,
}

impl FragmentJob {
    /// Build a job for annotated entry `index`, writing into `out_dir`.
    pub fn from_segment(
        index: usize,
        segment: &AnnotatedSegment,
        source: impl Into<PathBuf>,
        out_dir: &std::path::Path,
    ) -> Self {
        let output = out_dir.join(format!("{:05}_{}.ts", index, segment.label()));
        Self {
            index,
            source: source.into(),
            start_ms: segment.start_ms,
            end_ms: segment.end_ms,
            kind: segment.kind,
            factor: segment.factor,
            output,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        self.end_ms.saturating_sub(self.start_ms) as f64 / 1000.0
    }
}

/// Result of encoding one fragment.
///
/// `measured_secs` comes from probing the written file and is authoritative
/// over `factor * span`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentEncoding {
    pub segment_index: usize,
    pub kind: SegmentKind,
    pub start_ms: u64,
    pub end_ms: u64,
    pub factor: f64,
    pub measured_secs: f64,
    /// Written file, absent when encoding failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

impl FragmentEncoding {
    pub fn span_secs(&self) -> f64 {
        self.end_ms.saturating_sub(self.start_ms) as f64 / 1000.0
    }

    /// Whether this fragment made it into the concatenated output.
    pub fn is_usable(&self) -> bool {
        self.output.is_some() && self.measured_secs.is_finite() && self.measured_secs > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_job_from_segment() {
        let seg = AnnotatedSegment::new(1000, 3000, SegmentKind::Else, 0.25);
        let job = FragmentJob::from_segment(7, &seg, "/in.mp4", Path::new("/tmp/parts"));
        assert_eq!(job.output, Path::new("/tmp/parts/00007_else0.25.ts"));
        assert_eq!(job.kind, SegmentKind::Else);
        assert!((job.duration_secs() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_encoding_usable() {
        let mut enc = FragmentEncoding {
            segment_index: 0,
            kind: SegmentKind::Voice,
            start_ms: 0,
            end_ms: 1000,
            factor: 0.6,
            measured_secs: 0.6,
            output: Some(PathBuf::from("a.ts")),
        };
        assert!(enc.is_usable());
        enc.measured_secs = 0.0;
        assert!(!enc.is_usable());
    }
}
