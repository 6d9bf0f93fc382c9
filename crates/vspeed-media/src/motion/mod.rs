//! Motion-driven acceleration of else segments.
//!
//! Runs in two phases separated by a barrier:
//!
//! 1. [`MotionSegmenter::sample`] probes every else segment concurrently and
//!    the pooled magnitudes become one immutable [`GlobalMotionStats`].
//! 2. [`accelerate_segment`] is a pure function of one segment's samples, its
//!    scene cuts and the shared statistics. [`MotionSegmenter::accelerate`]
//!    runs it over all segments on the rayon pool, from a blocking task.
//!
//! Per segment the hysteresis curve is corrected against scene cuts, equal
//! speeds are coalesced and one else sub-segment is emitted per group.

mod coalesce;
mod hysteresis;
mod scene;
mod stats;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use futures::future::join_all;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use vspeed_models::{AccelerationSettings, AnnotatedSegment, Segment, SegmentKind};

use crate::sampler::{sample_motion, MotionProbe, MotionSample, SceneCutDetector};

pub use coalesce::{coalesce, emit_subsegments, single_subsegment, MotionGroup};
pub use hysteresis::{classify, window_len, Classification, ClassifiedSample, MotionState};
pub use scene::correct_for_scenes;
pub use stats::{GlobalMotionStats, HIGH_PERCENTILE, LOW_PERCENTILE};

/// Motion parameters taken from the acceleration settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionParams {
    pub acc_max: f64,
    pub acc_min: f64,
    /// Seconds; sets the rolling window and guards transitions near the end.
    pub min_video_duration: f64,
    pub min_acc_scene_duration: f64,
}

impl MotionParams {
    pub fn from_settings(settings: &AccelerationSettings) -> Self {
        Self {
            acc_max: settings.acc_motion_max,
            acc_min: settings.acc_motion_min,
            min_video_duration: settings.min_video_duration,
            min_acc_scene_duration: settings.min_acc_scene_duration,
        }
    }

    /// Allowed inverse factor range `(lowest, highest)`.
    pub fn factor_bounds(&self) -> (f64, f64) {
        (1.0 / self.acc_max, 1.0 / self.acc_min)
    }
}

/// Phase-1 output for one else segment.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentSamples {
    /// Position in the base timeline.
    pub index: usize,
    pub segment: Segment,
    /// `None` when probing failed.
    pub samples: Option<Vec<MotionSample>>,
    /// Scene end times relative to the segment start.
    pub cuts: Vec<f64>,
}

/// Phase-2 output for one else segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionPlan {
    pub index: usize,
    pub subsegments: Vec<AnnotatedSegment>,
    pub low_confidence: bool,
}

/// Else sub-segments per base-timeline index.
pub type MotionFactors = BTreeMap<usize, Vec<AnnotatedSegment>>;

/// Turn one segment's samples into else sub-segments.
pub fn accelerate_segment(
    segment: &Segment,
    samples: &[MotionSample],
    cuts: &[f64],
    stats: &GlobalMotionStats,
    params: &MotionParams,
) -> (Vec<AnnotatedSegment>, bool) {
    let bounds = params.factor_bounds();
    let classified = match classify(samples, stats, params) {
        Classification::Curve(classified) => classified,
        Classification::LowConfidence => {
            return (vec![single_subsegment(segment, params.acc_min, bounds)], true);
        }
    };

    let corrected = correct_for_scenes(&classified, cuts, params.min_acc_scene_duration);
    let groups = coalesce(&corrected);
    (emit_subsegments(segment, &corrected, &groups, bounds), false)
}

/// Samples and accelerates every else segment of a timeline.
pub struct MotionSegmenter {
    probe: Arc<dyn MotionProbe>,
    scenes: Arc<dyn SceneCutDetector>,
    max_parallel: usize,
}

impl MotionSegmenter {
    pub fn new(probe: Arc<dyn MotionProbe>, scenes: Arc<dyn SceneCutDetector>) -> Self {
        Self {
            probe,
            scenes,
            max_parallel: 4,
        }
    }

    /// Builder-style setter for the number of concurrent probes.
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    /// Whole pipeline: podcast shortcut or sample, barrier, accelerate.
    pub async fn run(
        &self,
        source: &Path,
        timeline: &[Segment],
        settings: &AccelerationSettings,
    ) -> MotionFactors {
        if settings.podcast {
            return podcast_factors(timeline, settings);
        }
        let sampled = self.sample(source, timeline, settings).await;
        let stats = GlobalMotionStats::from_samples(
            sampled.iter().filter_map(|s| s.samples.as_deref()),
        );
        match &stats {
            Some(stats) => info!(
                p_high = stats.p_high,
                p_low = stats.p_low,
                min = stats.min,
                max = stats.max,
                samples = stats.sample_count,
                "Global motion statistics"
            ),
            None => warn!("No motion samples in any else segment"),
        }

        let params = MotionParams::from_settings(settings);
        let spans: Vec<(usize, Segment)> = sampled.iter().map(|s| (s.index, s.segment)).collect();
        // Phase 2 is CPU-bound; keep it off the async workers.
        let plans = match tokio::task::spawn_blocking(move || {
            Self::accelerate(&sampled, stats.as_ref(), &params)
        })
        .await
        {
            Ok(plans) => plans,
            Err(e) => {
                warn!(error = %e, "Motion acceleration task failed, else segments get minimum acceleration");
                spans
                    .iter()
                    .map(|(index, segment)| MotionPlan {
                        index: *index,
                        subsegments: vec![single_subsegment(segment, params.acc_min, params.factor_bounds())],
                        low_confidence: true,
                    })
                    .collect()
            }
        };

        plans
            .into_iter()
            .map(|plan| (plan.index, plan.subsegments))
            .collect()
    }

    /// Phase 1: probe motion and scene cuts of every else segment.
    pub async fn sample(
        &self,
        source: &Path,
        timeline: &[Segment],
        settings: &AccelerationSettings,
    ) -> Vec<SegmentSamples> {
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));

        let futures: Vec<_> = timeline
            .iter()
            .enumerate()
            .filter(|(_, s)| s.kind == SegmentKind::Else)
            .map(|(index, segment)| {
                let semaphore = Arc::clone(&semaphore);
                async move {
                    let _permit = semaphore.acquire().await.ok();
                    self.sample_one(source, index, segment, settings).await
                }
            })
            .collect();

        join_all(futures).await
    }

    async fn sample_one(
        &self,
        source: &Path,
        index: usize,
        segment: &Segment,
        settings: &AccelerationSettings,
    ) -> SegmentSamples {
        let samples = match self.probe.trace(source, segment, settings.frame_skip).await {
            Ok(trace) => {
                let samples = sample_motion(&trace, settings.frame_skip);
                debug!(segment = index, samples = samples.len(), "Motion sampled");
                Some(samples)
            }
            Err(e) => {
                warn!(segment = index, error = %e, "Motion probe failed, segment gets minimum acceleration");
                None
            }
        };

        let cuts = if samples.as_ref().map_or(false, |s| !s.is_empty()) {
            match self
                .scenes
                .scene_cuts(source, segment, settings.scene_cut_threshold)
                .await
            {
                Ok(cuts) => cuts,
                Err(e) => {
                    warn!(segment = index, error = %e, "Scene detection failed, using a single scene");
                    vec![segment.duration_secs()]
                }
            }
        } else {
            Vec::new()
        };

        SegmentSamples {
            index,
            segment: *segment,
            samples,
            cuts,
        }
    }

    /// Phase 2: classify every sampled segment in parallel.
    ///
    /// Without statistics every segment is low-confidence.
    pub fn accelerate(
        sampled: &[SegmentSamples],
        stats: Option<&GlobalMotionStats>,
        params: &MotionParams,
    ) -> Vec<MotionPlan> {
        sampled
            .par_iter()
            .map(|entry| {
                let (subsegments, low_confidence) = match (&entry.samples, stats) {
                    (Some(samples), Some(stats)) => {
                        accelerate_segment(&entry.segment, samples, &entry.cuts, stats, params)
                    }
                    _ => (
                        vec![single_subsegment(&entry.segment, params.acc_min, params.factor_bounds())],
                        true,
                    ),
                };
                if low_confidence {
                    debug!(segment = entry.index, "Low-confidence motion segment");
                }
                MotionPlan {
                    index: entry.index,
                    subsegments,
                    low_confidence,
                }
            })
            .collect()
    }
}

/// Constant factor for every else segment, no probing.
pub fn podcast_factors(timeline: &[Segment], settings: &AccelerationSettings) -> MotionFactors {
    let factor = settings.motion_constant_factor();
    info!(factor, "Podcast mode, constant else factor");
    timeline
        .iter()
        .enumerate()
        .filter(|(_, s)| s.kind == SegmentKind::Else)
        .map(|(index, s)| {
            (
                index,
                vec![AnnotatedSegment::new(s.start_ms, s.end_ms, SegmentKind::Else, factor)],
            )
        })
        .collect()
}
