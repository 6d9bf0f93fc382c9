//! Corpus-wide motion statistics shared by every else segment.

use serde::{Deserialize, Serialize};
use vspeed_models::percentile;

use crate::sampler::MotionSample;

/// Percentile above which the rolling average counts as high motion.
pub const HIGH_PERCENTILE: f64 = 80.0;
/// Percentile below which the rolling average counts as low motion.
pub const LOW_PERCENTILE: f64 = 20.0;

/// Immutable statistics over the magnitudes of all else segments.
///
/// Built once after every segment has been sampled; classification of any
/// segment only starts from a finished value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlobalMotionStats {
    pub p_high: f64,
    pub p_low: f64,
    pub min: f64,
    pub max: f64,
    pub sample_count: usize,
}

impl GlobalMotionStats {
    /// Pool every finite magnitude. `None` when there is none.
    pub fn from_samples<'a, I>(segments: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a [MotionSample]>,
    {
        let magnitudes: Vec<f64> = segments
            .into_iter()
            .flatten()
            .map(|s| s.magnitude)
            .filter(|m| m.is_finite())
            .collect();

        Some(Self {
            p_high: percentile(&magnitudes, HIGH_PERCENTILE)?,
            p_low: percentile(&magnitudes, LOW_PERCENTILE)?,
            min: magnitudes.iter().copied().reduce(f64::min)?,
            max: magnitudes.iter().copied().reduce(f64::max)?,
            sample_count: magnitudes.len(),
        })
    }

    /// Linear map from magnitude to acceleration: the calmest magnitude gets
    /// `acc_max`, the busiest `acc_min`. A degenerate range gives `acc_max`.
    pub fn acceleration_for(&self, magnitude: f64, acc_max: f64, acc_min: f64) -> f64 {
        let acc = acc_max - (acc_max - acc_min) / (self.max - self.min) * (magnitude - self.min);
        if acc.is_finite() {
            acc
        } else {
            acc_max
        }
    }
}
