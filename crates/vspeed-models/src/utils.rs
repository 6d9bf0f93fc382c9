//! Numeric helpers shared by the voice and motion stages.

/// Decimals kept for speeds and the quality score.
pub const SPEED_DECIMALS: i32 = 4;

/// Decimals kept for inverse-speed factors.
pub const FACTOR_DECIMALS: i32 = 3;

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// Keep a factor inside `[lowest, highest]`.
///
/// Lower bound first, then upper: inverted bounds resolve to `highest`.
pub fn bound_factor(value: f64, lowest: f64, highest: f64) -> f64 {
    value.max(lowest).min(highest)
}

/// Arithmetic mean; `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Percentile with linear interpolation between closest ranks.
///
/// `pct` is in `[0, 100]`. Non-finite values are ignored.
pub fn percentile(values: &[f64], pct: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (pct.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}
