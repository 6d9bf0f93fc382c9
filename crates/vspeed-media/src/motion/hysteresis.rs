//! Two-state hysteresis over a rolling motion average.

use serde::{Deserialize, Serialize};

use super::stats::GlobalMotionStats;
use super::MotionParams;
use crate::sampler::MotionSample;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionState {
    Low,
    High,
}

/// A sample with its hysteresis interval and acceleration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedSample {
    pub sample: MotionSample,
    pub rolling_average: f64,
    pub state: MotionState,
    /// Incremented on every state transition.
    pub interval: usize,
    pub acc: f64,
    /// Filled in by scene correction.
    pub scene: usize,
}

/// Result of running the state machine over one segment.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// Too few samples to fill one window.
    LowConfidence,
    Curve(Vec<ClassifiedSample>),
}

/// Samples covered by `min_video_duration` at the trace's sampling rate.
///
/// `None` without two samples at increasing times.
pub fn window_len(samples: &[MotionSample], min_video_duration: f64) -> Option<usize> {
    let [first, second, ..] = samples else {
        return None;
    };
    let spacing = second.time - first.time;
    if !(spacing > 0.0) {
        return None;
    }
    Some(((min_video_duration / spacing).floor() as usize).max(1))
}

/// Classify every sample of one segment.
///
/// The ring buffer starts zeroed, so the first averages are damped. No
/// transition happens while less than `min_video_duration` remains.
pub fn classify(
    samples: &[MotionSample],
    stats: &GlobalMotionStats,
    params: &MotionParams,
) -> Classification {
    let Some(window) = window_len(samples, params.min_video_duration) else {
        return Classification::LowConfidence;
    };
    if samples.len() <= window {
        return Classification::LowConfidence;
    }

    let acc_for = |avg: f64| stats.acceleration_for(avg, params.acc_max, params.acc_min);

    let mut ring = vec![0.0; window];
    let mut state = MotionState::Low;
    let mut interval = 0;
    let mut out: Vec<ClassifiedSample> = Vec::with_capacity(samples.len());

    for (i, sample) in samples.iter().enumerate() {
        ring[i % window] = sample.magnitude;
        let avg = ring.iter().sum::<f64>() / window as f64;

        let acc = if i < window {
            // Seeded once the window is full.
            f64::NAN
        } else if i == window {
            let seeded = acc_for(avg);
            for earlier in &mut out {
                earlier.acc = seeded;
            }
            seeded
        } else {
            let can_switch = sample.remaining >= params.min_video_duration;
            match state {
                MotionState::Low if can_switch && avg > stats.p_high => {
                    state = MotionState::High;
                    interval += 1;
                    acc_for(avg)
                }
                MotionState::High if can_switch && avg < stats.p_low => {
                    state = MotionState::Low;
                    interval += 1;
                    acc_for(avg)
                }
                _ => out[i - 1].acc,
            }
        };

        out.push(ClassifiedSample {
            sample: *sample,
            rolling_average: avg,
            state,
            interval,
            acc,
            scene: 0,
        });
    }

    Classification::Curve(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::{sample_motion, MotionTrace};

    fn params() -> MotionParams {
        MotionParams {
            acc_max: 10.0,
            acc_min: 1.0,
            min_video_duration: 1.0,
            min_acc_scene_duration: 0.5,
        }
    }

    fn stats() -> GlobalMotionStats {
        GlobalMotionStats {
            p_high: 6.0,
            p_low: 2.0,
            min: 0.0,
            max: 10.0,
            sample_count: 30,
        }
    }

    /// 25 fps with every fifth frame sampled: one sample each 0.2 s.
    fn trace(magnitudes: Vec<f64>, duration_secs: f64) -> Vec<MotionSample> {
        sample_motion(
            &MotionTrace {
                fps: 25.0,
                duration_secs,
                magnitudes,
            },
            5,
        )
    }

    fn rising_then_falling() -> Vec<f64> {
        let mut m = vec![0.0; 10];
        m.extend(vec![10.0; 10]);
        m.extend(vec![0.0; 10]);
        m
    }

    fn curve(c: Classification) -> Vec<ClassifiedSample> {
        match c {
            Classification::Curve(samples) => samples,
            Classification::LowConfidence => panic!("expected a curve"),
        }
    }

    #[test]
    fn test_window_len() {
        let samples = trace(vec![0.0; 4], 1.0);
        assert_eq!(window_len(&samples, 1.0), Some(5));
        assert_eq!(window_len(&samples, 0.1), Some(1));
        assert_eq!(window_len(&samples[..1], 1.0), None);
    }

    #[test]
    fn test_rising_then_falling_has_two_boundaries() {
        let samples = trace(rising_then_falling(), 7.0);
        let classified = curve(classify(&samples, &stats(), &params()));
        assert_eq!(classified.len(), 30);

        let boundaries: Vec<usize> = classified
            .windows(2)
            .enumerate()
            .filter(|(_, w)| w[0].interval != w[1].interval)
            .map(|(i, _)| i + 1)
            .collect();
        assert_eq!(boundaries, vec![13, 24]);

        assert_eq!(classified[0].state, MotionState::Low);
        assert_eq!(classified[13].state, MotionState::High);
        assert_eq!(classified[29].state, MotionState::Low);
        assert_eq!(classified[29].interval, 2);

        // Seeded from the all-zero window, then a busy interval.
        assert!(classified[..13].iter().all(|c| c.acc == 10.0));
        assert!((classified[13].acc - 2.8).abs() < 1e-9);
        assert!(classified[13..24].iter().all(|c| c.acc == classified[13].acc));
        assert_eq!(classified[24].acc, 10.0);
    }

    #[test]
    fn test_damped_average_rises_once() {
        // 0.2 s spacing with a 0.4 s window: two samples per average.
        let params = MotionParams {
            min_video_duration: 0.4,
            ..params()
        };
        let stats = GlobalMotionStats {
            p_high: 0.85,
            p_low: 0.15,
            min: 0.1,
            max: 0.95,
            sample_count: 5,
        };
        let samples: Vec<MotionSample> = [0.1, 0.1, 0.9, 0.95, 0.2]
            .iter()
            .enumerate()
            .map(|(i, &magnitude)| MotionSample {
                frame_index: i as u64 * 5,
                time: i as f64 * 0.2,
                remaining: 5.0 - i as f64 * 0.2,
                magnitude,
            })
            .collect();
        assert_eq!(window_len(&samples, params.min_video_duration), Some(2));

        let classified = curve(classify(&samples, &stats, &params));
        let states: Vec<MotionState> = classified.iter().map(|c| c.state).collect();
        let intervals: Vec<usize> = classified.iter().map(|c| c.interval).collect();
        assert_eq!(
            states,
            vec![
                MotionState::Low,
                MotionState::Low,
                MotionState::Low,
                MotionState::High,
                MotionState::High
            ]
        );
        assert_eq!(intervals, vec![0, 0, 0, 1, 1]);

        // The zeroed ring damps the start; the fall only reaches 0.575.
        let averages = [0.05, 0.1, 0.5, 0.925, 0.575];
        for (c, expected) in classified.iter().zip(averages) {
            assert!((c.rolling_average - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_no_switch_near_segment_end() {
        // High motion only starts 0.8 s before the end.
        let mut magnitudes = vec![0.0; 26];
        magnitudes.extend(vec![10.0; 4]);
        let samples = trace(magnitudes, 6.2);
        let classified = curve(classify(&samples, &stats(), &params()));
        assert!(classified.iter().all(|c| c.interval == 0));
        assert!(classified.iter().all(|c| c.state == MotionState::Low));
    }

    #[test]
    fn test_transitions_respect_remaining_time() {
        let magnitudes: Vec<f64> = (0..60).map(|i| if (i / 7) % 2 == 0 { 0.0 } else { 10.0 }).collect();
        let samples = trace(magnitudes, 12.2);
        let classified = curve(classify(&samples, &stats(), &params()));
        for pair in classified.windows(2) {
            if pair[0].interval != pair[1].interval {
                assert!(pair[1].sample.remaining >= params().min_video_duration);
            }
        }
    }

    #[test]
    fn test_short_segment_is_low_confidence() {
        let samples = trace(vec![5.0; 5], 1.2);
        assert_eq!(classify(&samples, &stats(), &params()), Classification::LowConfidence);
        assert_eq!(classify(&samples[..1], &stats(), &params()), Classification::LowConfidence);
        assert_eq!(classify(&[], &stats(), &params()), Classification::LowConfidence);
    }
}
