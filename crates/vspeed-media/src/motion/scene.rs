//! Scene-cut correction of an acceleration curve.

use tracing::debug;

use super::hysteresis::ClassifiedSample;

/// Assign every sample to a scene and slow down scenes that would flash by.
///
/// `cuts` are scene end times relative to the segment start, in increasing
/// order. A scene whose duration divided by its mean acceleration falls below
/// `min_scene_duration` has its accelerations scaled down so that it lasts
/// exactly that long. Afterwards each run of samples sharing interval and
/// scene is flattened to its mean, which leaves every scene's mean unchanged.
pub fn correct_for_scenes(
    samples: &[ClassifiedSample],
    cuts: &[f64],
    min_scene_duration: f64,
) -> Vec<ClassifiedSample> {
    let mut corrected = samples.to_vec();
    let Some(first) = samples.first() else {
        return corrected;
    };

    let mut cuts = cuts.to_vec();
    if cuts.is_empty() {
        cuts.push(first.sample.time + first.sample.remaining);
    }
    if cuts[0] < first.sample.time {
        cuts[0] = first.sample.time;
    }

    let last_scene = cuts.len() - 1;
    let mut next = 0;
    for (scene, cut) in cuts.iter().enumerate() {
        while next < corrected.len() && (corrected[next].sample.time <= *cut || scene == last_scene) {
            corrected[next].scene = scene;
            next += 1;
        }
    }

    let mut scene_start = 0.0;
    for (scene, cut) in cuts.iter().enumerate() {
        let duration = cut - scene_start;
        scene_start = *cut;

        let members: Vec<usize> = (0..corrected.len())
            .filter(|&i| corrected[i].scene == scene)
            .collect();
        if members.is_empty() {
            continue;
        }
        let mean_acc =
            members.iter().map(|&i| corrected[i].acc).sum::<f64>() / members.len() as f64;
        let effective = duration / mean_acc;
        if effective.is_finite() && effective > 0.0 && effective < min_scene_duration {
            let scale = min_scene_duration / effective;
            debug!(scene, duration, effective, scale, "Slowing down short scene");
            for &i in &members {
                corrected[i].acc /= scale;
            }
        }
    }

    flatten_runs(&mut corrected);
    corrected
}

/// Replace every run of equal `(interval, scene)` by its mean acceleration.
fn flatten_runs(samples: &mut [ClassifiedSample]) {
    let mut start = 0;
    while start < samples.len() {
        let key = (samples[start].interval, samples[start].scene);
        let end = samples[start..]
            .iter()
            .position(|s| (s.interval, s.scene) != key)
            .map_or(samples.len(), |offset| start + offset);

        let run = &mut samples[start..end];
        let mean = run.iter().map(|s| s.acc).sum::<f64>() / run.len() as f64;
        for s in run.iter_mut() {
            s.acc = mean;
        }
        start = end;
    }
}
