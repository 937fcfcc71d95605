//! Trace-correlation post-stage.
//!
//! Grows small images by pixels whose pulse shape follows the mean pulse of
//! the image. Runs after any cleaning method.
#![allow(clippy::cast_precision_loss)]

use iactclean_core::{
    CameraGeometry, CleaningResult, EventSignal, TraceCorrelationParams, REJECTED_CLUSTER,
};
use log::debug;

use crate::state::CleaningState;

/// Adds border pixels correlated with the mean image pulse.
///
/// Returns the number of pixels added.
pub(crate) fn apply_trace_correlation(
    params: &TraceCorrelationParams,
    geometry: &CameraGeometry,
    event: &EventSignal,
    state: &mut CleaningState,
    result: &mut CleaningResult,
) -> usize {
    let Some(traces) = &event.traces else {
        debug!("trace correlation: event carries no traces, skipped");
        return 0;
    };
    let n_image = result.n_image();
    if n_image == 0 || n_image >= params.max_image_pixels {
        debug!("trace correlation: image of {n_image} pixels out of range, skipped");
        return 0;
    }

    let n_samples = traces.n_samples();
    let mut mean = vec![0.0; n_samples];
    for i in result.image_pixels() {
        for (m, &x) in mean.iter_mut().zip(traces.trace(i)) {
            *m += x;
        }
    }
    mean.iter_mut().for_each(|m| *m /= n_image as f64);
    let sum_m: f64 = mean.iter().sum();
    let sum_mm: f64 = mean.iter().map(|m| m * m).sum();
    if sum_mm <= 0.0 {
        return 0;
    }

    let n = geometry.len();
    let snapshot = &mut state.snapshot;
    for i in 0..n {
        snapshot[i] = result.is_image(i);
    }

    let mut added = 0;
    for i in 0..n {
        if snapshot[i]
            || !state.valid[i]
            || event.pedvar[i] <= 0.0
            || result.cluster_id[i] == REJECTED_CLUSTER
        {
            continue;
        }
        let Some(&anchor) = geometry.neighbors(i).iter().find(|&&j| snapshot[j]) else {
            continue;
        };
        let trace = traces.trace(i);
        let Some(corr) = pearson(trace, &mean) else {
            continue;
        };
        let amplitude = trace.iter().zip(&mean).map(|(x, m)| x * m).sum::<f64>() / sum_mm;
        let snr = amplitude * sum_m / event.pedvar[i];
        if corr > params.min_correlation && snr > params.min_signal_to_noise {
            result.border[i] = true;
            result.cluster_id[i] = result.cluster_id[anchor];
            added += 1;
        }
    }
    added
}

/// Pearson correlation; `None` if either series is constant.
fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len().min(b.len());
    if n < 2 {
        return None;
    }
    let mean_a = a[..n].iter().sum::<f64>() / n as f64;
    let mean_b = b[..n].iter().sum::<f64>() / n as f64;
    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (x, y) in a[..n].iter().zip(&b[..n]) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    if var_a <= 0.0 || var_b <= 0.0 {
        return None;
    }
    Some(cov / (var_a * var_b).sqrt())
}
