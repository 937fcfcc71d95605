//! Two-level cleaning with a neighbor arrival-time coincidence.

use iactclean_core::{CameraGeometry, CleaningResult, EventSignal, TimeDifferenceParams};
use log::debug;

use crate::state::CleaningState;
use crate::tailcut::{mark_bright, pixel_threshold, recover_dead_pixel_cores};

#[inline]
fn coincident(a: Option<f64>, b: Option<f64>, max_diff: f64) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => (a - b).abs() < max_diff,
        _ => false,
    }
}

/// Time-difference cleaning.
///
/// A core candidate needs a valid neighbor above the border threshold
/// within `max_time_diff`; a border candidate needs such a core neighbor.
pub(crate) fn clean_time_difference(
    params: &TimeDifferenceParams,
    geometry: &CameraGeometry,
    event: &EventSignal,
    state: &mut CleaningState,
    result: &mut CleaningResult,
) {
    let levels = &params.levels;
    let n = geometry.len();
    let above_border = |j: usize| {
        state.valid[j]
            && event.charge[j] > pixel_threshold(levels, levels.border_threshold, event, j)
    };

    for i in 0..n {
        if !state.valid[i]
            || event.time[i].is_none()
            || event.charge[i] <= pixel_threshold(levels, levels.core_threshold, event, i)
        {
            continue;
        }
        result.core[i] = geometry.neighbors(i).iter().any(|&j| {
            above_border(j) && coincident(event.time[i], event.time[j], params.max_time_diff)
        });
    }

    for j in 0..n {
        if result.core[j] || !above_border(j) {
            continue;
        }
        result.border[j] = geometry.neighbors(j).iter().any(|&c| {
            result.core[c] && coincident(event.time[j], event.time[c], params.max_time_diff)
        });
    }

    mark_bright(levels, event, &state.valid, result);

    let demoted = recover_dead_pixel_cores(geometry, event, state, result);
    if demoted > 0 {
        debug!("time-difference: demoted {demoted} core pixels surrounded by dead pixels");
    }
}
