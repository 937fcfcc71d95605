//! Two-level (tailcut) cleaning.
//!
//! Core pixels pass the upper threshold, border pixels are neighbors of
//! core pixels passing the lower threshold. Thresholds are absolute or
//! multiples of the pixel pedvar. The dead-pixel recovery pass is shared with
//! time-difference cleaning.

use iactclean_core::{CameraGeometry, CleaningResult, EventSignal, TwoLevelParams};
use log::debug;

use crate::state::CleaningState;

/// Charge threshold of pixel `i` for `level`.
#[inline]
pub(crate) fn pixel_threshold(
    levels: &TwoLevelParams,
    level: f64,
    event: &EventSignal,
    i: usize,
) -> f64 {
    levels.scale.threshold(level, event.pedvar[i])
}

/// Marks valid pixels above the bright threshold, independent of the image.
pub(crate) fn mark_bright(
    levels: &TwoLevelParams,
    event: &EventSignal,
    valid: &[bool],
    result: &mut CleaningResult,
) {
    for i in 0..result.len() {
        result.bright_non_image[i] = valid[i]
            && event.charge[i] > pixel_threshold(levels, levels.bright_threshold, event, i);
    }
}

/// Re-validates core pixels whose neighbors are all dead.
///
/// Such a pixel stays core only if a live neighbor of one of its dead
/// neighbors is part of the image. Returns the number of demoted pixels.
pub(crate) fn recover_dead_pixel_cores(
    geometry: &CameraGeometry,
    event: &EventSignal,
    state: &mut CleaningState,
    result: &mut CleaningResult,
) -> usize {
    let n = geometry.len();
    for i in 0..n {
        state.snapshot[i] = result.is_image(i);
    }

    let mut demoted = 0;
    for i in 0..n {
        if !result.core[i] {
            continue;
        }
        let neighbors = geometry.neighbors(i);
        if neighbors.is_empty() || neighbors.iter().any(|&j| event.is_alive(j)) {
            continue;
        }
        let bridged = neighbors.iter().any(|&dead| {
            geometry
                .neighbors(dead)
                .iter()
                .any(|&k| k != i && event.is_alive(k) && state.snapshot[k])
        });
        if !bridged {
            result.core[i] = false;
            demoted += 1;
        }
    }
    demoted
}

/// Two-level cleaning.
pub(crate) fn clean_two_level(
    params: &TwoLevelParams,
    geometry: &CameraGeometry,
    event: &EventSignal,
    state: &mut CleaningState,
    result: &mut CleaningResult,
) {
    let n = geometry.len();

    for i in 0..n {
        result.core[i] = state.valid[i]
            && event.charge[i] > pixel_threshold(params, params.core_threshold, event, i);
    }

    for i in 0..n {
        if !result.core[i] {
            continue;
        }
        for &j in geometry.neighbors(i) {
            if state.valid[j]
                && !result.core[j]
                && event.charge[j] > pixel_threshold(params, params.border_threshold, event, j)
            {
                result.border[j] = true;
            }
        }
    }

    mark_bright(params, event, &state.valid, result);

    let demoted = recover_dead_pixel_cores(geometry, event, state, result);
    if demoted > 0 {
        debug!("two-level: demoted {demoted} core pixels surrounded by dead pixels");
    }
}
