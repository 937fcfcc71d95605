//! Statistically optimized next-neighbor (NN) cleaning.
//!
//! Thresholds are not fixed charges: a group of neighboring pixels is
//! accepted when its arrival times coincide within a window derived from
//! the single-pixel noise rate (IPR curve), so that pure noise forms an
//! accepted group with a chosen probability per event.
//!
//! Per event: candidates above the pre-threshold, group search over the
//! enabled classes, boundary rings around the accepted core, then time
//! outlier removal and the small-image vetoes.

mod boundary;
mod calibration;
mod cleanup;
mod contour;
mod search;

pub use calibration::{IprCalibrationStore, IprSource, NnCalibration};
pub use contour::{BoundaryContour, RateContour, HZ_TO_PER_NS};

use iactclean_core::{CameraGeometry, CleaningResult, EventSignal, NnParams};
use log::debug;

use crate::state::CleaningState;

/// Runs NN cleaning with a ready calibration.
pub(crate) fn clean_next_neighbor(
    calibration: &NnCalibration,
    params: &NnParams,
    geometry: &CameraGeometry,
    event: &EventSignal,
    state: &mut CleaningState,
    result: &mut CleaningResult,
) {
    let n_core = search::accept_groups(calibration, geometry, event, state, result);
    if n_core == 0 {
        return;
    }
    let n_boundary = boundary::promote_boundary(
        calibration,
        params.boundary_rings,
        geometry,
        event,
        state,
        result,
    );
    let outliers =
        cleanup::remove_time_outliers(params.time_outlier_ns, geometry, event, state, result);
    let isolated = cleanup::remove_isolated(geometry, state, result);
    let vetoed = cleanup::apply_vetoes(result);
    debug!(
        "nn: {n_core} core, {n_boundary} boundary, {outliers} time outliers, \
         {isolated} isolated, vetoed={vetoed}"
    );
}
