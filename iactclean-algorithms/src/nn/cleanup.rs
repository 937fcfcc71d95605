//! Final image checks: time outliers, isolated pixels and small-image vetoes.
#![allow(clippy::cast_precision_loss)]

use iactclean_core::{CameraGeometry, CleaningResult, EventSignal, NnClass};

use crate::state::CleaningState;

/// Images with fewer pixels are discarded.
pub(crate) const MIN_IMAGE_PIXELS: usize = 4;

/// Floor of the charge in the outlier bound.
const MIN_OUTLIER_CHARGE: f64 = 1e-3;

/// Removes image pixels whose time is far from the mean time of their
/// image neighbors. The bound widens for faint pixels.
///
/// Returns the number of removed pixels.
pub(crate) fn remove_time_outliers(
    time_outlier_ns: f64,
    geometry: &CameraGeometry,
    event: &EventSignal,
    state: &mut CleaningState,
    result: &mut CleaningResult,
) -> usize {
    let CleaningState {
        work_time,
        scratch: outliers,
        ..
    } = state;
    outliers.clear();

    for i in result.image_pixels() {
        let Some(t) = work_time[i] else {
            continue;
        };
        let (sum, count) = geometry
            .neighbors(i)
            .iter()
            .filter(|&&j| result.is_image(j))
            .filter_map(|&j| work_time[j])
            .fold((0.0, 0usize), |(sum, count), tj| (sum + tj, count + 1));
        if count == 0 {
            continue;
        }
        let mean = sum / count as f64;
        let bound =
            time_outlier_ns * (1.0 + event.pedvar[i] / event.charge[i].max(MIN_OUTLIER_CHARGE));
        if (t - mean).abs() > bound {
            outliers.push(i);
        }
    }

    for &i in outliers.iter() {
        result.clear_pixel(i);
    }
    outliers.len()
}

/// Removes image pixels without an image neighbor.
pub(crate) fn remove_isolated(
    geometry: &CameraGeometry,
    state: &mut CleaningState,
    result: &mut CleaningResult,
) -> usize {
    let isolated = &mut state.scratch;
    isolated.clear();
    isolated.extend(
        result
            .image_pixels()
            .filter(|&i| !geometry.neighbors(i).iter().any(|&j| result.is_image(j))),
    );
    for &i in isolated.iter() {
        result.clear_pixel(i);
    }
    isolated.len()
}

/// Discards images that are too small to be trusted.
///
/// Returns true if the image was cleared.
pub(crate) fn apply_vetoes(result: &mut CleaningResult) -> bool {
    let n_image = result.n_image();
    let loose_quadruple = n_image == MIN_IMAGE_PIXELS
        && result.n_border() == 0
        && result
            .image_pixels()
            .all(|i| result.nn_class[i] == Some(NnClass::FourNn));
    if n_image < MIN_IMAGE_PIXELS || loose_quadruple {
        result.clear_image();
        return n_image > 0;
    }
    false
}
