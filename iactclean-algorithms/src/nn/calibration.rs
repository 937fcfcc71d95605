//! Per telescope type NN calibration and its cache.
#![allow(clippy::cast_precision_loss)]

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use iactclean_core::{
    CameraGeometry, Error, IprCurve, NnClass, NnClassSet, NnParams, Result, TelescopeType,
};
use log::{debug, info};

use super::contour::{lowest_charge_reaching, BoundaryContour, RateContour, HZ_TO_PER_NS};

/// Provider of single-pixel noise rate curves.
pub trait IprSource: Send + Sync {
    /// IPR curve of a telescope type, if one is known.
    fn curve(&self, telescope_type: TelescopeType) -> Option<IprCurve>;
}

impl IprSource for HashMap<TelescopeType, IprCurve> {
    fn curve(&self, telescope_type: TelescopeType) -> Option<IprCurve> {
        self.get(&telescope_type).cloned()
    }
}

/// Contours, combinatorial factors and pre-threshold of one telescope type.
#[derive(Debug, Clone)]
pub struct NnCalibration {
    telescope_type: TelescopeType,
    curve: IprCurve,
    classes: NnClassSet,
    contours: [RateContour; 4],
    boundary: BoundaryContour,
    /// Groups per live pixel, by class.
    pixel_factors: [f64; 4],
    camera_pixels: usize,
    min_window_ns: f64,
    max_window_ns: f64,
    pre_threshold: f64,
}

impl NnCalibration {
    /// Builds the calibration of the geometry's telescope type.
    ///
    /// # Errors
    /// Returns [`Error::Calibration`] if the curve is malformed.
    pub fn build(geometry: &CameraGeometry, curve: IprCurve, params: &NnParams) -> Result<Self> {
        curve.validate()?;
        let telescope_type = geometry.telescope_type();
        let k = geometry.mean_neighbor_count();
        let k2 = geometry.mean_second_ring_size();
        let pixel_factors = [
            k / 2.0,
            k / 2.0 * k2,
            k * (k - 1.0) / 2.0,
            k * (k - 1.0) * (k - 2.0) / 2.0,
        ];
        let camera_pixels = (0..geometry.len())
            .filter(|&i| geometry.is_analysis_valid(i))
            .count();

        let mut calibration = Self {
            telescope_type,
            curve,
            classes: params.classes_for(telescope_type),
            contours: NnClass::ALL.map(|class| RateContour::new(class, params)),
            boundary: BoundaryContour::new(params),
            pixel_factors,
            camera_pixels,
            min_window_ns: params.min_time_window_ns,
            max_window_ns: params.max_time_window_ns,
            pre_threshold: f64::INFINITY,
        };
        calibration.pre_threshold = calibration.compute_pre_threshold();

        let (_, last) = calibration.curve.charge_range();
        if calibration.curve.rate_at(last) <= 0.0 {
            debug!(
                "telescope type {telescope_type}: IPR rate vanishes at {last}, \
                 windows capped at {} ns",
                calibration.max_window_ns
            );
        }
        Ok(calibration)
    }

    fn compute_pre_threshold(&self) -> f64 {
        let range = self.curve.charge_range();
        self.classes
            .iter()
            .filter_map(|class| {
                lowest_charge_reaching(range, self.min_window_ns, |q| {
                    self.group_window(class, q, self.camera_pixels)
                })
            })
            .fold(f64::INFINITY, f64::min)
    }

    /// Telescope type the calibration belongs to.
    #[must_use]
    pub fn telescope_type(&self) -> TelescopeType {
        self.telescope_type
    }

    /// Enabled NN classes.
    #[must_use]
    pub fn classes(&self) -> NnClassSet {
        self.classes
    }

    /// Underlying IPR curve.
    #[must_use]
    pub fn curve(&self) -> &IprCurve {
        &self.curve
    }

    /// Minimum charge of a group candidate.
    ///
    /// Infinite when no enabled class ever reaches the minimum window.
    #[must_use]
    pub fn pre_threshold(&self) -> f64 {
        self.pre_threshold
    }

    /// Upper limit of every window (ns).
    #[must_use]
    pub fn max_window_ns(&self) -> f64 {
        self.max_window_ns
    }

    /// Number of possible groups of `class` among `live_pixels` pixels.
    #[must_use]
    pub fn combinatorial_factor(&self, class: NnClass, live_pixels: usize) -> f64 {
        self.pixel_factors[class as usize] * live_pixels as f64
    }

    /// Noise rate (1/ns) above `charge`.
    #[must_use]
    pub fn rate_per_ns(&self, charge: f64) -> f64 {
        self.curve.rate_at(charge) * HZ_TO_PER_NS
    }

    /// Coincidence window (ns) of a group whose faintest pixel has `charge`.
    #[must_use]
    pub fn group_window(&self, class: NnClass, charge: f64, live_pixels: usize) -> f64 {
        self.contours[class as usize].window(
            self.rate_per_ns(charge),
            self.combinatorial_factor(class, live_pixels),
        )
    }

    /// Coincidence window (ns) of a boundary pixel with `charge`.
    #[must_use]
    pub fn boundary_window(&self, charge: f64, search_pixels: usize) -> f64 {
        self.boundary
            .window(self.rate_per_ns(charge), search_pixels as f64)
    }

    /// Lowest charge at which a boundary pixel `dt` ns away from its
    /// accepted neighbor is promoted; `None` if no charge suffices.
    #[must_use]
    pub fn min_boundary_charge(&self, dt: f64, search_pixels: usize) -> Option<f64> {
        lowest_charge_reaching(self.curve.charge_range(), dt, |q| {
            self.boundary_window(q, search_pixels)
        })
    }
}

/// Lazily populated cache of [`NnCalibration`]s keyed by telescope type.
///
/// Each calibration is built at most once; concurrent callers for the same
/// type wait for the first build and share its result.
pub struct IprCalibrationStore {
    source: Box<dyn IprSource>,
    params: NnParams,
    cache: Mutex<HashMap<TelescopeType, Arc<NnCalibration>>>,
    builds: AtomicUsize,
}

impl fmt::Debug for IprCalibrationStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IprCalibrationStore")
            .field("params", &self.params)
            .field("builds", &self.build_count())
            .finish_non_exhaustive()
    }
}

impl IprCalibrationStore {
    /// Creates an empty store.
    pub fn new(source: impl IprSource + 'static, params: NnParams) -> Self {
        Self {
            source: Box::new(source),
            params,
            cache: Mutex::new(HashMap::new()),
            builds: AtomicUsize::new(0),
        }
    }

    /// Parameters the calibrations are built with.
    #[must_use]
    pub fn params(&self) -> &NnParams {
        &self.params
    }

    /// Number of calibrations built so far.
    #[must_use]
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }

    /// Calibration of the geometry's telescope type, built on first use.
    ///
    /// # Errors
    /// Returns [`Error::MissingCalibration`] if the source has no curve for
    /// the type and [`Error::Calibration`] if the curve is malformed or the
    /// cache lock is poisoned.
    pub fn get_or_build(&self, geometry: &CameraGeometry) -> Result<Arc<NnCalibration>> {
        let telescope_type = geometry.telescope_type();
        let mut cache = self
            .cache
            .lock()
            .map_err(|_| Error::Calibration("calibration cache lock poisoned".into()))?;
        if let Some(calibration) = cache.get(&telescope_type) {
            return Ok(Arc::clone(calibration));
        }

        let curve = self
            .source
            .curve(telescope_type)
            .ok_or(Error::MissingCalibration(telescope_type))?;
        let calibration = Arc::new(NnCalibration::build(geometry, curve, &self.params)?);
        self.builds.fetch_add(1, Ordering::Relaxed);
        info!(
            "built NN calibration for telescope type {telescope_type}: pre-threshold {:.3}",
            calibration.pre_threshold()
        );
        cache.insert(telescope_type, Arc::clone(&calibration));
        Ok(calibration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn decade_curve() -> IprCurve {
        IprCurve::new(
            vec![0.0, 5.0, 10.0, 15.0, 20.0],
            vec![1e8, 1e6, 1e4, 1e2, 1.0],
        )
        .unwrap()
    }

    #[test]
    fn test_factors_on_hexagonal_camera() {
        let geometry = CameraGeometry::hexagonal(3, 4, 1.0);
        let calibration =
            NnCalibration::build(&geometry, decade_curve(), &NnParams::default()).unwrap();
        // 156 edges among 61 pixels
        assert_relative_eq!(
            calibration.combinatorial_factor(NnClass::TwoNn, geometry.len()),
            156.0,
            max_relative = 1e-12
        );
        assert_eq!(calibration.telescope_type(), 3);
    }

    #[test]
    fn test_pre_threshold_two_nn() {
        let geometry = CameraGeometry::hexagonal(3, 4, 1.0);
        let params = NnParams::default().with_classes(NnClassSet::only(&[NnClass::TwoNn]));
        let calibration = NnCalibration::build(&geometry, decade_curve(), &params).unwrap();
        let pre = calibration.pre_threshold();
        // window 1e-3 / (156 * 16 * R^2) reaches 0.5 ns just above q = 5
        assert!(pre > 5.0 && pre < 5.2, "pre-threshold {pre}");
        assert_relative_eq!(
            calibration.group_window(NnClass::TwoNn, pre, geometry.len()),
            0.5,
            max_relative = 1e-6
        );
    }

    #[test]
    fn test_pre_threshold_infinite_without_probability() {
        let geometry = CameraGeometry::hexagonal(3, 2, 1.0);
        let params = NnParams::default().with_fake_image_probability(0.0);
        let calibration = NnCalibration::build(&geometry, decade_curve(), &params).unwrap();
        assert!(calibration.pre_threshold().is_infinite());
        assert!(calibration.pre_threshold() > 0.0);
    }

    #[test]
    fn test_boundary_charge_grows_with_dt() {
        let geometry = CameraGeometry::hexagonal(3, 2, 1.0);
        let calibration =
            NnCalibration::build(&geometry, decade_curve(), &NnParams::default()).unwrap();
        let tight = calibration.min_boundary_charge(0.5, 20).unwrap();
        let loose = calibration.min_boundary_charge(4.0, 20).unwrap();
        assert!(loose > tight);
        assert!(calibration.min_boundary_charge(9.0, 20).is_none());
    }

    #[test]
    fn test_store_builds_once() {
        let geometry = CameraGeometry::hexagonal(3, 2, 1.0);
        let source: HashMap<TelescopeType, IprCurve> = [(3, decade_curve())].into();
        let store = IprCalibrationStore::new(source, NnParams::default());

        let first = store.get_or_build(&geometry).unwrap();
        let second = store.get_or_build(&geometry).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.build_count(), 1);

        let other = CameraGeometry::hexagonal(4, 2, 1.0);
        assert!(matches!(
            store.get_or_build(&other),
            Err(Error::MissingCalibration(4))
        ));
        assert_eq!(store.build_count(), 1);
    }
}
