//! Rate contours: coincidence windows as a function of pixel charge.
//!
//! A group of `n` noise pixels, each firing at rate `R`, falls inside a
//! window `τ` about `C · T · R^n · τ^(n-1)` times per readout, where `C`
//! counts the possible groups and `T` is the integration window. Solving
//! for `τ` at a target probability gives the group contour; boundary pixels
//! use the single-pixel version `P_b / (2 · C_b · R)`.

use iactclean_core::{NnClass, NnParams};
use log::debug;

/// Converts an IPR rate from Hz to 1/ns.
pub const HZ_TO_PER_NS: f64 = 1e-9;

const BISECTION_STEPS: usize = 64;

/// Rate and group count admit a finite window.
fn usable(rate: f64, factor: f64) -> bool {
    rate > 0.0 && rate.is_finite() && factor > 0.0
}

/// Coincidence window of one NN class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateContour {
    class: NnClass,
    probability: f64,
    integration_window_ns: f64,
    max_window_ns: f64,
}

impl RateContour {
    /// Contour of `class` for the given parameters.
    #[must_use]
    pub fn new(class: NnClass, params: &NnParams) -> Self {
        Self {
            class,
            probability: params.fake_image_probability,
            integration_window_ns: params.integration_window_ns,
            max_window_ns: params.max_time_window_ns,
        }
    }

    /// Class of the contour.
    #[must_use]
    pub fn class(&self) -> NnClass {
        self.class
    }

    /// Window (ns) for a per-pixel noise rate (1/ns) and group count.
    ///
    /// Degenerate inputs (no noise, no groups) yield the maximum window; a
    /// zero probability yields a zero window.
    #[must_use]
    pub fn window(&self, rate: f64, factor: f64) -> f64 {
        if self.probability <= 0.0 {
            return 0.0;
        }
        if !usable(rate, factor) {
            debug!(
                "{} window degenerate (rate {rate}, groups {factor}), using {} ns",
                self.class.name(),
                self.max_window_ns
            );
            return self.max_window_ns;
        }
        let n = self.class.multiplicity();
        #[allow(clippy::cast_possible_wrap)]
        let noise = factor * self.integration_window_ns * rate.powi(n as i32);
        let tau = (self.probability / noise).powf(1.0 / f64::from(n - 1));
        if tau.is_finite() {
            tau.min(self.max_window_ns)
        } else {
            self.max_window_ns
        }
    }
}

/// Coincidence window of a boundary pixel against its accepted neighbor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryContour {
    probability: f64,
    max_window_ns: f64,
}

impl BoundaryContour {
    /// Boundary contour for the given parameters.
    #[must_use]
    pub fn new(params: &NnParams) -> Self {
        Self {
            probability: params.boundary_probability,
            max_window_ns: params.max_time_window_ns,
        }
    }

    /// Window (ns) for a noise rate (1/ns) and number of searched pixels.
    #[must_use]
    pub fn window(&self, rate: f64, factor: f64) -> f64 {
        if self.probability <= 0.0 {
            return 0.0;
        }
        if !usable(rate, factor) {
            debug!(
                "boundary window degenerate (rate {rate}, pixels {factor}), using {} ns",
                self.max_window_ns
            );
            return self.max_window_ns;
        }
        let tau = self.probability / (2.0 * factor * rate);
        if tau.is_finite() {
            tau.min(self.max_window_ns)
        } else {
            self.max_window_ns
        }
    }
}

/// Lowest charge at which a non-decreasing `window(q)` reaches `target`.
///
/// Searches from the first tabulated charge up to one curve span past the
/// last. Returns `NEG_INFINITY` if the window is already wide enough at the
/// start and `None` if it never is.
pub(crate) fn lowest_charge_reaching(
    range: (f64, f64),
    target: f64,
    window: impl Fn(f64) -> f64,
) -> Option<f64> {
    let (first, last) = range;
    let mut lo = first;
    let mut hi = last + (last - first);
    if window(lo) >= target {
        return Some(f64::NEG_INFINITY);
    }
    if window(hi) < target {
        return None;
    }
    for _ in 0..BISECTION_STEPS {
        let mid = 0.5 * (lo + hi);
        if window(mid) >= target {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    Some(hi)
}
