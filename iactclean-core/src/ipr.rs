//! Image pixel rate (IPR) curves: noise rate above a charge threshold.

use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Empirical noise-rate-vs-charge-threshold curve of one telescope type.
///
/// Rates are in Hz and must not increase with the charge threshold.
/// Between sample points the rate is interpolated log-linearly; above the
/// last point the last slope is extrapolated.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IprCurve {
    charge: Vec<f64>,
    rate_hz: Vec<f64>,
}

impl IprCurve {
    /// Creates a validated curve.
    ///
    /// # Errors
    /// Returns [`Error::Calibration`] if the curve is malformed.
    pub fn new(charge: Vec<f64>, rate_hz: Vec<f64>) -> Result<Self> {
        let curve = Self { charge, rate_hz };
        curve.validate()?;
        Ok(curve)
    }

    /// Samples `rate_at_zero * exp(-q / charge_scale)` on `n_points` evenly
    /// spaced thresholds in `[0, max_charge]`.
    ///
    /// # Errors
    /// Returns [`Error::Calibration`] for non-positive parameters.
    pub fn exponential(
        rate_at_zero: f64,
        charge_scale: f64,
        max_charge: f64,
        n_points: usize,
    ) -> Result<Self> {
        if rate_at_zero <= 0.0 || charge_scale <= 0.0 || max_charge <= 0.0 || n_points < 2 {
            return Err(Error::Calibration(
                "exponential IPR curve needs positive parameters and two points".into(),
            ));
        }
        #[allow(clippy::cast_precision_loss)]
        let step = max_charge / (n_points - 1) as f64;
        #[allow(clippy::cast_precision_loss)]
        let charge: Vec<f64> = (0..n_points).map(|k| k as f64 * step).collect();
        let rate_hz = charge
            .iter()
            .map(|q| rate_at_zero * (-q / charge_scale).exp())
            .collect();
        Self::new(charge, rate_hz)
    }

    /// Checks the curve invariants.
    ///
    /// # Errors
    /// Returns [`Error::Calibration`] if there are fewer than two points,
    /// lengths differ, charges are not strictly increasing, or rates are
    /// negative, non-finite or increasing.
    pub fn validate(&self) -> Result<()> {
        if self.charge.len() != self.rate_hz.len() {
            return Err(Error::Calibration(format!(
                "IPR curve has {} charges but {} rates",
                self.charge.len(),
                self.rate_hz.len()
            )));
        }
        if self.charge.len() < 2 {
            return Err(Error::Calibration("IPR curve needs at least two points".into()));
        }
        if self.charge.iter().any(|q| !q.is_finite())
            || self.charge.windows(2).any(|w| w[1] <= w[0])
        {
            return Err(Error::Calibration(
                "IPR charges must be finite and strictly increasing".into(),
            ));
        }
        if self.rate_hz.iter().any(|r| !r.is_finite() || *r < 0.0) {
            return Err(Error::Calibration("IPR rates must be finite and non-negative".into()));
        }
        if self.rate_hz.windows(2).any(|w| w[1] > w[0]) {
            return Err(Error::Calibration("IPR rates must not increase with charge".into()));
        }
        Ok(())
    }

    /// Charge thresholds.
    #[must_use]
    pub fn charges(&self) -> &[f64] {
        &self.charge
    }

    /// Rates in Hz.
    #[must_use]
    pub fn rates_hz(&self) -> &[f64] {
        &self.rate_hz
    }

    /// First and last tabulated charge.
    #[must_use]
    pub fn charge_range(&self) -> (f64, f64) {
        (self.charge[0], self.charge[self.charge.len() - 1])
    }

    /// Noise rate (Hz) of pixels above `charge`.
    ///
    /// May be zero beyond the last positive sample.
    #[must_use]
    pub fn rate_at(&self, charge: f64) -> f64 {
        let n = self.charge.len();
        if charge <= self.charge[0] {
            return self.rate_hz[0];
        }
        // index of the segment [k, k + 1] containing the charge
        let k = match self.charge.iter().position(|&q| q >= charge) {
            Some(upper) => upper - 1,
            None => n - 2,
        };
        let (q0, q1) = (self.charge[k], self.charge[k + 1]);
        let (r0, r1) = (self.rate_hz[k], self.rate_hz[k + 1]);
        let f = (charge - q0) / (q1 - q0);
        if r0 > 0.0 && r1 > 0.0 {
            (r0.ln() + f * (r1.ln() - r0.ln())).exp()
        } else {
            (r0 + f * (r1 - r0)).max(0.0)
        }
    }
}
