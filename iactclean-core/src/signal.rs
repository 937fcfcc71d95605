//! Per-event calibrated signal in Structure of Arrays layout.

use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Externally estimated time gradient of the shower image.
///
/// Used by time-cluster cleaning to predict the arrival-time offset of a
/// secondary cluster along the image major axis.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TimeGradientHint {
    /// Time gradient along the major axis (ns per camera distance unit).
    pub gradient: f64,
    /// Orientation of the major axis (radians, camera frame).
    pub axis_angle: f64,
}

/// Sampled pulse traces, one fixed-length trace per pixel.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "RawPulseTraces"))]
pub struct PulseTraces {
    n_samples: usize,
    samples: Vec<f64>,
}

/// Unchecked wire form of [`PulseTraces`].
#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct RawPulseTraces {
    n_samples: usize,
    samples: Vec<f64>,
}

#[cfg(feature = "serde")]
impl TryFrom<RawPulseTraces> for PulseTraces {
    type Error = Error;

    fn try_from(raw: RawPulseTraces) -> Result<Self> {
        Self::new(raw.n_samples, raw.samples)
    }
}

impl PulseTraces {
    /// Wraps a flat sample buffer of `n_pixels * n_samples` values.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if `n_samples` is zero or the buffer length
    /// is not a multiple of it.
    pub fn new(n_samples: usize, samples: Vec<f64>) -> Result<Self> {
        if n_samples == 0 || samples.len() % n_samples != 0 {
            return Err(Error::Config(format!(
                "{} trace samples cannot be split into traces of {n_samples}",
                samples.len()
            )));
        }
        Ok(Self { n_samples, samples })
    }

    /// Builds traces from one vector per pixel (all the same length).
    ///
    /// # Errors
    /// Returns [`Error::Config`] for empty or ragged input.
    pub fn from_traces(traces: &[Vec<f64>]) -> Result<Self> {
        let n_samples = traces.first().map_or(0, Vec::len);
        if traces.iter().any(|t| t.len() != n_samples) {
            return Err(Error::Config("pulse traces differ in length".into()));
        }
        Self::new(n_samples, traces.concat())
    }

    /// Samples per trace.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Number of pixels covered.
    #[must_use]
    pub fn n_pixels(&self) -> usize {
        self.samples.len().checked_div(self.n_samples).unwrap_or(0)
    }

    /// Trace of pixel `i`.
    #[inline]
    #[must_use]
    pub fn trace(&self, i: usize) -> &[f64] {
        &self.samples[i * self.n_samples..(i + 1) * self.n_samples]
    }
}

/// Calibrated signal of one camera for one event.
///
/// All vectors share the geometry's pixel index space.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EventSignal {
    /// Integrated charge per pixel.
    pub charge: Vec<f64>,
    /// Pulse arrival time per pixel (ns); `None` when unknown.
    pub time: Vec<Option<f64>>,
    /// Dead (unusable) pixels for this event.
    pub dead: Vec<bool>,
    /// Pedestal variance (noise) per pixel, in charge units.
    pub pedvar: Vec<f64>,
    /// Arrival times re-searched in a window around the image time.
    pub ring_time: Option<Vec<Option<f64>>>,
    /// Sampled pulse traces.
    pub traces: Option<PulseTraces>,
    /// Time gradient estimate from an earlier reconstruction pass.
    pub time_gradient: Option<TimeGradientHint>,
}

impl EventSignal {
    /// Creates a quiet event: zero charge, unknown times, nothing dead and
    /// unit pedvar.
    #[must_use]
    pub fn new(n_pixels: usize) -> Self {
        let mut signal = Self::default();
        signal.reset(n_pixels);
        signal
    }

    /// Creates an event from charges alone.
    #[must_use]
    pub fn from_charges(charge: Vec<f64>) -> Self {
        let mut signal = Self::new(charge.len());
        signal.charge = charge;
        signal
    }

    /// Resets every buffer to the quiet state, reusing allocations.
    pub fn reset(&mut self, n_pixels: usize) {
        self.charge.clear();
        self.charge.resize(n_pixels, 0.0);
        self.time.clear();
        self.time.resize(n_pixels, None);
        self.dead.clear();
        self.dead.resize(n_pixels, false);
        self.pedvar.clear();
        self.pedvar.resize(n_pixels, 1.0);
        self.ring_time = None;
        self.traces = None;
        self.time_gradient = None;
    }

    /// Sets charge and time of one pixel.
    pub fn set_pixel(&mut self, i: usize, charge: f64, time: Option<f64>) {
        self.charge[i] = charge;
        self.time[i] = time;
    }

    /// Sets the same arrival time on every pixel.
    #[must_use]
    pub fn with_uniform_time(mut self, time: f64) -> Self {
        self.time.iter_mut().for_each(|t| *t = Some(time));
        self
    }

    /// Sets pedvar on every pixel.
    #[must_use]
    pub fn with_pedvar(mut self, pedvar: f64) -> Self {
        self.pedvar.iter_mut().for_each(|p| *p = pedvar);
        self
    }

    /// Marks pixels as dead.
    #[must_use]
    pub fn with_dead_pixels(mut self, pixels: &[usize]) -> Self {
        for &i in pixels {
            if let Some(flag) = self.dead.get_mut(i) {
                *flag = true;
            }
        }
        self
    }

    /// Number of pixels covered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.charge.len()
    }

    /// Returns true if the event covers no pixels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.charge.is_empty()
    }

    /// Whether the pixel is usable in this event.
    #[inline]
    #[must_use]
    pub fn is_alive(&self, i: usize) -> bool {
        !self.dead[i]
    }

    /// Re-searched ring time when available, raw arrival time otherwise.
    #[inline]
    #[must_use]
    pub fn ring_or_arrival_time(&self, i: usize) -> Option<f64> {
        self.ring_time
            .as_ref()
            .and_then(|ring| ring[i])
            .or(self.time[i])
    }

    /// Checks that every array matches the geometry's pixel count.
    ///
    /// # Errors
    /// Returns [`Error::InconsistentInput`] naming the first mismatching
    /// array.
    pub fn validate(&self, n_pixels: usize) -> Result<()> {
        let check = |what: &'static str, found: usize| {
            if found == n_pixels {
                Ok(())
            } else {
                Err(Error::InconsistentInput {
                    what,
                    expected: n_pixels,
                    found,
                })
            }
        };
        check("charge", self.charge.len())?;
        check("time", self.time.len())?;
        check("dead", self.dead.len())?;
        check("pedvar", self.pedvar.len())?;
        if let Some(ring) = &self.ring_time {
            check("ring_time", ring.len())?;
        }
        if let Some(traces) = &self.traces {
            if traces.n_samples == 0 || traces.samples.len() % traces.n_samples != 0 {
                return Err(Error::Config(format!(
                    "{} trace samples cannot be split into traces of {}",
                    traces.samples.len(),
                    traces.n_samples
                )));
            }
            check("traces", traces.n_pixels())?;
        }
        Ok(())
    }
}
