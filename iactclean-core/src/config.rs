//! Cleaning configuration: method selector and per-method thresholds.
//!
//! A configuration is built once per run and never changes afterwards.
//! Every parameter struct has defaults, `with_*` builders and a `validate`
//! method; the engine validates the whole configuration on construction.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::geometry::TelescopeType;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

fn check_finite(name: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(Error::Config(format!("{name} must be finite, got {value}")))
    }
}

fn check_non_negative(name: &str, value: f64) -> Result<()> {
    check_finite(name, value)?;
    if value < 0.0 {
        return Err(Error::Config(format!("{name} must be >= 0, got {value}")));
    }
    Ok(())
}

fn check_positive(name: &str, value: f64) -> Result<()> {
    check_finite(name, value)?;
    if value <= 0.0 {
        return Err(Error::Config(format!("{name} must be > 0, got {value}")));
    }
    Ok(())
}

/// How thresholds are converted to charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ThresholdScale {
    /// Thresholds are absolute charges.
    Fixed,
    /// Thresholds are multiples of each pixel's pedvar.
    #[default]
    Pedvar,
}

impl ThresholdScale {
    /// Charge threshold of a pixel for the given level.
    #[inline]
    #[must_use]
    pub fn threshold(self, level: f64, pedvar: f64) -> f64 {
        match self {
            Self::Fixed => level,
            Self::Pedvar => level * pedvar,
        }
    }
}

/// Core/border/bright thresholds shared by the threshold-based methods.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TwoLevelParams {
    /// Core (image) threshold.
    pub core_threshold: f64,
    /// Border threshold.
    pub border_threshold: f64,
    /// Bright-non-image threshold.
    pub bright_threshold: f64,
    /// Absolute or pedvar-scaled thresholds.
    pub scale: ThresholdScale,
}

impl Default for TwoLevelParams {
    fn default() -> Self {
        Self {
            core_threshold: 5.0,
            border_threshold: 2.5,
            bright_threshold: 2.5,
            scale: ThresholdScale::Pedvar,
        }
    }
}

impl TwoLevelParams {
    /// Pedvar-scaled thresholds.
    #[must_use]
    pub fn pedvar(core: f64, border: f64) -> Self {
        Self {
            core_threshold: core,
            border_threshold: border,
            ..Self::default()
        }
    }

    /// Absolute thresholds.
    #[must_use]
    pub fn fixed(core: f64, border: f64) -> Self {
        Self {
            core_threshold: core,
            border_threshold: border,
            scale: ThresholdScale::Fixed,
            ..Self::default()
        }
    }

    /// Sets the bright-non-image threshold.
    #[must_use]
    pub fn with_bright_threshold(mut self, bright: f64) -> Self {
        self.bright_threshold = bright;
        self
    }

    /// Validates the thresholds.
    ///
    /// # Errors
    /// Returns [`Error::Config`] for negative or non-finite thresholds, or a
    /// border threshold above the core threshold.
    pub fn validate(&self) -> Result<()> {
        check_non_negative("core_threshold", self.core_threshold)?;
        check_non_negative("border_threshold", self.border_threshold)?;
        check_non_negative("bright_threshold", self.bright_threshold)?;
        if self.border_threshold > self.core_threshold {
            return Err(Error::Config(format!(
                "border_threshold {} exceeds core_threshold {}",
                self.border_threshold, self.core_threshold
            )));
        }
        Ok(())
    }
}

/// Two-level cleaning with an arrival-time coincidence requirement.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TimeDifferenceParams {
    /// Thresholds.
    pub levels: TwoLevelParams,
    /// Maximum arrival-time difference to a qualifying neighbor (ns).
    pub max_time_diff: f64,
}

impl Default for TimeDifferenceParams {
    fn default() -> Self {
        Self {
            levels: TwoLevelParams::default(),
            max_time_diff: 4.0,
        }
    }
}

impl TimeDifferenceParams {
    /// Creates parameters from thresholds and a time bound.
    #[must_use]
    pub fn new(levels: TwoLevelParams, max_time_diff: f64) -> Self {
        Self {
            levels,
            max_time_diff,
        }
    }

    /// Validates the parameters.
    ///
    /// # Errors
    /// Returns [`Error::Config`] for invalid thresholds or a non-positive
    /// time bound.
    pub fn validate(&self) -> Result<()> {
        self.levels.validate()?;
        check_positive("max_time_diff", self.max_time_diff)
    }
}

/// Time-cluster cleaning parameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TimeClusterParams {
    /// Thresholds.
    pub levels: TwoLevelParams,
    /// Maximum time difference between a pixel and its cluster seed or
    /// accepted neighbor (ns).
    pub pixel_time_cut: f64,
    /// Maximum time offset of a cluster from the main cluster (ns).
    pub cluster_time_cut: f64,
    /// Clusters with fewer pixels are removed.
    pub min_cluster_pixels: usize,
    /// Number of border-growing passes.
    pub border_loops: usize,
    /// Gradient (ns per distance unit) assumed when the event carries no
    /// time-gradient estimate.
    pub default_time_gradient: f64,
}

impl Default for TimeClusterParams {
    fn default() -> Self {
        Self {
            levels: TwoLevelParams::default(),
            pixel_time_cut: 4.0,
            cluster_time_cut: 10.0,
            min_cluster_pixels: 3,
            border_loops: 2,
            default_time_gradient: 10.0,
        }
    }
}

impl TimeClusterParams {
    /// Sets the minimum cluster size.
    #[must_use]
    pub fn with_min_cluster_pixels(mut self, n: usize) -> Self {
        self.min_cluster_pixels = n;
        self
    }

    /// Sets the pixel and cluster time cuts.
    #[must_use]
    pub fn with_time_cuts(mut self, pixel: f64, cluster: f64) -> Self {
        self.pixel_time_cut = pixel;
        self.cluster_time_cut = cluster;
        self
    }

    /// Sets the number of border passes.
    #[must_use]
    pub fn with_border_loops(mut self, loops: usize) -> Self {
        self.border_loops = loops;
        self
    }

    /// Validates the parameters.
    ///
    /// # Errors
    /// Returns [`Error::Config`] for invalid thresholds or cuts.
    pub fn validate(&self) -> Result<()> {
        self.levels.validate()?;
        check_positive("pixel_time_cut", self.pixel_time_cut)?;
        check_positive("cluster_time_cut", self.cluster_time_cut)?;
        check_non_negative("default_time_gradient", self.default_time_gradient)
    }
}

/// Size-based cluster cleaning parameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SizeClusterParams {
    /// Thresholds.
    pub levels: TwoLevelParams,
    /// Minimum summed charge of a kept cluster.
    pub min_cluster_charge: f64,
    /// Minimum pixel count of a kept cluster.
    pub min_cluster_pixels: usize,
    /// At most this many clusters are kept (largest charge first).
    pub max_clusters: usize,
}

impl Default for SizeClusterParams {
    fn default() -> Self {
        Self {
            levels: TwoLevelParams::default(),
            min_cluster_charge: 50.0,
            min_cluster_pixels: 2,
            max_clusters: 5,
        }
    }
}

impl SizeClusterParams {
    /// Sets the cluster acceptance limits.
    #[must_use]
    pub fn with_cluster_limits(
        mut self,
        min_charge: f64,
        min_pixels: usize,
        max_clusters: usize,
    ) -> Self {
        self.min_cluster_charge = min_charge;
        self.min_cluster_pixels = min_pixels;
        self.max_clusters = max_clusters;
        self
    }

    /// Validates the parameters.
    ///
    /// # Errors
    /// Returns [`Error::Config`] for invalid thresholds or `max_clusters == 0`.
    pub fn validate(&self) -> Result<()> {
        self.levels.validate()?;
        check_non_negative("min_cluster_charge", self.min_cluster_charge)?;
        if self.max_clusters == 0 {
            return Err(Error::Config("max_clusters must be at least 1".into()));
        }
        Ok(())
    }
}

/// Trace-correlation stage parameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TraceCorrelationParams {
    /// Minimum Pearson correlation with the mean image pulse.
    pub min_correlation: f64,
    /// Minimum template signal-to-noise.
    pub min_signal_to_noise: f64,
    /// The stage only runs on images smaller than this.
    pub max_image_pixels: usize,
}

impl Default for TraceCorrelationParams {
    fn default() -> Self {
        Self {
            min_correlation: 0.75,
            min_signal_to_noise: 2.0,
            max_image_pixels: 40,
        }
    }
}

impl TraceCorrelationParams {
    /// Validates the parameters.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the correlation bound is outside [-1, 1].
    pub fn validate(&self) -> Result<()> {
        check_finite("min_correlation", self.min_correlation)?;
        if !(-1.0..=1.0).contains(&self.min_correlation) {
            return Err(Error::Config(format!(
                "min_correlation must lie in [-1, 1], got {}",
                self.min_correlation
            )));
        }
        check_finite("min_signal_to_noise", self.min_signal_to_noise)
    }
}

/// Multiplicity class of a next-neighbor group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum NnClass {
    /// Two adjacent pixels.
    TwoNn,
    /// Adjacent pair plus one pixel in the pair's second ring.
    TwoPlusOne,
    /// Three connected pixels.
    ThreeNn,
    /// Four connected pixels.
    FourNn,
}

impl NnClass {
    /// All classes, strictest (highest charge requirement) first.
    pub const ALL: [NnClass; 4] = [Self::TwoNn, Self::TwoPlusOne, Self::ThreeNn, Self::FourNn];

    /// Number of pixels in a group.
    #[must_use]
    pub fn multiplicity(self) -> u32 {
        match self {
            Self::TwoNn => 2,
            Self::TwoPlusOne | Self::ThreeNn => 3,
            Self::FourNn => 4,
        }
    }

    /// Numeric class code stored with accepted pixels.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::TwoNn => 2,
            Self::TwoPlusOne => 21,
            Self::ThreeNn => 3,
            Self::FourNn => 4,
        }
    }

    /// Short label.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::TwoNn => "2nn",
            Self::TwoPlusOne => "2nn+1",
            Self::ThreeNn => "3nn",
            Self::FourNn => "4nn",
        }
    }
}

/// Set of enabled next-neighbor classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[allow(clippy::struct_excessive_bools)]
pub struct NnClassSet {
    /// 2NN enabled.
    pub two_nn: bool,
    /// 2NN+1 enabled.
    pub two_plus_one: bool,
    /// 3NN enabled.
    pub three_nn: bool,
    /// 4NN enabled.
    pub four_nn: bool,
}

impl Default for NnClassSet {
    fn default() -> Self {
        Self::all()
    }
}

impl NnClassSet {
    /// Every class.
    #[must_use]
    pub fn all() -> Self {
        Self {
            two_nn: true,
            two_plus_one: true,
            three_nn: true,
            four_nn: true,
        }
    }

    /// No class.
    #[must_use]
    pub fn none() -> Self {
        Self {
            two_nn: false,
            two_plus_one: false,
            three_nn: false,
            four_nn: false,
        }
    }

    /// Exactly the listed classes.
    #[must_use]
    pub fn only(classes: &[NnClass]) -> Self {
        let mut set = Self::none();
        for &class in classes {
            set.set(class, true);
        }
        set
    }

    /// Enables or disables one class.
    pub fn set(&mut self, class: NnClass, enabled: bool) {
        match class {
            NnClass::TwoNn => self.two_nn = enabled,
            NnClass::TwoPlusOne => self.two_plus_one = enabled,
            NnClass::ThreeNn => self.three_nn = enabled,
            NnClass::FourNn => self.four_nn = enabled,
        }
    }

    /// Whether the class is enabled.
    #[must_use]
    pub fn contains(self, class: NnClass) -> bool {
        match class {
            NnClass::TwoNn => self.two_nn,
            NnClass::TwoPlusOne => self.two_plus_one,
            NnClass::ThreeNn => self.three_nn,
            NnClass::FourNn => self.four_nn,
        }
    }

    /// Enabled classes, strictest first.
    pub fn iter(self) -> impl Iterator<Item = NnClass> {
        NnClass::ALL.into_iter().filter(move |&c| self.contains(c))
    }

    /// Returns true if nothing is enabled.
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.iter().next().is_none()
    }
}

/// Next-neighbor (NN) cleaning parameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct NnParams {
    /// Target probability per event that pure noise forms an accepted group.
    pub fake_image_probability: f64,
    /// Target probability that a noise pixel is accepted as boundary.
    pub boundary_probability: f64,
    /// Readout integration window (ns).
    pub integration_window_ns: f64,
    /// Upper limit of every coincidence window (ns).
    pub max_time_window_ns: f64,
    /// Window at which the pre-threshold is placed (ns).
    pub min_time_window_ns: f64,
    /// Rings searched around core pixels for boundary pixels.
    pub boundary_rings: usize,
    /// Base bound for local time outliers (ns).
    pub time_outlier_ns: f64,
    /// Classes enabled unless overridden.
    pub classes: NnClassSet,
    /// Per telescope type class selection.
    pub class_overrides: BTreeMap<TelescopeType, NnClassSet>,
}

impl Default for NnParams {
    fn default() -> Self {
        Self {
            fake_image_probability: 1e-3,
            boundary_probability: 1e-2,
            integration_window_ns: 16.0,
            max_time_window_ns: 8.0,
            min_time_window_ns: 0.5,
            boundary_rings: 2,
            time_outlier_ns: 4.0,
            classes: NnClassSet::all(),
            class_overrides: BTreeMap::new(),
        }
    }
}

impl NnParams {
    /// Sets the fake-image probability.
    #[must_use]
    pub fn with_fake_image_probability(mut self, probability: f64) -> Self {
        self.fake_image_probability = probability;
        self
    }

    /// Sets the boundary probability.
    #[must_use]
    pub fn with_boundary_probability(mut self, probability: f64) -> Self {
        self.boundary_probability = probability;
        self
    }

    /// Sets the default class selection.
    #[must_use]
    pub fn with_classes(mut self, classes: NnClassSet) -> Self {
        self.classes = classes;
        self
    }

    /// Overrides the class selection of one telescope type.
    #[must_use]
    pub fn with_class_override(
        mut self,
        telescope_type: TelescopeType,
        classes: NnClassSet,
    ) -> Self {
        self.class_overrides.insert(telescope_type, classes);
        self
    }

    /// Classes enabled for a telescope type.
    #[must_use]
    pub fn classes_for(&self, telescope_type: TelescopeType) -> NnClassSet {
        self.class_overrides
            .get(&telescope_type)
            .copied()
            .unwrap_or(self.classes)
    }

    /// Validates the parameters.
    ///
    /// # Errors
    /// Returns [`Error::Config`] for probabilities outside [0, 1] or
    /// non-positive windows.
    pub fn validate(&self) -> Result<()> {
        for (name, p) in [
            ("fake_image_probability", self.fake_image_probability),
            ("boundary_probability", self.boundary_probability),
        ] {
            check_finite(name, p)?;
            if !(0.0..=1.0).contains(&p) {
                return Err(Error::Config(format!("{name} must lie in [0, 1], got {p}")));
            }
        }
        check_positive("integration_window_ns", self.integration_window_ns)?;
        check_positive("max_time_window_ns", self.max_time_window_ns)?;
        check_positive("min_time_window_ns", self.min_time_window_ns)?;
        check_positive("time_outlier_ns", self.time_outlier_ns)?;
        if self.min_time_window_ns > self.max_time_window_ns {
            return Err(Error::Config(
                "min_time_window_ns exceeds max_time_window_ns".into(),
            ));
        }
        Ok(())
    }
}

/// Cleaning method and its parameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CleaningMethod {
    /// Two-level (tailcut) cleaning.
    TwoLevel(TwoLevelParams),
    /// Two-level cleaning with a neighbor time-difference requirement.
    TimeDifference(TimeDifferenceParams),
    /// Time-cluster cleaning.
    TimeCluster(TimeClusterParams),
    /// Size-based cluster cleaning.
    SizeCluster(SizeClusterParams),
    /// Statistically optimized next-neighbor cleaning.
    NextNeighbor(NnParams),
}

impl Default for CleaningMethod {
    fn default() -> Self {
        Self::TwoLevel(TwoLevelParams::default())
    }
}

impl CleaningMethod {
    /// Method name used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::TwoLevel(p) if p.scale == ThresholdScale::Fixed => "two-level-fixed",
            Self::TwoLevel(_) => "two-level-pedvar",
            Self::TimeDifference(_) => "time-difference",
            Self::TimeCluster(_) => "time-cluster",
            Self::SizeCluster(_) => "size-cluster",
            Self::NextNeighbor(_) => "next-neighbor",
        }
    }

    /// Validates the method parameters.
    ///
    /// # Errors
    /// Returns [`Error::Config`] describing the first invalid parameter.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::TwoLevel(p) => p.validate(),
            Self::TimeDifference(p) => p.validate(),
            Self::TimeCluster(p) => p.validate(),
            Self::SizeCluster(p) => p.validate(),
            Self::NextNeighbor(p) => p.validate(),
        }
    }
}

/// Complete, immutable cleaning configuration of a run.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CleaningConfig {
    /// Selected method.
    pub method: CleaningMethod,
    /// Optional trace-correlation stage run after the method.
    pub trace_correlation: Option<TraceCorrelationParams>,
}

impl CleaningConfig {
    /// Configuration running `method` alone.
    #[must_use]
    pub fn new(method: CleaningMethod) -> Self {
        Self {
            method,
            trace_correlation: None,
        }
    }

    /// Adds the trace-correlation stage.
    #[must_use]
    pub fn with_trace_correlation(mut self, params: TraceCorrelationParams) -> Self {
        self.trace_correlation = Some(params);
        self
    }

    /// NN parameters when the NN method is selected.
    #[must_use]
    pub fn nn_params(&self) -> Option<&NnParams> {
        match &self.method {
            CleaningMethod::NextNeighbor(p) => Some(p),
            _ => None,
        }
    }

    /// Validates the whole configuration.
    ///
    /// # Errors
    /// Returns [`Error::Config`] describing the first invalid parameter.
    pub fn validate(&self) -> Result<()> {
        self.method.validate()?;
        if let Some(trace) = &self.trace_correlation {
            trace.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_scale() {
        assert!((ThresholdScale::Fixed.threshold(5.0, 3.0) - 5.0).abs() < f64::EPSILON);
        assert!((ThresholdScale::Pedvar.threshold(5.0, 3.0) - 15.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_two_level_validation() {
        assert!(TwoLevelParams::default().validate().is_ok());
        assert!(TwoLevelParams::fixed(5.0, 7.0).validate().is_err());
        assert!(TwoLevelParams::fixed(f64::NAN, 1.0).validate().is_err());
        assert!(TwoLevelParams::fixed(-1.0, -2.0).validate().is_err());
    }

    #[test]
    fn test_nn_class_set() {
        let set = NnClassSet::only(&[NnClass::FourNn, NnClass::TwoNn]);
        let enabled: Vec<_> = set.iter().collect();
        assert_eq!(enabled, vec![NnClass::TwoNn, NnClass::FourNn]);
        assert!(NnClassSet::none().is_empty());
        assert_eq!(NnClass::TwoPlusOne.multiplicity(), 3);
    }

    #[test]
    fn test_nn_class_overrides() {
        let params =
            NnParams::default().with_class_override(3, NnClassSet::only(&[NnClass::TwoNn]));
        assert_eq!(params.classes_for(1), NnClassSet::all());
        assert!(!params.classes_for(3).contains(NnClass::ThreeNn));
    }

    #[test]
    fn test_nn_validation() {
        assert!(NnParams::default().validate().is_ok());
        assert!(NnParams::default()
            .with_fake_image_probability(0.0)
            .validate()
            .is_ok());
        assert!(NnParams::default()
            .with_fake_image_probability(1.5)
            .validate()
            .is_err());
    }

    #[test]
    fn test_config_validation() {
        let config = CleaningConfig::new(CleaningMethod::SizeCluster(
            SizeClusterParams::default().with_cluster_limits(10.0, 2, 0),
        ));
        assert!(config.validate().is_err());

        let config = CleaningConfig::default().with_trace_correlation(TraceCorrelationParams {
            min_correlation: 2.0,
            ..TraceCorrelationParams::default()
        });
        assert!(config.validate().is_err());
        assert_eq!(CleaningConfig::default().method.name(), "two-level-pedvar");
    }
}
