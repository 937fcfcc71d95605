//! iactclean-core: Core types for Cherenkov camera image cleaning.
//!
//! This crate provides the data model shared by the cleaning algorithms:
//! camera geometry and neighbor graph, per-event signal, IPR calibration
//! curves, the run configuration and the cleaning result.
//!

pub mod config;
pub mod error;
pub mod geometry;
pub mod ipr;
pub mod result;
pub mod signal;

pub use config::{
    CleaningConfig, CleaningMethod, NnClass, NnClassSet, NnParams, SizeClusterParams,
    ThresholdScale, TimeClusterParams, TimeDifferenceParams, TraceCorrelationParams,
    TwoLevelParams,
};
pub use error::{Error, Result};
pub use geometry::{CameraDescription, CameraGeometry, PixelGeometry, TelescopeType};
pub use ipr::IprCurve;
pub use result::{CleaningResult, CleaningStatistics, REJECTED_CLUSTER, UNASSIGNED_CLUSTER};
pub use signal::{EventSignal, PulseTraces, TimeGradientHint};
