//! iactclean-algorithms: Image cleaning algorithms for Cherenkov cameras.
//!
//! This crate provides the cleaning methods:
//! - **Two-level** - tailcut with fixed or pedvar-scaled thresholds
//! - **Time difference** - two-level plus neighbor time coincidence
//! - **Time cluster** - time-coincident clusters matched to the main cluster
//! - **Size cluster** - connected clusters filtered by charge and size
//! - **Next-neighbor** - groups accepted against IPR rate contours
//!
//! and the optional trace-correlation stage, all driven by [`ImageCleaner`].
//!
#![warn(missing_docs)]

mod cluster;
mod engine;
pub mod nn;
mod processing;
mod size_cluster;
mod state;
mod tailcut;
mod time_cluster;
mod time_diff;
mod trace_correlation;
mod union_find;

pub use engine::ImageCleaner;
pub use nn::{BoundaryContour, IprCalibrationStore, IprSource, NnCalibration, RateContour};
pub use processing::{clean_and_summarize, clean_events, clean_events_sequential};
pub use state::CleaningState;

// Re-export the core data model
pub use iactclean_core::{
    CameraGeometry, CleaningConfig, CleaningMethod, CleaningResult, CleaningStatistics,
    EventSignal, IprCurve,
};
