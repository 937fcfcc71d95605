//! Error types for iactclean-core.

use thiserror::Error;

use crate::geometry::TelescopeType;

/// Result type alias for iactclean operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for image cleaning.
///
/// Numeric degeneracies inside rate-contour evaluation are not errors: they
/// are recovered where they occur. An empty cleaning result is not an error
/// either.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or missing cleaning parameter.
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed camera geometry (adjacency out of range, asymmetric, ...).
    #[error("geometry error: {0}")]
    Geometry(String),

    /// Per-event arrays that do not share the geometry's index space.
    #[error("inconsistent input: {what} has {found} entries, expected {expected}")]
    InconsistentInput {
        /// Name of the offending array.
        what: &'static str,
        /// Expected length (pixel count of the geometry).
        expected: usize,
        /// Actual length.
        found: usize,
    },

    /// No IPR curve is available for a telescope type.
    #[error("no IPR calibration curve for telescope type {0}")]
    MissingCalibration(TelescopeType),

    /// Malformed IPR curve or unusable calibration cache.
    #[error("calibration error: {0}")]
    Calibration(String),
}

impl Error {
    /// Returns true when the error comes from the run configuration rather
    /// than from event data.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Geometry(_))
    }
}
