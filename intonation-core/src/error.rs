//! # Error Types
//!
//! Failures that stop an operation from completing. Missing pitch is not one of
//! them: silence, low energy and unvoiced frames travel as `Option` values and
//! drive segment closure instead.

use thiserror::Error;

/// Result type alias using the crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to the caller of the core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A configuration value is outside its accepted range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The recorded timeline went backwards in time.
    ///
    /// Segmentation assumes non-decreasing timestamps, so the offline pass
    /// refuses to continue rather than emit overlapping events.
    #[error("Timeline is out of order at sample {index}: {t_ms} ms follows {prev_ms} ms")]
    NonMonotonicTimeline { index: usize, t_ms: f64, prev_ms: f64 },

    /// The caller raised the cancellation flag between two progress checkpoints.
    #[error("Offline analysis cancelled at {percent}%")]
    Cancelled { percent: u8 },

    /// The offline pass could not produce an event list.
    #[error("Offline analysis failed: {0}")]
    AnalysisFailed(String),
}
