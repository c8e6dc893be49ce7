//! Errors that can occur during tracking operations.
//!
//! "Not enough history yet" is not an error: heading, prediction and
//! maneuver queries return `Option::None` for it.

use thiserror::Error;

/// Errors that can occur during tracking operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackingError {
    /// Record rejected at the boundary (missing id, bad coordinates, ...)
    #[error("Malformed record: {reason}")]
    MalformedRecord { reason: String },

    /// Operation referenced an id the registry does not hold
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    /// Programmer error in the configuration, raised at construction time
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TrackingError {
    /// Creates a malformed-record error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            reason: reason.into(),
        }
    }
}
