//! Error types for the SkyTrack environment abstraction.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// A periodic trigger was configured with an unusable period
    #[error("Invalid period: {0:?}")]
    InvalidPeriod(Duration),
}
