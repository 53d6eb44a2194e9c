//! Error types for the tutor relay.

use crate::validation::ValidationError;
use thiserror::Error;

/// Errors that stop the relay from starting.
///
/// Per-request failures have their own types in the gateway and never
/// surface here.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Self::Config(err.to_string())
    }
}
