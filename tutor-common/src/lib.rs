//! Tutor Common - Shared configuration, errors, and logging for the tutor relay.
//!
//! This crate provides:
//! - Configuration types and loading (file + environment)
//! - Configuration validation
//! - Error types
//! - Logging setup
//! - Small string utilities

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod util;
pub mod validation;

pub use config::{
    Config, ConfigSource, ImageConfig, ObservabilityConfig, RelayConfig, ServerConfig, UpstreamConfig,
};
pub use error::Error;
pub use validation::{Validate, ValidationError, ValidationResult};
