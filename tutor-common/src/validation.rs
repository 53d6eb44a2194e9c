//! Configuration validation for the tutor relay.
//!
//! Startup refuses to proceed with an invalid configuration; in particular a
//! missing upstream credential is fatal here rather than on first use.

use thiserror::Error;

use crate::config::{Config, ImageConfig, ObservabilityConfig, RelayConfig, UpstreamConfig};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors: Vec<ValidationError> = [
            self.upstream.validate(),
            self.relay.validate(),
            self.image.validate(),
            self.observability.validate(),
        ]
        .into_iter()
        .filter_map(Result::err)
        .collect();

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }
}

impl Validate for UpstreamConfig {
    fn validate(&self) -> ValidationResult<()> {
        let has_key = self
            .api_key
            .as_deref()
            .is_some_and(|k| !k.trim().is_empty());
        if !has_key {
            return Err(ValidationError::MissingField {
                field: "upstream.api_key (OPENAI_API_KEY)".into(),
            });
        }

        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ValidationError::InvalidValue {
                field: "upstream.base_url".into(),
                reason: format!("'{}' is not an http(s) URL", self.base_url),
            });
        }

        if self.model.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "upstream.model".into(),
            });
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ValidationError::InvalidValue {
                field: "upstream.temperature".into(),
                reason: format!("{} is outside 0.0..=2.0", self.temperature),
            });
        }

        Ok(())
    }
}

impl Validate for RelayConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.persona.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "relay.persona".into(),
            });
        }
        if self.upstream_timeout_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "relay.upstream_timeout_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

impl Validate for ImageConfig {
    fn validate(&self) -> ValidationResult<()> {
        let square = self
            .size
            .split_once('x')
            .and_then(|(w, h)| Some((w.parse::<u32>().ok()?, h.parse::<u32>().ok()?)))
            .is_some_and(|(w, h)| w == h && w > 0);
        if !square {
            return Err(ValidationError::InvalidValue {
                field: "image.size".into(),
                reason: format!("'{}' is not a square WxH resolution", self.size),
            });
        }
        if self.count == 0 {
            return Err(ValidationError::InvalidValue {
                field: "image.count".into(),
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            });
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.upstream.api_key = Some("sk-test".into());
        config
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_missing_api_key_fails() {
        let config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ValidationError::MissingField { .. }));
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_empty_api_key_fails() {
        let mut config = valid_config();
        config.upstream.api_key = Some(String::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_square_image_size_fails() {
        let mut config = valid_config();
        config.image.size = "256x512".into();
        assert!(config.image.validate().is_err());

        config.image.size = "big".into();
        assert!(config.image.validate().is_err());
    }

    #[test]
    fn test_bad_log_format_fails() {
        let mut config = valid_config();
        config.observability.log_format = "xml".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_multiple_errors_are_collected() {
        let mut config = Config::default();
        config.relay.upstream_timeout_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ValidationError::Multiple(ref v) if v.len() == 2));
    }
}
