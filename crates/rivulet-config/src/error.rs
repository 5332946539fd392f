//! Error types for configuration loading.

use thiserror::Error;

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable was not set.
    #[error("missing required environment variable {name}")]
    Missing {
        /// Name of the missing variable.
        name: &'static str,
    },
    /// A variable was present but could not be parsed.
    #[error("environment variable {name} has an invalid value: {detail}")]
    Invalid {
        /// Name of the offending variable.
        name: &'static str,
        /// Human-readable description of the parse failure.
        detail: String,
    },
}

impl ConfigError {
    /// Build an [`ConfigError::Invalid`] for the given variable.
    pub fn invalid(name: &'static str, detail: impl Into<String>) -> Self {
        Self::Invalid {
            name,
            detail: detail.into(),
        }
    }
}
