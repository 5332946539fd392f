//! # Design
//!
//! - Centralize application-level errors for bootstrap and the facade.
//! - Keep error messages constant while carrying context fields for
//!   debugging.
//! - Preserve source errors without re-logging at call sites.

use rivulet_config::ConfigError;
use rivulet_core::error::StoreError;
use rivulet_debrid::error::UpstreamError;
use rivulet_sync::SyncError;
use rivulet_telemetry::TelemetryError;
use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration loading failed.
    #[error("configuration loading failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: ConfigError,
    },
    /// Telemetry setup failed.
    #[error("telemetry setup failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: TelemetryError,
    },
    /// A cache store operation failed.
    #[error("cache store operation failed")]
    Store {
        /// Operation identifier.
        operation: &'static str,
        /// Source store error.
        source: StoreError,
    },
    /// An upstream client operation failed.
    #[error("upstream client operation failed")]
    Upstream {
        /// Operation identifier.
        operation: &'static str,
        /// Source upstream error.
        source: UpstreamError,
    },
    /// A synchronization operation failed.
    #[error("synchronization operation failed")]
    Sync {
        /// Operation identifier.
        operation: &'static str,
        /// Source synchronization error.
        source: SyncError,
    },
}

impl AppError {
    /// Wrap a configuration error under an operation tag.
    #[must_use]
    pub const fn config(operation: &'static str, source: ConfigError) -> Self {
        Self::Config { operation, source }
    }

    /// Wrap a telemetry error under an operation tag.
    #[must_use]
    pub const fn telemetry(operation: &'static str, source: TelemetryError) -> Self {
        Self::Telemetry { operation, source }
    }

    /// Wrap a store error under an operation tag.
    #[must_use]
    pub const fn store(operation: &'static str, source: StoreError) -> Self {
        Self::Store { operation, source }
    }

    /// Wrap an upstream error under an operation tag.
    #[must_use]
    pub const fn upstream(operation: &'static str, source: UpstreamError) -> Self {
        Self::Upstream { operation, source }
    }

    /// Wrap a synchronization error under an operation tag.
    #[must_use]
    pub const fn sync(operation: &'static str, source: SyncError) -> Self {
        Self::Sync { operation, source }
    }
}
