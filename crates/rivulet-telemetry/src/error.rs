//! Error types for telemetry setup.

use thiserror::Error;

/// Errors raised while installing telemetry infrastructure.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The global tracing subscriber could not be installed.
    #[error("failed to install tracing subscriber")]
    SubscriberInstall {
        /// Underlying installation failure.
        #[source]
        source: tracing_subscriber::util::TryInitError,
    },
    /// A Prometheus collector could not be created or registered.
    #[error("failed to register metrics collector")]
    MetricsRegistration {
        /// Underlying Prometheus error.
        #[source]
        source: prometheus::Error,
    },
    /// Gathered metrics could not be encoded for export.
    #[error("failed to encode metrics")]
    MetricsEncoding {
        /// Underlying Prometheus error.
        #[source]
        source: prometheus::Error,
    },
}

impl From<prometheus::Error> for TelemetryError {
    fn from(source: prometheus::Error) -> Self {
        Self::MetricsRegistration { source }
    }
}
