//! Error type for cache store implementations.

use std::error::Error;

use thiserror::Error;

/// Convenience alias for cache store results.
pub type StoreResult<T> = Result<T, StoreError>;

/// A cache store operation failed.
///
/// Backends wrap their native error behind a stable operation tag so callers
/// log one consistent shape regardless of the storage engine in use.
#[derive(Debug, Error)]
#[error("cache store operation failed")]
pub struct StoreError {
    operation: &'static str,
    #[source]
    source: Box<dyn Error + Send + Sync>,
}

impl StoreError {
    /// Wrap a backend failure under the given operation tag.
    pub fn new(
        operation: &'static str,
        source: impl Into<Box<dyn Error + Send + Sync>>,
    ) -> Self {
        Self {
            operation,
            source: source.into(),
        }
    }

    /// Operation tag identifying the failed store call.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        self.operation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_carries_operation_and_source() {
        let error = StoreError::new("upsert_torrent", "connection reset");
        assert_eq!(error.operation(), "upsert_torrent");
        assert!(error.source().is_some());
        assert_eq!(error.to_string(), "cache store operation failed");
    }
}
