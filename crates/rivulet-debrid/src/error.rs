//! Failure taxonomy for upstream API calls.

use thiserror::Error;

/// Errors surfaced by the upstream client.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The upstream returned a non-retryable, non-success status code.
    #[error("upstream returned status {status}")]
    Status {
        /// HTTP status code received.
        status: u16,
    },
    /// The request exceeded the configured hard timeout.
    #[error("upstream request timed out")]
    Timeout,
    /// The upstream kept rate limiting past the bounded retry budget.
    #[error("upstream rate limit retries exhausted")]
    RateLimitExhausted,
    /// The request failed at the transport level before a status was seen.
    #[error("upstream transport failure")]
    Transport {
        /// Underlying HTTP client error.
        #[source]
        source: reqwest::Error,
    },
    /// The response body did not match the expected payload shape.
    #[error("upstream response could not be decoded")]
    Decode {
        /// Underlying decode error.
        #[source]
        source: reqwest::Error,
    },
}

impl UpstreamError {
    /// Classify a transport-level failure, folding timeouts into
    /// [`UpstreamError::Timeout`].
    #[must_use]
    pub fn from_transport(source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport { source }
        }
    }
}
