//! Failure taxonomy for the synchronization engine.

use rivulet_core::error::StoreError;
use rivulet_debrid::error::UpstreamError;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by refresh, population, and stream-code operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An upstream API call failed.
    #[error("upstream request failed")]
    Upstream {
        /// Underlying upstream failure.
        #[from]
        source: UpstreamError,
    },
    /// A cache store operation failed.
    #[error("cache store operation failed")]
    Store {
        /// Underlying store failure.
        #[from]
        source: StoreError,
    },
    /// A population job is already running and is not stale.
    #[error("a population job is already running")]
    JobConflict {
        /// Identifier of the active job.
        id: Uuid,
        /// Candidates the active job has processed so far.
        processed: u32,
        /// Candidates the active job selected in total.
        total: u32,
    },
    /// A stream code did not match the required length or character set.
    #[error("stream code has an invalid format")]
    InvalidCodeFormat,
    /// Repeated collision-checked attempts failed to mint a unique code.
    #[error("failed to mint a unique stream code")]
    CodeMintExhausted,
}
