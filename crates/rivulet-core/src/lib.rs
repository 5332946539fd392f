#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Core domain types and the cache store contract shared across the workspace.

pub mod error;
pub mod model;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use model::{
    CacheMetadata, CacheStatistics, CandidateTier, DirectoryIndex, FileEntry, FileHealth,
    JobStatus, RefreshJob, StrmMapping, Torrent, TorrentHealth,
};
pub use store::CacheStore;
