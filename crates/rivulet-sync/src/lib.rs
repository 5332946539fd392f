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

//! Cache synchronization engine: staleness-aware library refresh, priority
//! ordered detail population, and stable stream-code resolution.
//!
//! Layout: `refresh.rs` (list refresh and the preserve-detail merge),
//! `populate.rs` (budgeted background population), `strm.rs` (short-code
//! minting and resolution), `detail.rs` (the shared detail-fetch path),
//! `error.rs` (failure taxonomy).

mod detail;
pub mod error;
pub mod populate;
pub mod refresh;
pub mod strm;

pub use error::SyncError;
pub use populate::{PopulateOptions, PopulationJob, PopulationReport, PriorityPopulator, Trigger};
pub use refresh::{RefreshCoordinator, RefreshOptions};
pub use strm::{CODE_LENGTH, StrmOptions, StrmResolver, is_valid_code};
