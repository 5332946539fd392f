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

//! Environment-backed configuration for the Rivulet services.
//!
//! Layout: `model.rs` (typed config sections, defaults, and loading),
//! `error.rs` (validation failures).

pub mod error;
pub mod model;

pub use error::{ConfigError, ConfigResult};
pub use model::{Config, PopulateConfig, RefreshConfig, StrmConfig, UpstreamConfig};
