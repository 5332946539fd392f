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

//! Postgres persistence for the cache store contract: migrations, row
//! mappings, and the [`PgCacheStore`] repository.

mod rows;
pub mod store;

pub use store::PgCacheStore;
