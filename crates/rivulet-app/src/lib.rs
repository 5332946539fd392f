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

//! Application wiring: the [`Library`] facade over the synchronization
//! engine, dependency bootstrap, and the scheduled refresh loop.

pub mod bootstrap;
pub mod error;
pub mod library;

pub use bootstrap::{AppDependencies, run_app};
pub use error::{AppError, AppResult};
pub use library::{Library, LibraryOptions};
