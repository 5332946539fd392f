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

//! Serialized, rate-limited client for the upstream debrid REST API.
//!
//! Layout: `wire.rs` (API payload shapes), `lane.rs` (single-lane pacing),
//! `client.rs` (the HTTP client and the [`UpstreamClient`] trait),
//! `error.rs` (failure taxonomy).

pub mod client;
pub mod error;
mod lane;
pub mod wire;

pub use client::{ClientOptions, DebridClient, UpstreamClient};
pub use error::UpstreamError;
pub use wire::{DetailFile, TorrentDetail, TorrentSummary, TrafficInfo, UnrestrictedLink, UserInfo};
