//! Storage contract consumed by the synchronization engine.
//!
//! # Design
//! - Every operation must be safe under concurrent callers; writes are
//!   idempotent so a lost race produces duplicate-but-safe work, never
//!   corruption.
//! - Implementations hold no authority in process memory: each call reads or
//!   commits durable state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreResult;
use crate::model::{
    CacheMetadata, CacheStatistics, CandidateTier, DirectoryIndex, RefreshJob, StrmMapping,
    Torrent,
};

/// Durable storage for torrent records, the directory index, refresh jobs,
/// and stream-code mappings.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a torrent record by upstream id.
    async fn torrent(&self, id: &str) -> StoreResult<Option<Torrent>>;

    /// Insert or replace a torrent record, keyed by its id.
    async fn upsert_torrent(&self, torrent: &Torrent) -> StoreResult<()>;

    /// Select candidate torrent ids for detail population from one priority
    /// tier, excluding the given ids.
    ///
    /// Ranking per tier: New and Uncached return newest `added` first, Stale
    /// returns oldest `cache_timestamp` first.
    async fn list_candidates(
        &self,
        tier: CandidateTier,
        limit: u32,
        exclude: &[String],
    ) -> StoreResult<Vec<String>>;

    /// Fetch the torrents stored under a directory name.
    async fn directory_snapshot(&self, name: &str) -> StoreResult<Vec<Torrent>>;

    /// Fetch the full committed directory index.
    async fn directory_index(&self) -> StoreResult<DirectoryIndex>;

    /// Replace the directory index wholesale with the given mapping.
    async fn replace_directory_index(&self, index: &DirectoryIndex) -> StoreResult<()>;

    /// Fetch the cache metadata row, if a refresh has ever committed one.
    async fn cache_metadata(&self) -> StoreResult<Option<CacheMetadata>>;

    /// Replace the cache metadata row.
    async fn set_cache_metadata(&self, metadata: &CacheMetadata) -> StoreResult<()>;

    /// Create a new `Running` refresh job for the given candidate count.
    async fn create_refresh_job(&self, total: u32) -> StoreResult<RefreshJob>;

    /// Record per-item progress on a running job.
    async fn update_refresh_job(
        &self,
        id: Uuid,
        processed: u32,
        current: Option<&str>,
    ) -> StoreResult<()>;

    /// Move a job to its terminal status, recording the outcome message.
    async fn complete_refresh_job(
        &self,
        id: Uuid,
        success: bool,
        message: Option<&str>,
    ) -> StoreResult<()>;

    /// Fetch a job by id, or the most recently started job when `id` is
    /// `None`.
    async fn refresh_job(&self, id: Option<Uuid>) -> StoreResult<Option<RefreshJob>>;

    /// Force-fail `Running` jobs started before the cutoff, returning the ids
    /// that were reaped.
    ///
    /// With `only_if_unprogressed` set, jobs that recorded any progress are
    /// left alone.
    async fn reap_stale_jobs(
        &self,
        started_before: DateTime<Utc>,
        only_if_unprogressed: bool,
    ) -> StoreResult<Vec<Uuid>>;

    /// Drop terminal job rows beyond the most recent `keep` entries.
    async fn prune_refresh_jobs(&self, keep: u32) -> StoreResult<()>;

    /// Idempotently persist a stream-code mapping for the proposed
    /// `(torrent_id, filename)` pair.
    ///
    /// Returns the canonical mapping: the pre-existing row when one exists
    /// (its code wins over the proposal), the proposal once inserted, or
    /// `None` when the proposed code collided with a mapping for a different
    /// file and the caller should retry with a fresh code.
    async fn get_or_create_strm_mapping(
        &self,
        proposed: &StrmMapping,
    ) -> StoreResult<Option<StrmMapping>>;

    /// Look up a stream-code mapping by code.
    async fn strm_mapping_by_code(&self, code: &str) -> StoreResult<Option<StrmMapping>>;

    /// Replace the signed link stored for a code, stamping the refresh time.
    /// The code itself never changes.
    async fn update_strm_link(&self, code: &str, link: &str) -> StoreResult<()>;

    /// Fetch library coverage counters.
    async fn cache_statistics(&self) -> StoreResult<CacheStatistics>;
}
