//! In-memory fakes: a [`MemoryStore`] cache store and a [`ScriptedUpstream`]
//! client for driving the synchronization engine without a database or
//! network.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rivulet_core::error::{StoreError, StoreResult};
use rivulet_core::model::{
    CacheMetadata, CacheStatistics, CandidateTier, DirectoryIndex, JobStatus, RefreshJob,
    StrmMapping, Torrent,
};
use rivulet_core::store::CacheStore;
use rivulet_debrid::client::UpstreamClient;
use rivulet_debrid::error::UpstreamError;
use rivulet_debrid::wire::{TorrentDetail, TorrentSummary, TrafficInfo, UnrestrictedLink, UserInfo};
use uuid::Uuid;

#[derive(Default)]
struct StoreState {
    torrents: BTreeMap<String, Torrent>,
    directories: DirectoryIndex,
    metadata: Option<CacheMetadata>,
    jobs: Vec<RefreshJob>,
    strm: Vec<StrmMapping>,
}

/// In-memory [`CacheStore`] with the same idempotence and ranking semantics
/// as the Postgres implementation.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of torrent records currently held.
    #[must_use]
    pub fn torrent_count(&self) -> usize {
        self.lock().torrents.len()
    }

    /// All refresh jobs recorded so far, oldest first.
    #[must_use]
    pub fn jobs(&self) -> Vec<RefreshJob> {
        self.lock().jobs.clone()
    }

    /// Seed a torrent record directly, bypassing the refresh path.
    pub fn seed_torrent(&self, torrent: Torrent) {
        self.lock().torrents.insert(torrent.id.clone(), torrent);
    }

    /// Seed the metadata row directly.
    pub fn seed_metadata(&self, metadata: CacheMetadata) {
        self.lock().metadata = Some(metadata);
    }

    /// Seed a job row directly, bypassing `create_refresh_job`.
    pub fn seed_job(&self, job: RefreshJob) {
        self.lock().jobs.push(job);
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn torrent(&self, id: &str) -> StoreResult<Option<Torrent>> {
        Ok(self.lock().torrents.get(id).cloned())
    }

    async fn upsert_torrent(&self, torrent: &Torrent) -> StoreResult<()> {
        self.lock()
            .torrents
            .insert(torrent.id.clone(), torrent.clone());
        Ok(())
    }

    async fn list_candidates(
        &self,
        tier: CandidateTier,
        limit: u32,
        exclude: &[String],
    ) -> StoreResult<Vec<String>> {
        let state = self.lock();
        let new_ids: BTreeSet<&str> = state
            .metadata
            .as_ref()
            .map(|metadata| metadata.new_ids.iter().map(String::as_str).collect())
            .unwrap_or_default();

        let mut matching: Vec<&Torrent> = state
            .torrents
            .values()
            .filter(|torrent| !exclude.contains(&torrent.id))
            .filter(|torrent| match tier {
                CandidateTier::New => {
                    torrent.cache_timestamp.is_none() && new_ids.contains(torrent.id.as_str())
                }
                CandidateTier::Stale => {
                    torrent.cache_timestamp.is_some() && !torrent.selected_files.is_empty()
                }
                CandidateTier::Uncached => {
                    torrent.cache_timestamp.is_none() && !new_ids.contains(torrent.id.as_str())
                }
            })
            .collect();

        match tier {
            CandidateTier::Stale => {
                matching.sort_by_key(|torrent| torrent.cache_timestamp);
            }
            CandidateTier::New | CandidateTier::Uncached => {
                matching.sort_by(|left, right| right.added.cmp(&left.added));
            }
        }

        Ok(matching
            .into_iter()
            .take(limit as usize)
            .map(|torrent| torrent.id.clone())
            .collect())
    }

    async fn directory_snapshot(&self, name: &str) -> StoreResult<Vec<Torrent>> {
        let state = self.lock();
        let Some(access_keys) = state.directories.get(name) else {
            return Ok(Vec::new());
        };
        Ok(access_keys
            .iter()
            .filter_map(|key| state.torrents.get(key).cloned())
            .collect())
    }

    async fn directory_index(&self) -> StoreResult<DirectoryIndex> {
        Ok(self.lock().directories.clone())
    }

    async fn replace_directory_index(&self, index: &DirectoryIndex) -> StoreResult<()> {
        self.lock().directories = index.clone();
        Ok(())
    }

    async fn cache_metadata(&self) -> StoreResult<Option<CacheMetadata>> {
        Ok(self.lock().metadata.clone())
    }

    async fn set_cache_metadata(&self, metadata: &CacheMetadata) -> StoreResult<()> {
        self.lock().metadata = Some(metadata.clone());
        Ok(())
    }

    async fn create_refresh_job(&self, total: u32) -> StoreResult<RefreshJob> {
        let job = RefreshJob {
            id: Uuid::new_v4(),
            status: JobStatus::Running,
            total,
            processed: 0,
            current_torrent: None,
            started_at: Utc::now(),
            completed_at: None,
            error_message: None,
        };
        self.lock().jobs.push(job.clone());
        Ok(job)
    }

    async fn update_refresh_job(
        &self,
        id: Uuid,
        processed: u32,
        current: Option<&str>,
    ) -> StoreResult<()> {
        let mut state = self.lock();
        let job = state
            .jobs
            .iter_mut()
            .find(|job| job.id == id)
            .ok_or_else(|| StoreError::new("update_refresh_job", "job not found"))?;
        job.processed = processed;
        job.current_torrent = current.map(ToString::to_string);
        Ok(())
    }

    async fn complete_refresh_job(
        &self,
        id: Uuid,
        success: bool,
        message: Option<&str>,
    ) -> StoreResult<()> {
        let mut state = self.lock();
        let job = state
            .jobs
            .iter_mut()
            .find(|job| job.id == id)
            .ok_or_else(|| StoreError::new("complete_refresh_job", "job not found"))?;
        job.status = if success {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        };
        job.completed_at = Some(Utc::now());
        job.error_message = message.map(ToString::to_string);
        Ok(())
    }

    async fn refresh_job(&self, id: Option<Uuid>) -> StoreResult<Option<RefreshJob>> {
        let state = self.lock();
        Ok(match id {
            Some(id) => state.jobs.iter().find(|job| job.id == id).cloned(),
            None => state
                .jobs
                .iter()
                .max_by_key(|job| job.started_at)
                .cloned(),
        })
    }

    async fn reap_stale_jobs(
        &self,
        started_before: DateTime<Utc>,
        only_if_unprogressed: bool,
    ) -> StoreResult<Vec<Uuid>> {
        let mut state = self.lock();
        let mut reaped = Vec::new();
        for job in &mut state.jobs {
            if job.is_running()
                && job.started_at < started_before
                && (!only_if_unprogressed || job.processed == 0)
            {
                job.status = JobStatus::Failed;
                job.completed_at = Some(Utc::now());
                job.error_message = Some("reaped stale job".to_string());
                reaped.push(job.id);
            }
        }
        Ok(reaped)
    }

    async fn prune_refresh_jobs(&self, keep: u32) -> StoreResult<()> {
        let mut state = self.lock();
        let mut ordered: Vec<(DateTime<Utc>, Uuid)> = state
            .jobs
            .iter()
            .map(|job| (job.started_at, job.id))
            .collect();
        ordered.sort_by(|left, right| right.0.cmp(&left.0));
        let retain: BTreeSet<Uuid> = ordered
            .into_iter()
            .take(keep as usize)
            .map(|(_, id)| id)
            .collect();
        state
            .jobs
            .retain(|job| job.is_running() || retain.contains(&job.id));
        Ok(())
    }

    async fn get_or_create_strm_mapping(
        &self,
        proposed: &StrmMapping,
    ) -> StoreResult<Option<StrmMapping>> {
        let mut state = self.lock();
        if let Some(existing) = state
            .strm
            .iter()
            .find(|mapping| {
                mapping.torrent_id == proposed.torrent_id && mapping.filename == proposed.filename
            })
            .cloned()
        {
            return Ok(Some(existing));
        }
        if state.strm.iter().any(|mapping| mapping.code == proposed.code) {
            // Code collision with a mapping for a different file.
            return Ok(None);
        }
        state.strm.push(proposed.clone());
        Ok(Some(proposed.clone()))
    }

    async fn strm_mapping_by_code(&self, code: &str) -> StoreResult<Option<StrmMapping>> {
        Ok(self
            .lock()
            .strm
            .iter()
            .find(|mapping| mapping.code == code)
            .cloned())
    }

    async fn update_strm_link(&self, code: &str, link: &str) -> StoreResult<()> {
        let mut state = self.lock();
        let mapping = state
            .strm
            .iter_mut()
            .find(|mapping| mapping.code == code)
            .ok_or_else(|| StoreError::new("update_strm_link", "code not found"))?;
        mapping.link = link.to_string();
        mapping.link_refreshed_at = Utc::now();
        Ok(())
    }

    async fn cache_statistics(&self) -> StoreResult<CacheStatistics> {
        let state = self.lock();
        let total = state.torrents.len() as u64;
        let detailed = state
            .torrents
            .values()
            .filter(|torrent| torrent.cache_timestamp.is_some())
            .count() as u64;
        Ok(CacheStatistics {
            total,
            detailed,
            pending: total.saturating_sub(detailed),
        })
    }
}

#[derive(Default)]
struct UpstreamState {
    torrents: Vec<TorrentSummary>,
    details: BTreeMap<String, TorrentDetail>,
    failing_details: BTreeSet<String>,
    fail_listing: bool,
    detail_calls: Vec<String>,
}

/// Scripted [`UpstreamClient`] returning canned payloads and failures.
#[derive(Default)]
pub struct ScriptedUpstream {
    state: Mutex<UpstreamState>,
}

impl ScriptedUpstream {
    /// Create an upstream with no torrents.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, UpstreamState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the listing returned by `list_torrents`.
    pub fn set_torrents(&self, torrents: Vec<TorrentSummary>) {
        self.lock().torrents = torrents;
    }

    /// Register the detail payload returned for a torrent id.
    pub fn set_detail(&self, detail: TorrentDetail) {
        self.lock().details.insert(detail.id.clone(), detail);
    }

    /// Make detail fetches for the given id fail with an upstream error.
    pub fn fail_detail(&self, id: &str) {
        self.lock().failing_details.insert(id.to_string());
    }

    /// Make the listing endpoint fail.
    pub fn fail_listing(&self) {
        self.lock().fail_listing = true;
    }

    /// Ids passed to `torrent_detail` so far, in call order.
    #[must_use]
    pub fn detail_calls(&self) -> Vec<String> {
        self.lock().detail_calls.clone()
    }
}

#[async_trait]
impl UpstreamClient for ScriptedUpstream {
    async fn list_torrents(
        &self,
        page: u32,
        limit: u32,
    ) -> Result<Vec<TorrentSummary>, UpstreamError> {
        let state = self.lock();
        if state.fail_listing {
            return Err(UpstreamError::Status { status: 503 });
        }
        let skip = (page.saturating_sub(1) as usize).saturating_mul(limit as usize);
        Ok(state
            .torrents
            .iter()
            .skip(skip)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn torrent_detail(&self, id: &str) -> Result<TorrentDetail, UpstreamError> {
        let mut state = self.lock();
        state.detail_calls.push(id.to_string());
        if state.failing_details.contains(id) {
            return Err(UpstreamError::Status { status: 503 });
        }
        state
            .details
            .get(id)
            .cloned()
            .ok_or(UpstreamError::Status { status: 404 })
    }

    async fn unrestrict_link(&self, link: &str) -> Result<UnrestrictedLink, UpstreamError> {
        Ok(UnrestrictedLink {
            download: link.replace("/restricted/", "/direct/"),
        })
    }

    async fn user_info(&self) -> Result<UserInfo, UpstreamError> {
        Ok(UserInfo {
            id: 1,
            username: "fixture".to_string(),
            points: 0,
            kind: "premium".to_string(),
            premium: 86_400,
            expiration: Utc::now(),
        })
    }

    async fn traffic_info(&self) -> Result<TrafficInfo, UpstreamError> {
        Ok(TrafficInfo::new())
    }
}
