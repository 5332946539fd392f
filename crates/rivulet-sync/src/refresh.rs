//! Staleness-aware library refresh.
//!
//! # Design
//! - A refresh never regresses a detailed torrent: the list endpoint carries
//!   no file data, so the merge step preserves prior detail unconditionally.
//! - Commit order is directory index first, metadata second; a crash in
//!   between is detectable as a stale `last_refresh` rather than a false
//!   "already seen" id.
//! - A failed list fetch aborts the attempt and leaves `last_refresh`
//!   untouched so the next trigger retries from scratch.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rivulet_core::model::{CacheMetadata, DirectoryIndex, Torrent, TorrentHealth};
use rivulet_core::store::CacheStore;
use rivulet_debrid::client::UpstreamClient;
use rivulet_debrid::wire::TorrentSummary;
use rivulet_telemetry::Metrics;
use tracing::{debug, info, warn};

use crate::detail::fetch_and_store_detail;
use crate::error::SyncError;

/// Settings for [`RefreshCoordinator`].
#[derive(Debug, Clone)]
pub struct RefreshOptions {
    /// Age after which the committed snapshot counts as stale.
    pub interval: Duration,
    /// Page size requested from the upstream list endpoint.
    pub page_size: u32,
    /// How many of the newest New torrents are detailed synchronously after
    /// the snapshot commits.
    pub immediate_detail_limit: usize,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            page_size: 1000,
            immediate_detail_limit: 5,
        }
    }
}

/// Decides when the library snapshot is stale and rebuilds it from the
/// upstream list while preserving previously fetched detail.
pub struct RefreshCoordinator {
    client: Arc<dyn UpstreamClient>,
    store: Arc<dyn CacheStore>,
    options: RefreshOptions,
    metrics: Metrics,
}

impl RefreshCoordinator {
    /// Construct a coordinator over the shared client and store.
    #[must_use]
    pub fn new(
        client: Arc<dyn UpstreamClient>,
        store: Arc<dyn CacheStore>,
        options: RefreshOptions,
        metrics: Metrics,
    ) -> Self {
        Self {
            client,
            store,
            options,
            metrics,
        }
    }

    /// Refresh the library snapshot if it has gone stale.
    ///
    /// Returns `true` when a refresh ran, `false` when the snapshot was
    /// still fresh.
    ///
    /// # Errors
    ///
    /// Returns an error when the upstream list fetch or a store commit
    /// fails; `last_refresh` is left unchanged in that case.
    pub async fn ensure_fresh(&self) -> Result<bool, SyncError> {
        let metadata = self.store.cache_metadata().await?;
        let now = Utc::now();
        let last_refresh = metadata.as_ref().and_then(|metadata| metadata.last_refresh);
        if !is_stale(last_refresh, self.options.interval, now) {
            debug!("library snapshot is fresh, skipping refresh");
            return Ok(false);
        }

        self.refresh(metadata.unwrap_or_default(), now).await?;
        Ok(true)
    }

    async fn refresh(&self, previous: CacheMetadata, now: DateTime<Utc>) -> Result<(), SyncError> {
        let listed = self
            .client
            .list_torrents(1, self.options.page_size)
            .await?;
        let ready: Vec<TorrentSummary> = listed
            .into_iter()
            .filter(TorrentSummary::is_ready)
            .collect();

        let new_ids: Vec<String> = ready
            .iter()
            .filter(|summary| !previous.known_ids.contains(&summary.id))
            .map(|summary| summary.id.clone())
            .collect();
        info!(
            total = ready.len(),
            new = new_ids.len(),
            "refreshing library snapshot"
        );

        let mut index = DirectoryIndex::new();
        for summary in &ready {
            let prior = self.store.torrent(&summary.id).await?;
            let merged = merge_known(summary, prior.as_ref());
            self.store.upsert_torrent(&merged).await?;
            index
                .entry(summary.filename.clone())
                .or_default()
                .insert(summary.id.clone());
        }

        // Index first, metadata second: a crash between the two reads as a
        // stale snapshot on the next trigger, never as already-seen ids.
        self.store.replace_directory_index(&index).await?;
        let known_ids: BTreeSet<String> =
            ready.iter().map(|summary| summary.id.clone()).collect();
        let fingerprint = CacheMetadata::fingerprint_of(known_ids.iter());
        self.store
            .set_cache_metadata(&CacheMetadata {
                last_refresh: Some(now),
                known_ids,
                new_ids: new_ids.clone(),
                fingerprint,
            })
            .await?;
        self.metrics.record_refresh();

        self.detail_newest(&ready, &new_ids).await;
        Ok(())
    }

    /// Synchronously detail the newest New entries so first-time browsing is
    /// not empty; the rest are left to the background populator.
    async fn detail_newest(&self, ready: &[TorrentSummary], new_ids: &[String]) {
        let mut newest: Vec<&TorrentSummary> = ready
            .iter()
            .filter(|summary| new_ids.contains(&summary.id))
            .collect();
        newest.sort_by(|left, right| right.added.cmp(&left.added));

        for summary in newest.iter().take(self.options.immediate_detail_limit) {
            match fetch_and_store_detail(self.client.as_ref(), self.store.as_ref(), &summary.id)
                .await
            {
                Ok(torrent) => {
                    self.metrics.record_torrent_detailed();
                    debug!(
                        torrent_id = %summary.id,
                        files = torrent.selected_files.len(),
                        "detailed new torrent after refresh"
                    );
                }
                Err(err) => {
                    self.metrics.record_detail_failure();
                    warn!(
                        torrent_id = %summary.id,
                        error = %err,
                        "failed to detail new torrent, leaving it to the populator"
                    );
                }
            }
        }
    }
}

/// Whether a committed snapshot is past its freshness window.
pub(crate) fn is_stale(
    last_refresh: Option<DateTime<Utc>>,
    interval: Duration,
    now: DateTime<Utc>,
) -> bool {
    last_refresh.is_none_or(|last| {
        now.signed_duration_since(last)
            .to_std()
            .is_ok_and(|age| age > interval)
    })
}

/// Merge one listed torrent with its previously stored record.
///
/// Prior `selected_files` and `cache_timestamp` win unconditionally when
/// present: the list endpoint never returns file-level data, so a list
/// refresh must never regress a detailed torrent to empty.
pub(crate) fn merge_known(summary: &TorrentSummary, prior: Option<&Torrent>) -> Torrent {
    let (selected_files, cache_timestamp) = prior
        .map(|torrent| (torrent.selected_files.clone(), torrent.cache_timestamp))
        .unwrap_or_default();
    Torrent {
        id: summary.id.clone(),
        name: summary.filename.clone(),
        hash: summary.hash.clone(),
        added: summary.added,
        ended: summary.ended,
        selected_files,
        state: TorrentHealth::Ok,
        total_size: summary.bytes,
        cache_timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use rivulet_test_support::fixtures::{detail_with_files, ready_summary};
    use rivulet_test_support::{MemoryStore, ScriptedUpstream};

    fn coordinator(
        client: Arc<ScriptedUpstream>,
        store: Arc<MemoryStore>,
        options: RefreshOptions,
    ) -> RefreshCoordinator {
        RefreshCoordinator::new(
            client,
            store,
            options,
            Metrics::new().expect("metrics registry"),
        )
    }

    #[test]
    fn staleness_honours_the_interval() {
        let now = Utc::now();
        let interval = Duration::from_secs(15);
        assert!(is_stale(None, interval, now));
        assert!(!is_stale(Some(now - TimeDelta::seconds(5)), interval, now));
        assert!(is_stale(Some(now - TimeDelta::seconds(30)), interval, now));
        // A future timestamp reads as fresh rather than wrapping.
        assert!(!is_stale(Some(now + TimeDelta::seconds(30)), interval, now));
    }

    #[test]
    fn merge_preserves_prior_detail_unconditionally() {
        let now = Utc::now();
        let summary = ready_summary("CC", "Known.Release", now);
        let prior = crate::detail::torrent_from_detail(
            &detail_with_files(
                "CC",
                "Known.Release",
                now,
                &[("/Known.Release/movie.mkv", 100, true)],
            ),
            now,
        );

        let merged = merge_known(&summary, Some(&prior));
        assert_eq!(merged.selected_files.len(), 1);
        assert_eq!(merged.cache_timestamp, Some(now));

        let fresh = merge_known(&summary, None);
        assert!(fresh.selected_files.is_empty());
        assert!(fresh.cache_timestamp.is_none());
    }

    #[tokio::test]
    async fn fresh_snapshot_skips_the_upstream_entirely() {
        let client = Arc::new(ScriptedUpstream::new());
        client.fail_listing();
        let store = Arc::new(MemoryStore::new());
        store.seed_metadata(CacheMetadata {
            last_refresh: Some(Utc::now()),
            ..CacheMetadata::default()
        });

        let coordinator = coordinator(Arc::clone(&client), store, RefreshOptions::default());
        let refreshed = coordinator
            .ensure_fresh()
            .await
            .expect("fresh snapshot should not touch the upstream");
        assert!(!refreshed);
    }

    #[tokio::test]
    async fn refresh_commits_index_and_preserves_known_detail() {
        let now = Utc::now();
        let client = Arc::new(ScriptedUpstream::new());
        let store = Arc::new(MemoryStore::new());

        // C is already known and detailed with three files.
        let known_detail = detail_with_files(
            "C",
            "Known.Release",
            now - TimeDelta::hours(3),
            &[
                ("/Known.Release/one.mkv", 10, true),
                ("/Known.Release/two.mkv", 10, true),
                ("/Known.Release/three.mkv", 10, true),
            ],
        );
        store.seed_torrent(crate::detail::torrent_from_detail(&known_detail, now));
        store.seed_metadata(CacheMetadata {
            last_refresh: Some(now - TimeDelta::hours(1)),
            known_ids: BTreeSet::from(["C".to_string()]),
            ..CacheMetadata::default()
        });

        client.set_torrents(vec![
            ready_summary("A", "New.Release.A", now),
            ready_summary("B", "New.Release.B", now - TimeDelta::hours(1)),
            ready_summary("C", "Known.Release", now - TimeDelta::hours(3)),
        ]);
        client.set_detail(detail_with_files(
            "A",
            "New.Release.A",
            now,
            &[("/New.Release.A/a.mkv", 10, true)],
        ));
        client.set_detail(detail_with_files(
            "B",
            "New.Release.B",
            now - TimeDelta::hours(1),
            &[("/New.Release.B/b.mkv", 10, true)],
        ));

        let coordinator = coordinator(
            Arc::clone(&client),
            Arc::clone(&store),
            RefreshOptions::default(),
        );
        let refreshed = coordinator.ensure_fresh().await.expect("refresh should run");
        assert!(refreshed);

        let index = store.directory_index().await.expect("index");
        assert_eq!(index.len(), 3);
        assert!(index.contains_key("Known.Release"));

        // C kept its three files through the list refresh.
        let known = store
            .torrent("C")
            .await
            .expect("store read")
            .expect("known torrent");
        assert_eq!(known.selected_files.len(), 3);
        assert!(known.is_detailed());

        // Both new entries were detailed synchronously, newest first.
        assert_eq!(client.detail_calls(), vec!["A".to_string(), "B".to_string()]);

        let metadata = store
            .cache_metadata()
            .await
            .expect("store read")
            .expect("metadata committed");
        assert_eq!(metadata.known_ids.len(), 3);
        assert_eq!(metadata.new_ids, vec!["A".to_string(), "B".to_string()]);
        assert!(!metadata.fingerprint.is_empty());
    }

    #[tokio::test]
    async fn immediate_detailing_is_capped_and_tolerates_failures() {
        let now = Utc::now();
        let client = Arc::new(ScriptedUpstream::new());
        let store = Arc::new(MemoryStore::new());

        let mut torrents = Vec::new();
        for offset in 0..7_i64 {
            let id = format!("N{offset}");
            let name = format!("New.Release.{offset}");
            let added = now - TimeDelta::minutes(offset);
            torrents.push(ready_summary(&id, &name, added));
            client.set_detail(detail_with_files(
                &id,
                &name,
                added,
                &[("/movie.mkv", 10, true)],
            ));
        }
        client.set_torrents(torrents);
        // The newest entry fails to detail; the batch continues.
        client.fail_detail("N0");

        let coordinator = coordinator(
            Arc::clone(&client),
            Arc::clone(&store),
            RefreshOptions::default(),
        );
        coordinator.ensure_fresh().await.expect("refresh should run");

        // Five newest attempted, in recency order.
        let calls = client.detail_calls();
        assert_eq!(calls, vec!["N0", "N1", "N2", "N3", "N4"]);

        let failed = store.torrent("N0").await.expect("read").expect("record");
        assert!(!failed.is_detailed());
        let detailed = store.torrent("N1").await.expect("read").expect("record");
        assert!(detailed.is_detailed());
    }

    #[tokio::test]
    async fn failed_list_fetch_leaves_last_refresh_unchanged() {
        let stale_refresh = Utc::now() - TimeDelta::hours(2);
        let client = Arc::new(ScriptedUpstream::new());
        client.fail_listing();
        let store = Arc::new(MemoryStore::new());
        store.seed_metadata(CacheMetadata {
            last_refresh: Some(stale_refresh),
            ..CacheMetadata::default()
        });

        let coordinator = coordinator(
            Arc::clone(&client),
            Arc::clone(&store),
            RefreshOptions::default(),
        );
        let error = coordinator
            .ensure_fresh()
            .await
            .expect_err("list failure should abort the refresh");
        assert!(matches!(error, SyncError::Upstream { .. }));

        let metadata = store
            .cache_metadata()
            .await
            .expect("store read")
            .expect("metadata");
        assert_eq!(metadata.last_refresh, Some(stale_refresh));
    }
}
