//! Priority-ordered background detail population.
//!
//! # Design
//! - Candidates are selected in strict tier order (New, Stale, Uncached)
//!   until the per-invocation budget is filled; earlier tiers exclude their
//!   picks from later ones.
//! - Per-item failures are logged, counted, and never abort the batch.
//! - Re-entrancy is store-based: one `Running` job at a time, with stale
//!   jobs reaped by a trigger-specific timeout before the conflict check.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rivulet_core::model::{CandidateTier, RefreshJob};
use rivulet_core::store::CacheStore;
use rivulet_debrid::client::UpstreamClient;
use rivulet_telemetry::Metrics;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::detail::fetch_and_store_detail;
use crate::error::SyncError;

/// Terminal job rows retained as history after each run.
const JOB_HISTORY_LIMIT: u32 = 10;

/// What initiated a population run; governs the stall timeout applied when
/// reaping abandoned jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Started by the recurring scheduler.
    Scheduled,
    /// Started by an explicit admin request.
    Manual,
    /// Started opportunistically while serving a browse request.
    Browse,
}

impl Trigger {
    /// Label used in logs and job messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
            Self::Browse => "browse",
        }
    }

    const fn stall_timeout(self, options: &PopulateOptions) -> Duration {
        match self {
            Self::Scheduled => options.scheduled_stall_timeout,
            Self::Manual | Self::Browse => options.manual_stall_timeout,
        }
    }

    /// Scheduled reaping fails any over-age job; interactive triggers only
    /// reap jobs that never recorded progress.
    const fn only_if_unprogressed(self) -> bool {
        matches!(self, Self::Manual | Self::Browse)
    }
}

/// Settings for [`PriorityPopulator`].
#[derive(Debug, Clone)]
pub struct PopulateOptions {
    /// Maximum candidates processed in one invocation.
    pub budget: u32,
    /// Candidates processed per sub-batch.
    pub batch_size: usize,
    /// Delay inserted between sub-batches.
    pub batch_delay: Duration,
    /// Stall timeout for manual and browse triggers.
    pub manual_stall_timeout: Duration,
    /// Stall timeout for scheduled triggers.
    pub scheduled_stall_timeout: Duration,
}

impl Default for PopulateOptions {
    fn default() -> Self {
        Self {
            budget: 100,
            batch_size: 5,
            batch_delay: Duration::from_secs(20),
            manual_stall_timeout: Duration::from_secs(600),
            scheduled_stall_timeout: Duration::from_secs(1800),
        }
    }
}

/// A claimed population run: the persisted job row plus its candidate ids.
#[derive(Debug)]
pub struct PopulationJob {
    job: RefreshJob,
    candidates: Vec<String>,
    truncated: bool,
}

impl PopulationJob {
    /// Identifier of the persisted job row.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.job.id
    }

    /// Number of candidates selected for this run.
    #[must_use]
    pub fn total(&self) -> u32 {
        u32::try_from(self.candidates.len()).unwrap_or(u32::MAX)
    }
}

/// Outcome of a completed population run.
#[derive(Debug, Clone, Copy)]
pub struct PopulationReport {
    /// Identifier of the job row the run updated.
    pub job_id: Uuid,
    /// Candidates selected for the run.
    pub selected: u32,
    /// Candidates whose detail was fetched and committed.
    pub succeeded: u32,
    /// Candidates that failed and were skipped.
    pub failed: u32,
    /// Whether eligible candidates beyond the budget were left for a later
    /// run.
    pub truncated: bool,
}

/// Spends a bounded per-invocation budget fetching per-torrent detail,
/// ranked by priority tier.
#[derive(Clone)]
pub struct PriorityPopulator {
    client: Arc<dyn UpstreamClient>,
    store: Arc<dyn CacheStore>,
    options: PopulateOptions,
    metrics: Metrics,
}

impl PriorityPopulator {
    /// Construct a populator over the shared client and store.
    #[must_use]
    pub fn new(
        client: Arc<dyn UpstreamClient>,
        store: Arc<dyn CacheStore>,
        options: PopulateOptions,
        metrics: Metrics,
    ) -> Self {
        Self {
            client,
            store,
            options,
            metrics,
        }
    }

    /// Claim a new population run: reap stale jobs, enforce single-runner
    /// semantics, select candidates, and persist the job row.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::JobConflict`] when a live job is already running,
    /// or a store error when persistence fails.
    pub async fn begin(&self, trigger: Trigger) -> Result<PopulationJob, SyncError> {
        let now = Utc::now();
        let cutoff = stall_cutoff(now, trigger.stall_timeout(&self.options));
        let reaped = self
            .store
            .reap_stale_jobs(cutoff, trigger.only_if_unprogressed())
            .await?;
        for id in &reaped {
            warn!(job_id = %id, trigger = trigger.as_str(), "reaped stale population job");
        }

        if let Some(job) = self.store.refresh_job(None).await?
            && job.is_running()
        {
            return Err(SyncError::JobConflict {
                id: job.id,
                processed: job.processed,
                total: job.total,
            });
        }

        let mut candidates = self.select_candidates().await?;
        let truncated = candidates.len() > self.options.budget as usize;
        candidates.truncate(self.options.budget as usize);

        let total = u32::try_from(candidates.len()).unwrap_or(u32::MAX);
        let job = self.store.create_refresh_job(total).await?;
        info!(
            job_id = %job.id,
            trigger = trigger.as_str(),
            selected = total,
            truncated,
            "starting detail population"
        );
        Ok(PopulationJob {
            job,
            candidates,
            truncated,
        })
    }

    /// Process a claimed run to completion, updating job progress after
    /// every item.
    ///
    /// # Errors
    ///
    /// Per-item detail failures are swallowed; only store failures escape,
    /// after marking the job failed with its partial progress.
    pub async fn process(&self, run: PopulationJob) -> Result<PopulationReport, SyncError> {
        let PopulationJob {
            job,
            candidates,
            truncated,
        } = run;
        let total = u32::try_from(candidates.len()).unwrap_or(u32::MAX);
        let mut progress = Progress::default();

        match self.process_batches(&job, &candidates, &mut progress).await {
            Ok(()) => {
                let success = !truncated;
                let message = completion_message(&progress, total, truncated);
                self.store
                    .complete_refresh_job(job.id, success, Some(&message))
                    .await?;
                self.store.prune_refresh_jobs(JOB_HISTORY_LIMIT).await?;
                info!(job_id = %job.id, outcome = %message, "population run finished");
                Ok(PopulationReport {
                    job_id: job.id,
                    selected: total,
                    succeeded: progress.succeeded,
                    failed: progress.failed,
                    truncated,
                })
            }
            Err(err) => {
                let message = format!(
                    "failed after {}/{total}: {err}",
                    progress.processed
                );
                if let Err(complete_err) = self
                    .store
                    .complete_refresh_job(job.id, false, Some(&message))
                    .await
                {
                    error!(
                        job_id = %job.id,
                        error = %complete_err,
                        "failed to record population failure"
                    );
                }
                Err(err)
            }
        }
    }

    /// Claim and process a run in one call.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::begin`] and [`Self::process`] failures.
    pub async fn run(&self, trigger: Trigger) -> Result<PopulationReport, SyncError> {
        let run = self.begin(trigger).await?;
        self.process(run).await
    }

    /// Fetch a job's progress by id, or the latest job when `id` is `None`.
    ///
    /// # Errors
    ///
    /// Returns a store error when the lookup fails.
    pub async fn status(&self, id: Option<Uuid>) -> Result<Option<RefreshJob>, SyncError> {
        Ok(self.store.refresh_job(id).await?)
    }

    async fn select_candidates(&self) -> Result<Vec<String>, SyncError> {
        // One candidate past the budget reveals whether work remains.
        let target = self.options.budget as usize + 1;
        let mut selected: Vec<String> = Vec::new();
        for tier in [
            CandidateTier::New,
            CandidateTier::Stale,
            CandidateTier::Uncached,
        ] {
            if selected.len() >= target {
                break;
            }
            let remaining = u32::try_from(target - selected.len()).unwrap_or(u32::MAX);
            let ids = self
                .store
                .list_candidates(tier, remaining, &selected)
                .await?;
            selected.extend(ids);
        }
        Ok(selected)
    }

    async fn process_batches(
        &self,
        job: &RefreshJob,
        candidates: &[String],
        progress: &mut Progress,
    ) -> Result<(), SyncError> {
        for (batch_index, batch) in candidates.chunks(self.options.batch_size).enumerate() {
            if batch_index > 0 {
                debug!(
                    job_id = %job.id,
                    batch = batch_index,
                    "pausing between population batches"
                );
                sleep(self.options.batch_delay).await;
            }
            for id in batch {
                self.store
                    .update_refresh_job(job.id, progress.processed, Some(id))
                    .await?;
                match fetch_and_store_detail(self.client.as_ref(), self.store.as_ref(), id).await
                {
                    Ok(torrent) => {
                        progress.succeeded += 1;
                        self.metrics.record_torrent_detailed();
                        debug!(
                            torrent_id = %id,
                            files = torrent.selected_files.len(),
                            "cached torrent detail"
                        );
                    }
                    Err(err) => {
                        progress.failed += 1;
                        self.metrics.record_detail_failure();
                        warn!(
                            torrent_id = %id,
                            error = %err,
                            "detail fetch failed, continuing with next candidate"
                        );
                    }
                }
                progress.processed += 1;
                self.store
                    .update_refresh_job(job.id, progress.processed, Some(id))
                    .await?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Progress {
    processed: u32,
    succeeded: u32,
    failed: u32,
}

fn completion_message(progress: &Progress, total: u32, truncated: bool) -> String {
    let mut message = format!(
        "processed {}/{total}: {} succeeded, {} failed",
        progress.processed, progress.succeeded, progress.failed
    );
    if truncated {
        message.push_str(", more candidates remain");
    }
    message
}

fn stall_cutoff(now: DateTime<Utc>, timeout: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(timeout)
        .ok()
        .and_then(|timeout| now.checked_sub_signed(timeout))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use rivulet_core::model::{CacheMetadata, JobStatus};
    use rivulet_test_support::fixtures::{detail_with_files, ready_summary};
    use rivulet_test_support::{MemoryStore, ScriptedUpstream};
    use std::collections::BTreeSet;

    fn populator(
        client: Arc<ScriptedUpstream>,
        store: Arc<MemoryStore>,
        options: PopulateOptions,
    ) -> PriorityPopulator {
        PriorityPopulator::new(
            client,
            store,
            options,
            Metrics::new().expect("metrics registry"),
        )
    }

    fn fast_options(budget: u32) -> PopulateOptions {
        PopulateOptions {
            budget,
            batch_delay: Duration::from_millis(0),
            ..PopulateOptions::default()
        }
    }

    /// Seed one candidate per tier boundary: New = {A, B}, Stale = {C},
    /// Uncached = {D}.
    fn seed_tiers(client: &ScriptedUpstream, store: &MemoryStore) {
        let now = Utc::now();

        for (id, name, offset) in [
            ("A", "New.Release.A", 0_i64),
            ("B", "New.Release.B", 1),
            ("D", "Uncached.Release.D", 2),
        ] {
            let added = now - TimeDelta::hours(offset);
            let summary = ready_summary(id, name, added);
            store.seed_torrent(crate::refresh::merge_known(&summary, None));
            client.set_detail(detail_with_files(
                id,
                name,
                added,
                &[("/movie.mkv", 10, true)],
            ));
        }

        // C is already detailed with an old cache timestamp.
        let c_added = now - TimeDelta::hours(5);
        let c_detail = detail_with_files("C", "Stale.Release.C", c_added, &[("/movie.mkv", 10, true)]);
        let mut stale = crate::detail::torrent_from_detail(&c_detail, now - TimeDelta::days(8));
        stale.added = c_added;
        store.seed_torrent(stale);
        client.set_detail(c_detail);

        store.seed_metadata(CacheMetadata {
            last_refresh: Some(now),
            known_ids: BTreeSet::from_iter(["A", "B", "C", "D"].map(String::from)),
            new_ids: vec!["A".to_string(), "B".to_string()],
            fingerprint: String::new(),
        });
    }

    #[tokio::test]
    async fn budget_two_selects_only_the_new_tier() {
        let client = Arc::new(ScriptedUpstream::new());
        let store = Arc::new(MemoryStore::new());
        seed_tiers(&client, &store);

        let populator = populator(Arc::clone(&client), Arc::clone(&store), fast_options(2));
        let report = populator.run(Trigger::Manual).await.expect("run");

        assert_eq!(client.detail_calls(), vec!["A", "B"]);
        assert_eq!(report.selected, 2);
        assert!(report.truncated);
    }

    #[tokio::test]
    async fn budget_three_adds_the_stale_tier() {
        let client = Arc::new(ScriptedUpstream::new());
        let store = Arc::new(MemoryStore::new());
        seed_tiers(&client, &store);

        let populator = populator(Arc::clone(&client), Arc::clone(&store), fast_options(3));
        let report = populator.run(Trigger::Manual).await.expect("run");

        assert_eq!(client.detail_calls(), vec!["A", "B", "C"]);
        assert_eq!(report.selected, 3);
        assert!(report.truncated);
    }

    #[tokio::test]
    async fn full_budget_reaches_the_uncached_tier_and_completes() {
        let client = Arc::new(ScriptedUpstream::new());
        let store = Arc::new(MemoryStore::new());
        seed_tiers(&client, &store);

        let populator = populator(Arc::clone(&client), Arc::clone(&store), fast_options(10));
        let report = populator.run(Trigger::Manual).await.expect("run");

        assert_eq!(client.detail_calls(), vec!["A", "B", "C", "D"]);
        assert!(!report.truncated);
        assert_eq!(report.succeeded, 4);

        let job = store
            .refresh_job(Some(report.job_id))
            .await
            .expect("read")
            .expect("job row");
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.processed, 4);
    }

    #[tokio::test]
    async fn per_item_failures_do_not_abort_the_batch() {
        let client = Arc::new(ScriptedUpstream::new());
        let store = Arc::new(MemoryStore::new());
        seed_tiers(&client, &store);
        client.fail_detail("B");

        let populator = populator(Arc::clone(&client), Arc::clone(&store), fast_options(10));
        let report = populator.run(Trigger::Manual).await.expect("run");

        assert_eq!(report.succeeded, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(client.detail_calls().len(), 4);

        let job = store
            .refresh_job(Some(report.job_id))
            .await
            .expect("read")
            .expect("job row");
        assert_eq!(job.processed, 4);
        assert!(
            job.error_message
                .as_deref()
                .is_some_and(|message| message.contains("1 failed"))
        );
    }

    #[tokio::test]
    async fn live_job_yields_a_conflict_with_its_progress() {
        let client = Arc::new(ScriptedUpstream::new());
        let store = Arc::new(MemoryStore::new());
        let active = store.create_refresh_job(40).await.expect("job");
        store
            .update_refresh_job(active.id, 12, Some("X"))
            .await
            .expect("progress");

        let populator = populator(client, store, fast_options(10));
        let error = populator
            .begin(Trigger::Manual)
            .await
            .expect_err("conflict expected");
        match error {
            SyncError::JobConflict {
                id,
                processed,
                total,
            } => {
                assert_eq!(id, active.id);
                assert_eq!(processed, 12);
                assert_eq!(total, 40);
            }
            other => panic!("expected JobConflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stalled_unprogressed_job_is_reaped_before_a_manual_start() {
        let client = Arc::new(ScriptedUpstream::new());
        let store = Arc::new(MemoryStore::new());
        store.seed_job(RefreshJob {
            id: Uuid::new_v4(),
            status: JobStatus::Running,
            total: 10,
            processed: 0,
            current_torrent: None,
            started_at: Utc::now() - TimeDelta::minutes(20),
            completed_at: None,
            error_message: None,
        });

        let populator = populator(client, Arc::clone(&store), fast_options(10));
        let run = populator
            .begin(Trigger::Manual)
            .await
            .expect("stale job should be reaped");
        assert_eq!(run.total(), 0);

        let statuses: Vec<JobStatus> = store.jobs().iter().map(|job| job.status).collect();
        assert!(statuses.contains(&JobStatus::Failed));
    }

    #[tokio::test]
    async fn manual_trigger_leaves_a_progressing_job_alone() {
        let client = Arc::new(ScriptedUpstream::new());
        let store = Arc::new(MemoryStore::new());
        store.seed_job(RefreshJob {
            id: Uuid::new_v4(),
            status: JobStatus::Running,
            total: 10,
            processed: 4,
            current_torrent: None,
            started_at: Utc::now() - TimeDelta::minutes(20),
            completed_at: None,
            error_message: None,
        });

        let populator = populator(client, store, fast_options(10));
        let error = populator
            .begin(Trigger::Manual)
            .await
            .expect_err("progressing job must not be reaped by a manual trigger");
        assert!(matches!(error, SyncError::JobConflict { .. }));
    }

    #[tokio::test]
    async fn scheduled_trigger_reaps_over_age_jobs_regardless_of_progress() {
        let client = Arc::new(ScriptedUpstream::new());
        let store = Arc::new(MemoryStore::new());
        store.seed_job(RefreshJob {
            id: Uuid::new_v4(),
            status: JobStatus::Running,
            total: 10,
            processed: 4,
            current_torrent: None,
            started_at: Utc::now() - TimeDelta::minutes(40),
            completed_at: None,
            error_message: None,
        });

        let populator = populator(client, store, fast_options(10));
        populator
            .begin(Trigger::Scheduled)
            .await
            .expect("over-age job should be reaped by the scheduler");
    }
}
