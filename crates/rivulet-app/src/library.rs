//! Facade exposing the synchronization engine to presentation-layer
//! collaborators (page rendering, protocol responders, admin surfaces).

use std::sync::Arc;

use rivulet_core::model::{CacheStatistics, DirectoryIndex, RefreshJob, Torrent};
use rivulet_core::store::CacheStore;
use rivulet_debrid::client::UpstreamClient;
use rivulet_debrid::wire::{TrafficInfo, UserInfo};
use rivulet_sync::{
    PopulateOptions, PopulationReport, PriorityPopulator, RefreshCoordinator, RefreshOptions,
    StrmOptions, StrmResolver, Trigger,
};
use rivulet_telemetry::Metrics;
use tracing::error;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Options for the [`Library`] facade's service components.
#[derive(Debug, Clone, Default)]
pub struct LibraryOptions {
    /// Refresh coordinator settings.
    pub refresh: RefreshOptions,
    /// Detail populator settings.
    pub populate: PopulateOptions,
    /// Stream-code resolver settings.
    pub strm: StrmOptions,
}

/// Stable browsing and streaming surface over the mirrored library.
pub struct Library {
    store: Arc<dyn CacheStore>,
    client: Arc<dyn UpstreamClient>,
    refresh: RefreshCoordinator,
    populator: PriorityPopulator,
    resolver: StrmResolver,
}

impl Library {
    /// Wire the facade over a shared upstream client and cache store.
    #[must_use]
    pub fn new(
        client: Arc<dyn UpstreamClient>,
        store: Arc<dyn CacheStore>,
        options: LibraryOptions,
        metrics: Metrics,
    ) -> Self {
        let refresh = RefreshCoordinator::new(
            Arc::clone(&client),
            Arc::clone(&store),
            options.refresh,
            metrics.clone(),
        );
        let populator = PriorityPopulator::new(
            Arc::clone(&client),
            Arc::clone(&store),
            options.populate,
            metrics.clone(),
        );
        let resolver = StrmResolver::new(
            Arc::clone(&client),
            Arc::clone(&store),
            options.strm,
            metrics,
        );
        Self {
            store,
            client,
            refresh,
            populator,
            resolver,
        }
    }

    /// Refresh the library snapshot if stale; returns whether a refresh ran.
    ///
    /// # Errors
    ///
    /// Returns an error when the refresh attempt fails.
    pub async fn ensure_library_fresh(&self) -> AppResult<bool> {
        self.refresh
            .ensure_fresh()
            .await
            .map_err(|err| AppError::sync("ensure_library_fresh", err))
    }

    /// Fetch the committed directory index.
    ///
    /// # Errors
    ///
    /// Returns an error when the store read fails.
    pub async fn directory_index(&self) -> AppResult<DirectoryIndex> {
        self.store
            .directory_index()
            .await
            .map_err(|err| AppError::store("directory_index", err))
    }

    /// Fetch the torrents stored under one directory.
    ///
    /// # Errors
    ///
    /// Returns an error when the store read fails.
    pub async fn directory(&self, name: &str) -> AppResult<Vec<Torrent>> {
        self.store
            .directory_snapshot(name)
            .await
            .map_err(|err| AppError::store("directory", err))
    }

    /// Start a population run in the background, returning its job id.
    ///
    /// # Errors
    ///
    /// Returns an error carrying [`rivulet_sync::SyncError::JobConflict`]
    /// when a run is already active, with the active job's progress.
    pub async fn start_population(&self, trigger: Trigger) -> AppResult<Uuid> {
        let run = self
            .populator
            .begin(trigger)
            .await
            .map_err(|err| AppError::sync("start_population", err))?;
        let job_id = run.id();

        let populator = self.populator.clone();
        tokio::spawn(async move {
            if let Err(err) = populator.process(run).await {
                error!(job_id = %job_id, error = %err, "background population failed");
            }
        });
        Ok(job_id)
    }

    /// Claim and process a population run inline; used by the scheduler.
    ///
    /// # Errors
    ///
    /// Propagates conflict, upstream, and store failures.
    pub async fn run_population(&self, trigger: Trigger) -> AppResult<PopulationReport> {
        self.populator
            .run(trigger)
            .await
            .map_err(|err| AppError::sync("run_population", err))
    }

    /// Fetch population progress by job id, or the latest run's progress.
    ///
    /// # Errors
    ///
    /// Returns an error when the store read fails.
    pub async fn population_status(&self, id: Option<Uuid>) -> AppResult<Option<RefreshJob>> {
        self.populator
            .status(id)
            .await
            .map_err(|err| AppError::sync("population_status", err))
    }

    /// Return the stable stream code for a file, minting one on first
    /// request.
    ///
    /// # Errors
    ///
    /// Returns an error when code persistence fails.
    pub async fn mint_stream_code(
        &self,
        directory: &str,
        torrent_id: &str,
        filename: &str,
        link: &str,
    ) -> AppResult<String> {
        self.resolver
            .mint_or_get(directory, torrent_id, filename, link)
            .await
            .map_err(|err| AppError::sync("mint_stream_code", err))
    }

    /// Resolve a stream code to a redirect URL, falling back to the
    /// placeholder on any resolution failure.
    ///
    /// # Errors
    ///
    /// Returns an error only for malformed codes.
    pub async fn resolve_stream_code(&self, code: &str) -> AppResult<String> {
        self.resolver
            .resolve(code)
            .await
            .map_err(|err| AppError::sync("resolve_stream_code", err))
    }

    /// Fetch library coverage counters.
    ///
    /// # Errors
    ///
    /// Returns an error when the store read fails.
    pub async fn statistics(&self) -> AppResult<CacheStatistics> {
        self.store
            .cache_statistics()
            .await
            .map_err(|err| AppError::store("statistics", err))
    }

    /// Fetch the upstream account profile and traffic counters for the
    /// status surface.
    ///
    /// # Errors
    ///
    /// Returns an error when either upstream call fails.
    pub async fn account_status(&self) -> AppResult<(UserInfo, TrafficInfo)> {
        let user = self
            .client
            .user_info()
            .await
            .map_err(|err| AppError::upstream("account_status.user", err))?;
        let traffic = self
            .client
            .traffic_info()
            .await
            .map_err(|err| AppError::upstream("account_status.traffic", err))?;
        Ok((user, traffic))
    }
}
