//! Dependency construction and the scheduled refresh/population loop.

use std::sync::Arc;
use std::time::Duration;

use rivulet_config::Config;
use rivulet_data::PgCacheStore;
use rivulet_debrid::client::{ClientOptions, DebridClient};
use rivulet_sync::{PopulateOptions, RefreshOptions, StrmOptions, SyncError, Trigger};
use rivulet_telemetry::{LogFormat, LoggingConfig, Metrics, init_logging};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::error::{AppError, AppResult};
use crate::library::{Library, LibraryOptions};

/// Dependencies required to run the application.
pub struct AppDependencies {
    /// Loaded configuration.
    pub config: Config,
    /// Shared metrics registry.
    pub metrics: Metrics,
    /// Wired library facade.
    pub library: Library,
}

impl AppDependencies {
    /// Construct production dependencies from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration, telemetry, storage, or the
    /// upstream client cannot be initialised.
    pub async fn from_env() -> AppResult<Self> {
        let config = Config::from_env().map_err(|err| AppError::config("config.from_env", err))?;
        init_logging(&LoggingConfig {
            level: &config.log_level,
            format: LogFormat::infer(),
        })
        .map_err(|err| AppError::telemetry("telemetry.init_logging", err))?;
        let metrics =
            Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;

        let store = Arc::new(
            PgCacheStore::connect(&config.database_url)
                .await
                .map_err(|err| AppError::store("cache_store.connect", err))?,
        );
        let client = Arc::new(
            DebridClient::new(client_options(&config), metrics.clone())
                .map_err(|err| AppError::upstream("debrid_client.new", err))?,
        );
        let library = Library::new(client, store, library_options(&config), metrics.clone());

        Ok(Self {
            config,
            metrics,
            library,
        })
    }
}

fn client_options(config: &Config) -> ClientOptions {
    let upstream = &config.upstream;
    let mut options = ClientOptions::new(upstream.base_url.clone(), upstream.token.clone());
    options.timeout = upstream.timeout;
    options.min_interval = upstream.min_interval;
    options.rate_limit_attempts = upstream.rate_limit_attempts;
    options.rate_limit_delay = upstream.rate_limit_delay;
    options
}

fn library_options(config: &Config) -> LibraryOptions {
    LibraryOptions {
        refresh: RefreshOptions {
            interval: config.refresh.interval,
            page_size: config.refresh.page_size,
            immediate_detail_limit: config.refresh.immediate_detail_limit,
        },
        populate: PopulateOptions {
            budget: config.populate.budget,
            batch_size: config.populate.batch_size,
            batch_delay: config.populate.batch_delay,
            manual_stall_timeout: config.populate.manual_stall_timeout,
            scheduled_stall_timeout: config.populate.scheduled_stall_timeout,
        },
        strm: StrmOptions {
            link_ttl: config.strm.link_ttl,
            fallback_url: config.strm.fallback_url(),
        },
    }
}

/// Entry point for the application: wire dependencies and run the scheduled
/// refresh/population cadence until shutdown.
///
/// # Errors
///
/// Returns an error if dependency construction fails.
pub async fn run_app() -> AppResult<()> {
    let dependencies = AppDependencies::from_env().await?;
    run_scheduler(&dependencies).await
}

async fn run_scheduler(dependencies: &AppDependencies) -> AppResult<()> {
    let period = dependencies
        .config
        .refresh
        .interval
        .max(Duration::from_secs(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(period_secs = period.as_secs(), "scheduler running");

    loop {
        ticker.tick().await;

        match dependencies.library.ensure_library_fresh().await {
            Ok(true) => info!("library snapshot refreshed"),
            Ok(false) => {}
            Err(err) => {
                error!(error = %err, "scheduled refresh failed");
                continue;
            }
        }

        match dependencies.library.run_population(Trigger::Scheduled).await {
            Ok(report) => info!(
                job_id = %report.job_id,
                succeeded = report.succeeded,
                failed = report.failed,
                truncated = report.truncated,
                "scheduled population finished"
            ),
            Err(AppError::Sync {
                source: SyncError::JobConflict { id, .. },
                ..
            }) => debug!(job_id = %id, "population already running, skipping tick"),
            Err(err) => error!(error = %err, "scheduled population failed"),
        }
    }
}
