//! Typed configuration sections and environment loading.
//!
//! # Design
//! - Pure data carriers with defaults matching the upstream service's
//!   operational limits.
//! - Loading is injectable (`from_lookup`) so tests never mutate process
//!   environment.

use std::time::Duration;

use url::Url;

use crate::error::{ConfigError, ConfigResult};

const ENV_DATABASE_URL: &str = "RIVULET_DATABASE_URL";
const ENV_LOG_LEVEL: &str = "RIVULET_LOG_LEVEL";
const ENV_UPSTREAM_TOKEN: &str = "RIVULET_UPSTREAM_TOKEN";
const ENV_UPSTREAM_BASE_URL: &str = "RIVULET_UPSTREAM_BASE_URL";
const ENV_UPSTREAM_TIMEOUT_SECS: &str = "RIVULET_UPSTREAM_TIMEOUT_SECS";
const ENV_UPSTREAM_MIN_INTERVAL_MS: &str = "RIVULET_UPSTREAM_MIN_INTERVAL_MS";
const ENV_UPSTREAM_RATE_LIMIT_ATTEMPTS: &str = "RIVULET_UPSTREAM_RATE_LIMIT_ATTEMPTS";
const ENV_UPSTREAM_RATE_LIMIT_DELAY_MS: &str = "RIVULET_UPSTREAM_RATE_LIMIT_DELAY_MS";
const ENV_REFRESH_INTERVAL_SECS: &str = "RIVULET_REFRESH_INTERVAL_SECS";
const ENV_REFRESH_PAGE_SIZE: &str = "RIVULET_REFRESH_PAGE_SIZE";
const ENV_REFRESH_IMMEDIATE_LIMIT: &str = "RIVULET_REFRESH_IMMEDIATE_DETAIL_LIMIT";
const ENV_POPULATE_BUDGET: &str = "RIVULET_POPULATE_BUDGET";
const ENV_POPULATE_BATCH_SIZE: &str = "RIVULET_POPULATE_BATCH_SIZE";
const ENV_POPULATE_BATCH_DELAY_SECS: &str = "RIVULET_POPULATE_BATCH_DELAY_SECS";
const ENV_POPULATE_MANUAL_STALL_SECS: &str = "RIVULET_POPULATE_MANUAL_STALL_TIMEOUT_SECS";
const ENV_POPULATE_SCHEDULED_STALL_SECS: &str = "RIVULET_POPULATE_SCHEDULED_STALL_TIMEOUT_SECS";
const ENV_PUBLIC_BASE_URL: &str = "RIVULET_PUBLIC_BASE_URL";
const ENV_STRM_LINK_TTL_SECS: &str = "RIVULET_STRM_LINK_TTL_SECS";

const DEFAULT_UPSTREAM_BASE_URL: &str = "https://api.real-debrid.com/rest/1.0";
const DEFAULT_PUBLIC_BASE_URL: &str = "http://127.0.0.1:8080";

/// Top-level configuration assembled from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string for the cache store.
    pub database_url: String,
    /// Default log level when `RUST_LOG` is unset.
    pub log_level: String,
    /// Upstream client settings.
    pub upstream: UpstreamConfig,
    /// Library refresh settings.
    pub refresh: RefreshConfig,
    /// Detail-population settings.
    pub populate: PopulateConfig,
    /// Stream-code resolution settings.
    pub strm: StrmConfig,
}

/// Settings for the rate-limited upstream client.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Base URL of the upstream REST API.
    pub base_url: Url,
    /// Bearer token presented on every request.
    pub token: String,
    /// Hard per-request timeout.
    pub timeout: Duration,
    /// Minimum interval between any two outbound requests.
    pub min_interval: Duration,
    /// Total attempts permitted when the upstream reports rate limiting.
    pub rate_limit_attempts: u32,
    /// Fixed delay before retrying a rate-limited request.
    pub rate_limit_delay: Duration,
}

/// Settings for the staleness-aware library refresh.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Age after which the committed library snapshot counts as stale.
    pub interval: Duration,
    /// Page size requested from the upstream list endpoint.
    pub page_size: u32,
    /// How many of the newest New torrents are detailed synchronously after
    /// a refresh commits.
    pub immediate_detail_limit: usize,
}

/// Settings for the priority-ordered detail populator.
#[derive(Debug, Clone)]
pub struct PopulateConfig {
    /// Maximum candidates processed in one invocation.
    pub budget: u32,
    /// Candidates processed per sub-batch.
    pub batch_size: usize,
    /// Delay inserted between sub-batches.
    pub batch_delay: Duration,
    /// Stall timeout for jobs started by manual or browse triggers.
    pub manual_stall_timeout: Duration,
    /// Stall timeout for jobs started by the scheduler.
    pub scheduled_stall_timeout: Duration,
}

/// Settings for stream-code minting and resolution.
#[derive(Debug, Clone)]
pub struct StrmConfig {
    /// Public base URL used to build the fallback placeholder link.
    pub public_base_url: Url,
    /// Age after which a stored signed link is refreshed before use.
    pub link_ttl: Duration,
}

impl StrmConfig {
    /// Placeholder URL returned when a stream code cannot be resolved.
    #[must_use]
    pub fn fallback_url(&self) -> String {
        let base = self.public_base_url.as_str().trim_end_matches('/');
        format!("{base}/not_found.mp4")
    }
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error when a required variable is missing or any value
    /// fails to parse or validate.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an injectable variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error when a required variable is missing or any value
    /// fails to parse or validate.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let database_url = require(&lookup, ENV_DATABASE_URL)?;
        let log_level = lookup(ENV_LOG_LEVEL).unwrap_or_else(|| "info".to_string());

        let upstream = UpstreamConfig {
            base_url: parse_url(&lookup, ENV_UPSTREAM_BASE_URL, DEFAULT_UPSTREAM_BASE_URL)?,
            token: require(&lookup, ENV_UPSTREAM_TOKEN)?,
            timeout: secs(&lookup, ENV_UPSTREAM_TIMEOUT_SECS, 30)?,
            min_interval: millis(&lookup, ENV_UPSTREAM_MIN_INTERVAL_MS, 1000)?,
            rate_limit_attempts: nonzero_u32(&lookup, ENV_UPSTREAM_RATE_LIMIT_ATTEMPTS, 3)?,
            rate_limit_delay: millis(&lookup, ENV_UPSTREAM_RATE_LIMIT_DELAY_MS, 2000)?,
        };

        let refresh = RefreshConfig {
            interval: secs(&lookup, ENV_REFRESH_INTERVAL_SECS, 15)?,
            page_size: nonzero_u32(&lookup, ENV_REFRESH_PAGE_SIZE, 1000)?,
            immediate_detail_limit: parse_num(&lookup, ENV_REFRESH_IMMEDIATE_LIMIT, 5)?,
        };

        let populate = PopulateConfig {
            budget: nonzero_u32(&lookup, ENV_POPULATE_BUDGET, 100)?,
            batch_size: nonzero_usize(&lookup, ENV_POPULATE_BATCH_SIZE, 5)?,
            batch_delay: secs(&lookup, ENV_POPULATE_BATCH_DELAY_SECS, 20)?,
            manual_stall_timeout: secs(&lookup, ENV_POPULATE_MANUAL_STALL_SECS, 600)?,
            scheduled_stall_timeout: secs(&lookup, ENV_POPULATE_SCHEDULED_STALL_SECS, 1800)?,
        };

        let strm = StrmConfig {
            public_base_url: parse_url(&lookup, ENV_PUBLIC_BASE_URL, DEFAULT_PUBLIC_BASE_URL)?,
            link_ttl: secs(&lookup, ENV_STRM_LINK_TTL_SECS, 21_600)?,
        };

        Ok(Self {
            database_url,
            log_level,
            upstream,
            refresh,
            populate,
            strm,
        })
    }
}

fn require<F>(lookup: &F, name: &'static str) -> ConfigResult<String>
where
    F: Fn(&'static str) -> Option<String>,
{
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing { name }),
    }
}

fn parse_url<F>(lookup: &F, name: &'static str, default: &str) -> ConfigResult<Url>
where
    F: Fn(&'static str) -> Option<String>,
{
    let raw = lookup(name).unwrap_or_else(|| default.to_string());
    raw.parse()
        .map_err(|err: url::ParseError| ConfigError::invalid(name, err.to_string()))
}

fn parse_num<F, T>(lookup: &F, name: &'static str, default: T) -> ConfigResult<T>
where
    F: Fn(&'static str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|err: T::Err| ConfigError::invalid(name, err.to_string())),
    }
}

fn nonzero_u32<F>(lookup: &F, name: &'static str, default: u32) -> ConfigResult<u32>
where
    F: Fn(&'static str) -> Option<String>,
{
    let value = parse_num(lookup, name, default)?;
    if value == 0 {
        return Err(ConfigError::invalid(name, "value must be greater than zero"));
    }
    Ok(value)
}

fn nonzero_usize<F>(lookup: &F, name: &'static str, default: usize) -> ConfigResult<usize>
where
    F: Fn(&'static str) -> Option<String>,
{
    let value = parse_num(lookup, name, default)?;
    if value == 0 {
        return Err(ConfigError::invalid(name, "value must be greater than zero"));
    }
    Ok(value)
}

fn secs<F>(lookup: &F, name: &'static str, default: u64) -> ConfigResult<Duration>
where
    F: Fn(&'static str) -> Option<String>,
{
    Ok(Duration::from_secs(parse_num(lookup, name, default)?))
}

fn millis<F>(lookup: &F, name: &'static str, default: u64) -> ConfigResult<Duration>
where
    F: Fn(&'static str) -> Option<String>,
{
    Ok(Duration::from_millis(parse_num(lookup, name, default)?))
}
