//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{collections::HashMap, net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::warming::Priority;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "veduta";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_TTL_SECONDS: u64 = 120;
const DEFAULT_REPROBE_INTERVAL_SECONDS: u64 = 30;
const DEFAULT_WARMING_INTERVAL_SECONDS: u64 = 60;
const DEFAULT_TIER_PAUSE_MS: u64 = 500;
const DEFAULT_STEP_DELAY_MS: u64 = 200;
const DEFAULT_PRODUCER_TIMEOUT_SECONDS: u64 = 30;

/// Command-line arguments for the Veduta binary.
#[derive(Debug, Parser)]
#[command(name = "veduta", version, about = "Veduta dashboard server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "VEDUTA_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct Overrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the Redis connection URL for the cache backend.
    #[arg(long = "redis-url", value_name = "URL")]
    pub redis_url: Option<String>,

    /// Override the warming cycle interval.
    #[arg(long = "warming-interval-seconds", value_name = "SECONDS")]
    pub warming_interval_seconds: Option<u64>,

    /// Override the issue tracker base URL.
    #[arg(long = "tracker-base-url", value_name = "URL")]
    pub tracker_base_url: Option<String>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub warming: WarmingSettings,
    pub tracker: TrackerSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Networked backend; `None` runs on the in-memory store only.
    pub redis_url: Option<String>,
    pub ttl_short: Duration,
    pub ttl_medium: Duration,
    pub ttl_long: Duration,
    pub ttl_extended: Duration,
    pub reprobe_interval: Duration,
    pub enable_response_cache: bool,
}

#[derive(Debug, Clone)]
pub struct WarmingSettings {
    pub enabled: bool,
    pub interval: Duration,
    pub tier_pause: Duration,
    pub step_delay: Duration,
    pub producer_timeout: Duration,
    /// Per-view priority assignments overriding the built-in tiers.
    pub priorities: HashMap<String, Priority>,
}

#[derive(Debug, Clone)]
pub struct TrackerSettings {
    pub base_url: Url,
    pub project: String,
    pub username: Option<String>,
    pub token: Option<String>,
    /// Account that files automation-triaged bugs.
    pub reporter: String,
    /// Engineers whose triage annotations are counted.
    pub triage_users: Vec<String>,
    /// Labels aggregated by the bug-areas view.
    pub area_labels: Vec<String>,
    /// Release the bug-areas view is scoped to.
    pub area_version: String,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("VEDUTA").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    warming: RawWarmingSettings,
    tracker: RawTrackerSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    redis_url: Option<String>,
    ttl_short_seconds: Option<u64>,
    ttl_medium_seconds: Option<u64>,
    ttl_long_seconds: Option<u64>,
    ttl_extended_seconds: Option<u64>,
    reprobe_interval_seconds: Option<u64>,
    enable_response_cache: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawWarmingSettings {
    enabled: Option<bool>,
    interval_seconds: Option<u64>,
    tier_pause_ms: Option<u64>,
    step_delay_ms: Option<u64>,
    producer_timeout_seconds: Option<u64>,
    priorities: HashMap<String, Priority>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawTrackerSettings {
    base_url: Option<String>,
    project: Option<String>,
    username: Option<String>,
    token: Option<String>,
    reporter: Option<String>,
    triage_users: Vec<String>,
    area_labels: Vec<String>,
    area_version: Option<String>,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.redis_url.as_ref() {
            self.cache.redis_url = Some(url.clone());
        }
        if let Some(seconds) = overrides.warming_interval_seconds {
            self.warming.interval_seconds = Some(seconds);
        }
        if let Some(url) = overrides.tracker_base_url.as_ref() {
            self.tracker.base_url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            cache,
            warming,
            tracker,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            cache: build_cache_settings(cache)?,
            warming: build_warming_settings(warming)?,
            tracker: build_tracker_settings(tracker)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = format!("{host}:{port}")
        .parse::<SocketAddr>()
        .map_err(|err| LoadError::invalid("server.addr", err.to_string()))?;

    Ok(ServerSettings { addr })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let redis_url = cache.redis_url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let ttl = |key: &'static str, value: Option<u64>| -> Result<Duration, LoadError> {
        let seconds = value.unwrap_or(DEFAULT_TTL_SECONDS);
        if seconds == 0 {
            return Err(LoadError::invalid(key, "must be greater than zero"));
        }
        Ok(Duration::from_secs(seconds))
    };

    let reprobe_seconds = cache
        .reprobe_interval_seconds
        .unwrap_or(DEFAULT_REPROBE_INTERVAL_SECONDS);
    if reprobe_seconds == 0 {
        return Err(LoadError::invalid(
            "cache.reprobe_interval_seconds",
            "must be greater than zero",
        ));
    }

    Ok(CacheSettings {
        redis_url,
        ttl_short: ttl("cache.ttl_short_seconds", cache.ttl_short_seconds)?,
        ttl_medium: ttl("cache.ttl_medium_seconds", cache.ttl_medium_seconds)?,
        ttl_long: ttl("cache.ttl_long_seconds", cache.ttl_long_seconds)?,
        ttl_extended: ttl("cache.ttl_extended_seconds", cache.ttl_extended_seconds)?,
        reprobe_interval: Duration::from_secs(reprobe_seconds),
        enable_response_cache: cache.enable_response_cache.unwrap_or(true),
    })
}

fn build_warming_settings(warming: RawWarmingSettings) -> Result<WarmingSettings, LoadError> {
    let interval_seconds = warming
        .interval_seconds
        .unwrap_or(DEFAULT_WARMING_INTERVAL_SECONDS);
    if interval_seconds == 0 {
        return Err(LoadError::invalid(
            "warming.interval_seconds",
            "must be greater than zero",
        ));
    }

    let timeout_seconds = warming
        .producer_timeout_seconds
        .unwrap_or(DEFAULT_PRODUCER_TIMEOUT_SECONDS);
    if timeout_seconds == 0 {
        return Err(LoadError::invalid(
            "warming.producer_timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(WarmingSettings {
        enabled: warming.enabled.unwrap_or(true),
        interval: Duration::from_secs(interval_seconds),
        tier_pause: Duration::from_millis(warming.tier_pause_ms.unwrap_or(DEFAULT_TIER_PAUSE_MS)),
        step_delay: Duration::from_millis(warming.step_delay_ms.unwrap_or(DEFAULT_STEP_DELAY_MS)),
        producer_timeout: Duration::from_secs(timeout_seconds),
        priorities: warming.priorities,
    })
}

fn build_tracker_settings(tracker: RawTrackerSettings) -> Result<TrackerSettings, LoadError> {
    let base_url = tracker
        .base_url
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| LoadError::invalid("tracker.base_url", "must be set"))?;
    let base_url = Url::parse(base_url)
        .map_err(|err| LoadError::invalid("tracker.base_url", err.to_string()))?;

    let project = tracker
        .project
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| LoadError::invalid("tracker.project", "must be set"))?
        .to_string();

    Ok(TrackerSettings {
        base_url,
        project,
        username: tracker.username,
        token: tracker.token,
        reporter: tracker.reporter.unwrap_or_else(|| "automation".to_string()),
        triage_users: tracker.triage_users,
        area_labels: tracker.area_labels,
        area_version: tracker.area_version.unwrap_or_default(),
    })
}
