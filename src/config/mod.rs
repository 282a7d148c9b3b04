//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::infra::remote::Collection;

pub use cli::*;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "pulse";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_QUERY_LIMIT: usize = 256;
const DEFAULT_CONSUME_BATCH_LIMIT: usize = 100;
const DEFAULT_PAGE_SIZE: u32 = 10;
const DEFAULT_RECENT_LIMIT: u32 = 20;
const DEFAULT_USERS_LIMIT: u32 = 10;
const DEFAULT_SESSION_FILE: &str = ".pulse-session";

/// Fully resolved application settings.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub backend: BackendSettings,
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub feed: FeedSettings,
    pub session: SessionSettings,
}

#[derive(Debug, Clone)]
pub struct BackendSettings {
    /// Required by every command that reaches the backend.
    pub endpoint: Option<Url>,
    pub project_id: String,
    pub database_id: String,
    pub bucket_id: String,
    pub collections: CollectionIds,
    pub request_timeout: Duration,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            project_id: String::new(),
            database_id: String::new(),
            bucket_id: String::new(),
            collections: CollectionIds::default(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Backend collection ids, one per logical collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionIds {
    pub users: String,
    pub posts: String,
    pub saves: String,
    pub follows: String,
}

impl Default for CollectionIds {
    fn default() -> Self {
        Self {
            users: Collection::Users.as_str().to_string(),
            posts: Collection::Posts.as_str().to_string(),
            saves: Collection::Saves.as_str().to_string(),
            follows: Collection::Follows.as_str().to_string(),
        }
    }
}

impl CollectionIds {
    pub fn id(&self, collection: Collection) -> &str {
        match collection {
            Collection::Users => &self.users,
            Collection::Posts => &self.posts,
            Collection::Saves => &self.saves,
            Collection::Follows => &self.follows,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Compact,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub query_limit: NonZeroUsize,
    /// Zero means entries are stale as soon as they are stored.
    pub stale_time: Duration,
    pub consume_batch_limit: NonZeroUsize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            query_limit: NonZeroUsize::new(DEFAULT_QUERY_LIMIT).unwrap_or(NonZeroUsize::MIN),
            stale_time: Duration::ZERO,
            consume_batch_limit: NonZeroUsize::new(DEFAULT_CONSUME_BATCH_LIMIT)
                .unwrap_or(NonZeroUsize::MIN),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub page_size: NonZeroU32,
    pub recent_limit: NonZeroU32,
    pub users_limit: NonZeroU32,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            page_size: NonZeroU32::new(DEFAULT_PAGE_SIZE).unwrap_or(NonZeroU32::MIN),
            recent_limit: NonZeroU32::new(DEFAULT_RECENT_LIMIT).unwrap_or(NonZeroU32::MIN),
            users_limit: NonZeroU32::new(DEFAULT_USERS_LIMIT).unwrap_or(NonZeroU32::MIN),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub file: PathBuf,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            file: PathBuf::from(DEFAULT_SESSION_FILE),
        }
    }
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

    builder = builder.add_source(Environment::with_prefix("PULSE").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    backend: RawBackendSettings,
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    feed: RawFeedSettings,
    session: RawSessionSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(endpoint) = overrides.endpoint.as_ref() {
            self.backend.endpoint = Some(endpoint.clone());
        }
        if let Some(project) = overrides.project_id.as_ref() {
            self.backend.project_id = Some(project.clone());
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
        if let Some(file) = overrides.session_file.as_ref() {
            self.session.file = Some(file.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            backend,
            logging,
            cache,
            feed,
            session,
        } = raw;

        Ok(Self {
            backend: build_backend_settings(backend)?,
            logging: build_logging_settings(logging)?,
            cache: build_cache_settings(cache)?,
            feed: build_feed_settings(feed)?,
            session: build_session_settings(session)?,
        })
    }
}

fn build_backend_settings(backend: RawBackendSettings) -> Result<BackendSettings, LoadError> {
    let endpoint = match non_blank(backend.endpoint) {
        Some(value) => Some(
            Url::parse(&value)
                .map_err(|err| LoadError::invalid("backend.endpoint", err.to_string()))?,
        ),
        None => None,
    };

    let timeout_secs = backend
        .request_timeout_seconds
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "backend.request_timeout_seconds",
            "must be greater than zero",
        ));
    }

    let defaults = CollectionIds::default();
    let collections = CollectionIds {
        users: non_blank(backend.users_collection).unwrap_or(defaults.users),
        posts: non_blank(backend.posts_collection).unwrap_or(defaults.posts),
        saves: non_blank(backend.saves_collection).unwrap_or(defaults.saves),
        follows: non_blank(backend.follows_collection).unwrap_or(defaults.follows),
    };

    Ok(BackendSettings {
        endpoint,
        project_id: non_blank(backend.project_id).unwrap_or_default(),
        database_id: non_blank(backend.database_id).unwrap_or_default(),
        bucket_id: non_blank(backend.bucket_id).unwrap_or_default(),
        collections,
        request_timeout: Duration::from_secs(timeout_secs),
    })
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
    let query_limit = cache.query_limit.unwrap_or(DEFAULT_QUERY_LIMIT);
    let consume_batch_limit = cache
        .consume_batch_limit
        .unwrap_or(DEFAULT_CONSUME_BATCH_LIMIT);
    let consume_batch_limit = NonZeroUsize::new(consume_batch_limit).ok_or_else(|| {
        LoadError::invalid("cache.consume_batch_limit", "must be greater than zero")
    })?;

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        query_limit: NonZeroUsize::new(query_limit).unwrap_or(NonZeroUsize::MIN),
        stale_time: Duration::from_millis(cache.stale_time_ms.unwrap_or(0)),
        consume_batch_limit,
    })
}

fn build_feed_settings(feed: RawFeedSettings) -> Result<FeedSettings, LoadError> {
    Ok(FeedSettings {
        page_size: non_zero_u32(feed.page_size.unwrap_or(DEFAULT_PAGE_SIZE), "feed.page_size")?,
        recent_limit: non_zero_u32(
            feed.recent_limit.unwrap_or(DEFAULT_RECENT_LIMIT),
            "feed.recent_limit",
        )?,
        users_limit: non_zero_u32(
            feed.users_limit.unwrap_or(DEFAULT_USERS_LIMIT),
            "feed.users_limit",
        )?,
    })
}

fn build_session_settings(session: RawSessionSettings) -> Result<SessionSettings, LoadError> {
    let file = session
        .file
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SESSION_FILE));
    if file.as_os_str().is_empty() {
        return Err(LoadError::invalid("session.file", "path must not be empty"));
    }
    Ok(SessionSettings { file })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBackendSettings {
    endpoint: Option<String>,
    project_id: Option<String>,
    database_id: Option<String>,
    bucket_id: Option<String>,
    users_collection: Option<String>,
    posts_collection: Option<String>,
    saves_collection: Option<String>,
    follows_collection: Option<String>,
    request_timeout_seconds: Option<u64>,
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
    enabled: Option<bool>,
    query_limit: Option<usize>,
    stale_time_ms: Option<u64>,
    consume_batch_limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFeedSettings {
    page_size: Option<u32>,
    recent_limit: Option<u32>,
    users_limit: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSessionSettings {
    file: Option<PathBuf>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn non_zero_u32(value: u32, key: &'static str) -> Result<NonZeroU32, LoadError> {
    NonZeroU32::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
