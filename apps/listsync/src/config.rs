//! Process configuration read from environment variables.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use listsync_feed::{FeedResult, ParserOptions, VideoCatalog};
use listsync_reconcile::EngineConfig;
use listsync_target::{RateLimitConfig, RetryConfig, WebflowConfig, DEFAULT_API_BASE};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => Err(format!("expected json or pretty, got {other}")),
        }
    }
}

/// Configuration for the listsync binary.
#[derive(Clone)]
pub struct AppConfig {
    /// Listing feed URL.
    pub xml_endpoint: String,

    /// Webflow API token.
    pub webflow_token: String,

    /// Webflow collection id.
    pub collection_id: String,

    /// Postgres URL for the mapping store.
    pub database_url: Option<String>,

    /// Sentinel asking price meaning "price on application".
    pub poa_value: Option<u64>,

    /// Sentinel asking price meaning "coming soon".
    pub cs_value: Option<u64>,

    /// JSON file mapping source ids to video URLs.
    pub video_listings_file: Option<PathBuf>,

    pub webflow_api_base: String,

    pub feed_timeout_secs: u64,

    /// Timeout for one HTTP request to Webflow.
    pub request_timeout_secs: u64,

    pub rate_limit_rps: u32,

    pub rate_limit_max_concurrent: u32,

    pub max_retries: u32,

    pub engine: EngineConfig,

    pub log_format: LogFormat,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("xml_endpoint", &self.xml_endpoint)
            .field("webflow_token", &"[REDACTED]")
            .field("collection_id", &self.collection_id)
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("poa_value", &self.poa_value)
            .field("cs_value", &self.cs_value)
            .field("video_listings_file", &self.video_listings_file)
            .field("webflow_api_base", &self.webflow_api_base)
            .field("feed_timeout_secs", &self.feed_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("rate_limit_rps", &self.rate_limit_rps)
            .field("rate_limit_max_concurrent", &self.rate_limit_max_concurrent)
            .field("max_retries", &self.max_retries)
            .field("engine", &self.engine)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_reader(|key| std::env::var(key))
    }

    /// Load configuration from a custom variable reader.
    ///
    /// Tests supply variables through this without touching the process
    /// environment.
    pub fn from_reader<F>(reader: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let xml_endpoint = required(&reader, "XML_ENDPOINT")?;
        let webflow_token = required(&reader, "WEBFLOW_TOKEN")?;
        let collection_id = required(&reader, "WF_COLLECTION")?;
        let database_url = reader("DATABASE_URL").ok().filter(|v| !v.trim().is_empty());

        let poa_value = parse_optional(&reader, "POA_VALUE")?;
        let cs_value = parse_optional(&reader, "CS_VALUE")?;
        let video_listings_file = reader("VIDEO_LISTINGS_FILE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let webflow_api_base =
            reader("WEBFLOW_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());

        let max_delete_fraction: f64 = parse_or(&reader, "MAX_DELETE_FRACTION", 0.5)?;
        if !(0.0..=1.0).contains(&max_delete_fraction) {
            return Err(ConfigError::InvalidValue(
                "MAX_DELETE_FRACTION".into(),
                "must be between 0 and 1".into(),
            ));
        }

        let apply_concurrency: usize = parse_or(&reader, "APPLY_CONCURRENCY", 4)?;
        if apply_concurrency == 0 {
            return Err(ConfigError::InvalidValue(
                "APPLY_CONCURRENCY".into(),
                "must be at least 1".into(),
            ));
        }

        let min_deletes_allowed = parse_or(&reader, "MIN_DELETES_ALLOWED", 1)?;
        let persist_retries = parse_or(&reader, "PERSIST_RETRIES", 2)?;
        let target_timeout_secs: Option<u64> = parse_optional(&reader, "TARGET_TIMEOUT_SECS")?;
        let list_timeout_secs: u64 = parse_or(&reader, "LIST_TIMEOUT_SECS", 1800)?;
        let persistence_timeout_secs: u64 = parse_or(&reader, "PERSISTENCE_TIMEOUT_SECS", 10)?;
        let time_budget_secs: Option<u64> = parse_optional(&reader, "TIME_BUDGET_SECS")?;
        let adopt_existing = parse_or(&reader, "ADOPT_EXISTING", true)?;

        let mut engine = EngineConfig::default()
            .with_max_delete_fraction(max_delete_fraction)
            .with_min_deletes_allowed(min_deletes_allowed)
            .with_apply_concurrency(apply_concurrency)
            .with_persist_retries(persist_retries)
            .with_list_timeout(Duration::from_secs(list_timeout_secs))
            .with_persistence_timeout(Duration::from_secs(persistence_timeout_secs))
            .with_adopt_existing(adopt_existing);
        if let Some(secs) = time_budget_secs {
            engine = engine.with_time_budget(Duration::from_secs(secs));
        }

        let mut config = Self {
            xml_endpoint,
            webflow_token,
            collection_id,
            database_url,
            poa_value,
            cs_value,
            video_listings_file,
            webflow_api_base,
            feed_timeout_secs: parse_or(&reader, "FEED_TIMEOUT_SECS", 30)?,
            request_timeout_secs: parse_or(&reader, "REQUEST_TIMEOUT_SECS", 30)?,
            rate_limit_rps: parse_or(&reader, "RATE_LIMIT_RPS", 1)?,
            rate_limit_max_concurrent: parse_or(&reader, "RATE_LIMIT_MAX_CONCURRENT", 4)?,
            max_retries: parse_or(&reader, "MAX_RETRIES", 5)?,
            engine,
            log_format: parse_or(&reader, "LOG_FORMAT", LogFormat::Json)?,
        };

        // Unless set, an item call may take as long as the client's retries.
        let target_timeout = target_timeout_secs
            .map_or_else(|| config.webflow_config().call_budget(), Duration::from_secs);
        config.engine = config.engine.with_target_timeout(target_timeout);
        Ok(config)
    }

    /// Database URL, required by commands that touch the mapping store.
    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".into()))
    }

    #[must_use]
    pub fn feed_timeout(&self) -> Duration {
        Duration::from_secs(self.feed_timeout_secs)
    }

    /// Parser options, loading the video catalog when one is configured.
    pub fn parser_options(&self) -> FeedResult<ParserOptions> {
        let mut options = ParserOptions::default();
        if let Some(value) = self.poa_value {
            options = options.with_poa_value(value);
        }
        if let Some(value) = self.cs_value {
            options = options.with_coming_soon_value(value);
        }
        if let Some(path) = &self.video_listings_file {
            options = options.with_videos(VideoCatalog::from_path(path)?);
        }
        Ok(options)
    }

    #[must_use]
    pub fn webflow_config(&self) -> WebflowConfig {
        WebflowConfig::new(self.webflow_token.clone(), self.collection_id.clone())
            .with_api_base(self.webflow_api_base.clone())
            .with_rate_limit(
                RateLimitConfig::new(self.rate_limit_rps)
                    .with_max_in_flight(self.rate_limit_max_concurrent),
            )
            .with_retry(RetryConfig::new(self.max_retries))
            .with_timeout_secs(self.request_timeout_secs)
    }
}

fn required<F>(reader: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    match reader(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingVar(key.into())),
    }
}

fn parse_optional<F, T>(reader: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match reader(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue(key.into(), e.to_string())),
        _ => Ok(None),
    }
}

fn parse_or<F, T>(reader: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
    T: FromStr,
    T::Err: fmt::Display,
{
    Ok(parse_optional(reader, key)?.unwrap_or(default))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}
