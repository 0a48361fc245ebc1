//! Configuration management for the press release crawler
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::utils::retry::RetryPolicy;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Crawler configuration
    pub crawler: CrawlerConfig,

    /// Portal endpoints
    pub portal: PortalConfig,

    /// Output locations
    pub output: OutputConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Crawler-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Worker pool size per date
    pub workers: usize,

    /// Rate limit (requests per second) across all workers
    pub requests_per_second: u32,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Attempts per request, including the first
    pub max_attempts: u32,

    /// Base delay for rate-limit backoff
    pub base_delay_ms: u64,

    /// Cap on rate-limit backoff
    pub max_delay_ms: u64,

    /// Random jitter added to rate-limit backoff
    pub jitter_ms: u64,

    /// Delay range after other transient errors
    pub transient_delay_min_ms: u64,
    pub transient_delay_max_ms: u64,

    /// Randomized delay before every detail request
    pub pre_request_delay_min_ms: u64,
    pub pre_request_delay_max_ms: u64,

    /// Idle connections kept per host; sized at or above `workers`
    pub pool_max_idle_per_host: usize,

    /// The legacy archive serves an invalid certificate chain
    pub accept_invalid_certs: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            requests_per_second: 5,
            request_timeout_secs: 30,
            max_attempts: 3,
            base_delay_ms: 2000,
            max_delay_ms: 60_000,
            jitter_ms: 1000,
            transient_delay_min_ms: 1000,
            transient_delay_max_ms: 3000,
            pre_request_delay_min_ms: 100,
            pre_request_delay_max_ms: 500,
            pool_max_idle_per_host: 20,
            accept_invalid_certs: true,
        }
    }
}

/// Portal endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Legacy archive root
    pub legacy_base_url: String,

    /// Search page that hosts the callback
    pub legacy_search_path: String,

    /// Legacy detail (print view) endpoint
    pub legacy_print_url: String,

    /// Modern portal root
    pub modern_base_url: String,

    /// Date listing page
    pub listing_path: String,

    /// Modern detail page
    pub detail_path: String,

    /// Listing language code (1 = English)
    pub language: u32,

    /// Listing region code (3 = PIB Delhi)
    pub region: u32,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            legacy_base_url: String::from("https://archive.pib.gov.in/archive2/"),
            legacy_search_path: String::from("AdvSearch.aspx"),
            legacy_print_url: String::from("https://archive.pib.gov.in/newsite/PrintRelease.aspx"),
            modern_base_url: String::from("https://www.pib.gov.in/"),
            listing_path: String::from("AllRelease.aspx"),
            detail_path: String::from("PressReleasePage.aspx"),
            language: 1,
            region: 3,
        }
    }
}

impl PortalConfig {
    /// Point every endpoint at one host (used with mock servers)
    pub fn with_base(base: &str) -> Self {
        let base = if base.ends_with('/') {
            base.to_string()
        } else {
            format!("{base}/")
        };
        Self {
            legacy_base_url: format!("{base}archive2/"),
            legacy_print_url: format!("{base}newsite/PrintRelease.aspx"),
            modern_base_url: base,
            ..Default::default()
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Root directory for all exports
    pub dir: PathBuf,

    /// Consolidated JSON export file name inside `dir`
    pub consolidated_file: String,

    /// Optional SQLite database for tabular export
    pub sqlite: Option<PathBuf>,

    /// Directory for range checkpoints
    pub checkpoint_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            consolidated_file: String::from("extracted_data.json"),
            sqlite: None,
            checkpoint_dir: PathBuf::from("output/checkpoints"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

impl Config {
    /// Load configuration from environment variables on top of defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Override fields from `PIB_*` environment variables
    pub fn apply_env(&mut self) {
        if let Some(v) = env_parse("PIB_WORKERS") {
            self.crawler.workers = v;
        }
        if let Some(v) = env_parse("PIB_RATE_LIMIT") {
            self.crawler.requests_per_second = v;
        }
        if let Some(v) = env_parse("PIB_REQUEST_TIMEOUT") {
            self.crawler.request_timeout_secs = v;
        }
        if let Some(v) = env_parse("PIB_MAX_ATTEMPTS") {
            self.crawler.max_attempts = v;
        }
        if let Ok(v) = std::env::var("PIB_LEGACY_BASE_URL") {
            self.portal.legacy_base_url = v;
        }
        if let Ok(v) = std::env::var("PIB_MODERN_BASE_URL") {
            self.portal.modern_base_url = v;
        }
        if let Ok(v) = std::env::var("PIB_OUTPUT_DIR") {
            self.output.dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("PIB_SQLITE_PATH") {
            self.output.sqlite = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("PIB_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Ok(v) = std::env::var("PIB_LOG_FORMAT") {
            self.logging.format = v;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let c = &self.crawler;
        if c.workers == 0 {
            anyhow::bail!("workers must be greater than 0");
        }
        if c.requests_per_second == 0 {
            anyhow::bail!("requests_per_second must be positive");
        }
        if c.max_attempts == 0 {
            anyhow::bail!("max_attempts must be at least 1");
        }
        if c.pre_request_delay_min_ms > c.pre_request_delay_max_ms {
            anyhow::bail!("pre_request_delay_min_ms exceeds pre_request_delay_max_ms");
        }
        if c.transient_delay_min_ms > c.transient_delay_max_ms {
            anyhow::bail!("transient_delay_min_ms exceeds transient_delay_max_ms");
        }

        for (name, value) in [
            ("legacy_base_url", &self.portal.legacy_base_url),
            ("legacy_print_url", &self.portal.legacy_print_url),
            ("modern_base_url", &self.portal.modern_base_url),
        ] {
            Url::parse(value).with_context(|| format!("{name} is not a valid URL: {value}"))?;
        }

        Ok(())
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.crawler.request_timeout_secs)
    }

    /// Pre-request delay range
    #[must_use]
    pub fn pre_request_delay(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.crawler.pre_request_delay_min_ms),
            Duration::from_millis(self.crawler.pre_request_delay_max_ms),
        )
    }

    /// Retry policy shared by discovery and fetch
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        let c = &self.crawler;
        RetryPolicy {
            max_attempts: c.max_attempts,
            base_delay: Duration::from_millis(c.base_delay_ms),
            max_delay: Duration::from_millis(c.max_delay_ms),
            backoff_multiplier: 2.0,
            jitter: Duration::from_millis(c.jitter_ms),
            transient_min: Duration::from_millis(c.transient_delay_min_ms),
            transient_max: Duration::from_millis(c.transient_delay_max_ms),
        }
    }

    /// Configuration suited to tests against a local mock server
    pub fn for_mock_server(base: &str) -> Self {
        Self {
            crawler: CrawlerConfig {
                requests_per_second: 1000,
                request_timeout_secs: 5,
                base_delay_ms: 0,
                max_delay_ms: 0,
                jitter_ms: 0,
                transient_delay_min_ms: 0,
                transient_delay_max_ms: 0,
                pre_request_delay_min_ms: 0,
                pre_request_delay_max_ms: 0,
                ..Default::default()
            },
            portal: PortalConfig::with_base(base),
            ..Default::default()
        }
    }
}
