//! Configuration file parser for `rss-scraper.toml`.
//!
//! Unlike most settings files the config is required: there is nothing to
//! poll without one. Keys not listed here are logged as a warning and ignored.
use serde::Deserialize;
use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::matcher::{PatternError, PatternSet};
use crate::poller::{PollerSettings, RetryPolicy};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid feed URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

// ============================================================================
// Configuration Struct
// ============================================================================

/// Application configuration, immutable once loaded.
///
/// All fields use `#[serde(default)]`; missing keys fall back to
/// `Default::default()`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Seconds between poll cycles. 0 = default (60).
    pub wait_interval: u64,

    /// SQLite database file, or `:memory:`.
    pub db_path: String,

    /// Feeds to poll, one poller each.
    pub urls: Vec<String>,

    /// Regex patterns, in evaluation order.
    pub patterns: Vec<String>,

    /// Bound for the result channel. Unset = unbounded.
    pub channel_capacity: Option<usize>,

    /// LRU bound for each poller's dedup filter. Unset = remember everything.
    pub dedup_capacity: Option<usize>,

    pub request_timeout_secs: u64,

    /// Fetch retries per cycle before a poller gives up.
    pub max_retries: u32,

    /// First retry delay; doubles per retry, capped at 60s.
    pub retry_delay_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wait_interval: Self::DEFAULT_WAIT_INTERVAL,
            db_path: "db.sqlite3".to_string(),
            urls: Vec::new(),
            patterns: Vec::new(),
            channel_capacity: None,
            dedup_capacity: None,
            request_timeout_secs: 30,
            max_retries: 3,
            retry_delay_secs: 2,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const DEFAULT_WAIT_INTERVAL: u64 = 60;

    const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

    const KNOWN_KEYS: [&'static str; 9] = [
        "wait_interval",
        "db_path",
        "urls",
        "patterns",
        "channel_capacity",
        "dedup_capacity",
        "request_timeout_secs",
        "max_retries",
        "retry_delay_secs",
    ];

    /// Load and validate configuration from a TOML file.
    ///
    /// - Missing file → `Err(ConfigError::Io)`
    /// - Invalid TOML or wrong value types → `Err(ConfigError::Parse)`
    /// - Non-http(s) feed URL → `Err(ConfigError::InvalidUrl)`
    /// - Pattern that does not compile → `Err(ConfigError::Pattern)`
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading to prevent memory exhaustion
        let meta = std::fs::metadata(path)?;
        if meta.len() > Self::MAX_FILE_SIZE {
            return Err(ConfigError::TooLarge(format!(
                "Config file is {} bytes (max {} bytes)",
                meta.len(),
                Self::MAX_FILE_SIZE
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;

        tracing::info!(
            path = %path.display(),
            feeds = config.urls.len(),
            patterns = config.patterns.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parse and validate configuration text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        // Parse as a raw table first to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for url in &self.urls {
            validate_feed_url(url)?;
        }
        self.pattern_set()?;

        if self.channel_capacity == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "channel_capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.dedup_capacity == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "dedup_capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "request_timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }

        if self.urls.is_empty() {
            tracing::warn!("No feed URLs configured, nothing will be polled");
        }
        if self.patterns.is_empty() {
            tracing::warn!("No patterns configured, no item will ever match");
        }
        Ok(())
    }

    /// Poll interval, with 0 meaning the default.
    pub fn poll_interval(&self) -> Duration {
        let secs = if self.wait_interval == 0 {
            Self::DEFAULT_WAIT_INTERVAL
        } else {
            self.wait_interval
        };
        Duration::from_secs(secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poller_settings(&self) -> PollerSettings {
        PollerSettings {
            interval: self.poll_interval(),
            retry: RetryPolicy {
                max_retries: self.max_retries,
                initial_delay: Duration::from_secs(self.retry_delay_secs),
                max_delay: Self::MAX_RETRY_DELAY,
            },
            dedup_capacity: self.dedup_capacity.and_then(NonZeroUsize::new),
        }
    }

    /// Compile the configured patterns, in order, duplicates dropped.
    pub fn pattern_set(&self) -> Result<PatternSet, ConfigError> {
        Ok(PatternSet::compile(&self.patterns)?)
    }
}

fn validate_feed_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme {scheme} (only http/https allowed)"),
        }),
    }
}

// ============================================================================
// Tests
// ============================================================================
