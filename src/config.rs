//! Configuration file parser for ~/.config/reader-import/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde, but each one is logged as a warning
//! since it is most likely a typo.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::{FetchPolicy, SyncSettings};
use crate::util::HostPolicy;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Importer configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file. Defaults to `reader.db` next to the config file.
    pub database_path: Option<PathBuf>,

    /// Where zip members are extracted during an import (system temp if unset).
    pub temp_dir: Option<PathBuf>,

    /// Imports that may wait in the queue before `enqueue` blocks.
    pub queue_capacity: usize,

    /// Per-request timeout for feed downloads.
    pub fetch_timeout_secs: u64,

    pub max_feed_size_bytes: usize,

    /// Retries on 429, 5xx and truncated responses.
    pub max_retries: u32,

    /// Newest articles marked unread when a subscription is created.
    pub initial_unread_articles: usize,

    /// SEC-001: Allow feeds on loopback and private networks.
    pub allow_private_hosts: bool,

    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        let sync = SyncSettings::default();
        Self {
            database_path: None,
            temp_dir: None,
            queue_capacity: 8,
            fetch_timeout_secs: sync.fetch.timeout.as_secs(),
            max_feed_size_bytes: sync.fetch.max_bytes,
            max_retries: sync.fetch.max_retries,
            initial_unread_articles: sync.initial_unread_articles,
            allow_private_hosts: false,
            user_agent: sync.user_agent,
        }
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 9] = [
        "database_path",
        "temp_dir",
        "queue_capacity",
        "fetch_timeout_secs",
        "max_feed_size_bytes",
        "max_retries",
        "initial_unread_articles",
        "allow_private_hosts",
        "user_agent",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing or empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Settings for the HTTP feed synchronizer.
    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            fetch: FetchPolicy {
                timeout: Duration::from_secs(self.fetch_timeout_secs.max(1)),
                max_retries: self.max_retries,
                max_bytes: self.max_feed_size_bytes,
                ..FetchPolicy::default()
            },
            hosts: if self.allow_private_hosts {
                HostPolicy::AllowPrivate
            } else {
                HostPolicy::PublicOnly
            },
            initial_unread_articles: self.initial_unread_articles,
            user_agent: self.user_agent.clone(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
