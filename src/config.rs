//! TOML configuration for the dispatcher and its collaborators.
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8080"
//!
//! [app]
//! environment = "prod"
//! debug = false
//!
//! [storage]
//! documents_bucket = "documents"
//! staging_bucket = "documents-staging"
//!
//! [notify]
//! provider = "http"
//! address = "https://queue.example.com/websocket"
//!
//! [search]
//! provider = "typesense"
//! host = "http://localhost:8108"
//! api_key = "xyz"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Logs raw events and envelopes at debug level.
    #[serde(default)]
    pub debug: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            debug: false,
        }
    }
}

fn default_environment() -> String {
    "dev".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    /// `eventSource` value of queued messages routed to the index synchronizer.
    #[serde(default = "default_event_source")]
    pub event_source: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            event_source: default_event_source(),
        }
    }
}

fn default_event_source() -> String {
    "aws:sqs".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotifyConfig {
    #[serde(default = "default_memory_provider")]
    pub provider: String,
    /// Topic or queue address notifications are published to.
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            provider: default_memory_provider(),
            address: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub documents_bucket: String,
    pub staging_bucket: String,
    #[serde(default = "default_object_url_base")]
    pub object_url_base: String,
}

fn default_object_url_base() -> String {
    "https://objects.local".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_memory_provider")]
    pub provider: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: default_memory_provider(),
            host: None,
            api_key: None,
            max_results: default_max_results(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_memory_provider() -> String {
    "memory".to_string()
}
fn default_max_results() -> usize {
    10
}
fn default_timeout_secs() -> u64 {
    10
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parses and validates TOML configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.storage.documents_bucket.trim().is_empty() {
        anyhow::bail!("storage.documents_bucket must not be empty");
    }
    if config.storage.staging_bucket.trim().is_empty() {
        anyhow::bail!("storage.staging_bucket must not be empty");
    }

    if config.queue.event_source.trim().is_empty() {
        anyhow::bail!("queue.event_source must not be empty");
    }

    if config.search.max_results == 0 {
        anyhow::bail!("search.max_results must be >= 1");
    }

    match config.search.provider.as_str() {
        "memory" => {}
        "typesense" => {
            if config.search.host.as_deref().map_or(true, str::is_empty) {
                anyhow::bail!("search.host must be specified when provider is 'typesense'");
            }
            if config.search.api_key.as_deref().map_or(true, str::is_empty) {
                anyhow::bail!("search.api_key must be specified when provider is 'typesense'");
            }
        }
        other => anyhow::bail!(
            "Unknown search provider: '{}'. Must be memory or typesense.",
            other
        ),
    }

    match config.notify.provider.as_str() {
        "memory" => {}
        "http" => {
            if config.notify.address.as_deref().map_or(true, str::is_empty) {
                anyhow::bail!("notify.address must be specified when provider is 'http'");
            }
        }
        other => anyhow::bail!(
            "Unknown notify provider: '{}'. Must be memory or http.",
            other
        ),
    }

    Ok(())
}
