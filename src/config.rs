//! Runtime configuration for paging-list.
//!
//! Configuration can be loaded from a JSON file or constructed programmatically.
//! Provider knobs (page size, range window) and the demo
//! source settings live here.

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

/// Items per page used when nothing else is configured.
pub const DEFAULT_PAGE_SIZE: usize = 25;

/// Maximum number of item loads awaited together by a range load.
pub const DEFAULT_RANGE_WINDOW: usize = 16;

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "paging-list", about = "Drive a paging list provider over a simulated source")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// Position the initial bulk load must cover.
    #[arg(long, default_value_t = 0)]
    pub load_to: usize,

    /// First position of the range to load after initialization.
    #[arg(long, default_value_t = 0)]
    pub first: usize,

    /// Last position (inclusive) of the range to load after initialization.
    #[arg(long)]
    pub last: Option<usize>,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Provider configuration.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Simulated source configuration (demo binary only).
    #[serde(default)]
    pub source: SourceConfig,
}

/// Paging provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Items per page. Fixed for the lifetime of a provider.
    pub page_size: usize,

    /// Width of the concurrent window used by range loads.
    pub range_window: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            range_window: DEFAULT_RANGE_WINDOW,
        }
    }
}

/// Settings for the in-memory simulated source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Length of the simulated remote list.
    pub total_items: usize,

    /// Delay applied to every fetch, in milliseconds.
    pub latency_ms: u64,

    /// Number of initial fetches that fail.
    pub fail_first: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            total_items: 260,
            latency_ms: 20,
            fail_first: 0,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.provider.page_size, 25);
        assert_eq!(cfg.provider.range_window, 16);
        assert_eq!(cfg.source.fail_first, 0);
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"provider":{"page_size":10}}"#).unwrap();

        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.provider.page_size, 10);
        assert_eq!(cfg.provider.range_window, DEFAULT_RANGE_WINDOW);
        assert_eq!(cfg.source.total_items, 260);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(cfg.provider.page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_load_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(Config::load(&path).is_err());
    }
}
