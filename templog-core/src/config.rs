//! Configuration management.

use crate::error::{Result, TemplogError};
use crate::ingest::DEFAULT_QUEUE_CAPACITY;
use crate::paths;
use crate::store::StoreOptions;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Runtime configuration for the ingestion daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub db_path: PathBuf,
    pub watch_dirs: Vec<PathBuf>,
    pub queue_capacity: usize,
    /// Import files already present in the watched directories at startup
    pub scan_existing: bool,
    pub log_level: String,
    /// Prometheus listener; metrics are not exported when unset
    pub metrics_addr: Option<SocketAddr>,
    pub busy_timeout_ms: u64,
    pub max_read_connections: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: paths::db_path(),
            watch_dirs: Vec::new(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            scan_existing: false,
            log_level: "info".to_string(),
            metrics_addr: None,
            busy_timeout_ms: 5000,
            max_read_connections: 4,
        }
    }
}

impl Config {
    /// Load configuration from `path`. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| TemplogError::InvalidConfig {
            reason: format!("Failed to read config {}: {}", path.display(), e),
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            TemplogError::InvalidConfig {
                reason: format!("Failed to parse config {}: {}", path.display(), e),
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the daemon cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(TemplogError::InvalidConfig {
                reason: "queue_capacity must be at least 1".to_string(),
            });
        }
        if self.max_read_connections == 0 {
            return Err(TemplogError::InvalidConfig {
                reason: "max_read_connections must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
            max_connections: self.max_read_connections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.queue_capacity, 10);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"db_path": "/var/lib/templog/t.db", "watch_dirs": ["/srv/logs"], "metrics_addr": "127.0.0.1:9100"}"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/var/lib/templog/t.db"));
        assert_eq!(config.watch_dirs, vec![PathBuf::from("/srv/logs")]);
        assert_eq!(config.metrics_addr, Some("127.0.0.1:9100".parse().unwrap()));
        assert_eq!(config.log_level, "info");
        assert_eq!(config.store_options().busy_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Config::load(&path), Err(TemplogError::InvalidConfig { .. })));

        std::fs::write(&path, r#"{"queue_capacity": 0}"#).unwrap();
        assert!(matches!(Config::load(&path), Err(TemplogError::InvalidConfig { .. })));
    }
}
