//! Runtime configuration.
//!
//! Settings come from an optional YAML file; every key has a default so an
//! empty (or absent) file yields a working configuration. CLI flags are
//! applied on top by `main`.
//!
//! ```yaml
//! output_dir: ./feed
//! interval_secs: 3600
//! run_timeout_secs: 1500
//! global_concurrency: 16
//! sources: [clarin, lanacion]
//! fetch:
//!   timeout_secs: 20
//!   max_attempts: 4
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument};

/// Upper bound for `dedup_retention_hours` (ten years).
pub const MAX_DEDUP_RETENTION_HOURS: u64 = 24 * 365 * 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory receiving dated feed files and `latest.json`.
    pub output_dir: PathBuf,
    /// Seconds between scheduled runs in daemon mode.
    pub interval_secs: u64,
    /// Hard ceiling for one run; in-flight work is cancelled when it elapses.
    pub run_timeout_secs: u64,
    /// Maximum fetches in flight across all sources.
    pub global_concurrency: usize,
    /// Maximum fetches in flight for a single source.
    pub per_source_concurrency: usize,
    pub max_candidates_per_source: usize,
    pub dedup_retention_hours: u64,
    /// Optional JSON file persisting the dedup index between processes.
    pub dedup_state: Option<PathBuf>,
    /// Restrict runs to these sources. Empty means every registered source.
    pub sources: Vec<String>,
    pub fetch: FetchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./feed"),
            interval_secs: 3600,
            run_timeout_secs: 1500,
            global_concurrency: 16,
            per_source_concurrency: 4,
            max_candidates_per_source: 100,
            dedup_retention_hours: 72,
            dedup_state: None,
            sources: Vec::new(),
            fetch: FetchConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_secs: u64,
    pub jitter_ms: u64,
    /// Per-host ceiling for hosts whose adapter does not set its own.
    pub host_concurrency: usize,
    pub min_request_interval_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: format!(
                "newswire_ingest/{} (+https://github.com/graves/newswire_ingest)",
                env!("CARGO_PKG_VERSION")
            ),
            timeout_secs: 20,
            max_attempts: 4,
            base_delay_ms: 500,
            max_delay_secs: 30,
            jitter_ms: 250,
            host_concurrency: 2,
            min_request_interval_ms: 1000,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }
}

impl Config {
    /// Load the YAML file at `path`, or defaults when no path is given.
    #[instrument(level = "info")]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                let config = Self::from_yaml(&text)?;
                info!(path = %path.display(), "Loaded configuration file");
                config
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let nonzero = [
            ("interval_secs", self.interval_secs),
            ("run_timeout_secs", self.run_timeout_secs),
            ("global_concurrency", self.global_concurrency as u64),
            ("per_source_concurrency", self.per_source_concurrency as u64),
            ("max_candidates_per_source", self.max_candidates_per_source as u64),
            ("dedup_retention_hours", self.dedup_retention_hours),
            ("fetch.timeout_secs", self.fetch.timeout_secs),
            ("fetch.max_attempts", self.fetch.max_attempts as u64),
            ("fetch.host_concurrency", self.fetch.host_concurrency as u64),
        ];
        if let Some((key, _)) = nonzero.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Invalid(format!("{key} must be greater than zero")));
        }
        if self.dedup_retention_hours > MAX_DEDUP_RETENTION_HOURS {
            return Err(ConfigError::Invalid(format!(
                "dedup_retention_hours must be at most {MAX_DEDUP_RETENTION_HOURS}"
            )));
        }
        if self.fetch.timeout_secs >= self.run_timeout_secs {
            return Err(ConfigError::Invalid(
                "fetch.timeout_secs must be shorter than run_timeout_secs".to_string(),
            ));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    /// Retention window of the dedup index, clamped to
    /// [`MAX_DEDUP_RETENTION_HOURS`].
    pub fn dedup_retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.dedup_retention_hours.min(MAX_DEDUP_RETENTION_HOURS) as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(Config::from_yaml("").unwrap(), Config::default());
        assert_eq!(Config::from_yaml("  \n").unwrap(), Config::default());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = Config::from_yaml(
            "output_dir: /srv/feed\nsources: [clarin]\nfetch:\n  max_attempts: 2\n",
        )
        .unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/srv/feed"));
        assert_eq!(config.sources, vec!["clarin".to_string()]);
        assert_eq!(config.fetch.max_attempts, 2);
        assert_eq!(config.fetch.timeout_secs, 20);
        assert_eq!(config.interval_secs, 3600);
        assert_eq!(config.dedup_retention(), chrono::Duration::hours(72));
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(matches!(
            Config::from_yaml("outptu_dir: x\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = Config {
            global_concurrency: 0,
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("global_concurrency"));
    }

    #[test]
    fn test_validate_rejects_fetch_timeout_beyond_run_timeout() {
        let mut config = Config::default();
        config.run_timeout_secs = 10;
        config.fetch.timeout_secs = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_huge_retention() {
        let config = Config {
            dedup_retention_hours: u64::MAX,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        assert_eq!(
            config.dedup_retention(),
            chrono::Duration::hours(MAX_DEDUP_RETENTION_HOURS as i64)
        );

        let config = Config {
            dedup_retention_hours: MAX_DEDUP_RETENTION_HOURS,
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Some(Path::new("/nonexistent/newswire.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "interval_secs: 600\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.interval(), Duration::from_secs(600));
    }
}
