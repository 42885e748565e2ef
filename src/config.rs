//! Configuration for modelops components.

use crate::drift::DriftBackend;
use crate::error::{ModelOpsError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelOpsConfig {
    /// Version catalog configuration.
    pub catalog: CatalogConfig,
    /// Prediction logger configuration.
    pub logger: LoggerConfig,
    /// Model monitor configuration.
    pub monitor: MonitorConfig,
    /// Observability configuration.
    pub observability: ObservabilityConfig,
}

impl ModelOpsConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ModelOpsError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| ModelOpsError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.logger.buffer_size == 0 {
            return Err(ModelOpsError::InvalidConfig {
                field: "logger.buffer_size".to_string(),
                reason: "buffer size must be non-zero".to_string(),
            });
        }
        if self.monitor.history_capacity == 0 {
            return Err(ModelOpsError::InvalidConfig {
                field: "monitor.history_capacity".to_string(),
                reason: "history capacity must be non-zero".to_string(),
            });
        }
        if !(0.0..1.0).contains(&self.monitor.drift_significance)
            || self.monitor.drift_significance == 0.0
        {
            return Err(ModelOpsError::InvalidConfig {
                field: "monitor.drift_significance".to_string(),
                reason: "significance must be within (0, 1)".to_string(),
            });
        }
        if self.catalog.promotion_metric.is_empty() {
            return Err(ModelOpsError::InvalidConfig {
                field: "catalog.promotion_metric".to_string(),
                reason: "promotion metric must be named".to_string(),
            });
        }
        Ok(())
    }

    /// Create a minimal development configuration rooted at `./modelops`.
    pub fn development() -> Self {
        Self {
            catalog: CatalogConfig {
                store_path: PathBuf::from("./modelops/versions.json"),
                ..Default::default()
            },
            logger: LoggerConfig {
                log_dir: PathBuf::from("./modelops/predictions"),
                buffer_size: 10,
            },
            monitor: MonitorConfig::default(),
            observability: ObservabilityConfig {
                log_level: "debug".to_string(),
                json_logs: false,
                metrics_enabled: false,
                ..Default::default()
            },
        }
    }
}

/// Version catalog configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Path of the versions-store document.
    pub store_path: PathBuf,
    /// Timeout applied around store writes; a timeout is treated like any
    /// other non-fatal persistence failure.
    #[serde(with = "humantime_serde")]
    pub persist_timeout: Duration,
    /// How many newest versions retention keeps un-archived.
    pub keep_latest: usize,
    /// Whether retention spares the current production version.
    pub keep_production: bool,
    /// Metric gating promotion decisions.
    pub promotion_metric: String,
    /// Minimum improvement required to promote.
    pub promotion_threshold: f64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("/var/lib/modelops/versions.json"),
            persist_timeout: Duration::from_secs(5),
            keep_latest: 5,
            keep_production: true,
            promotion_metric: "accuracy".to_string(),
            promotion_threshold: 0.01,
        }
    }
}

/// Prediction logger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Directory holding one append-only JSONL file per UTC day.
    pub log_dir: PathBuf,
    /// In-memory buffer capacity; reaching it triggers a flush within the
    /// logging call.
    pub buffer_size: usize,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("/var/log/modelops/predictions"),
            buffer_size: 100,
        }
    }
}

/// Model monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Bounded performance-history capacity (oldest evicted).
    pub history_capacity: usize,
    /// Drift-detection backend.
    pub drift_backend: DriftBackend,
    /// Rejection level for p-value-producing drift backends.
    pub drift_significance: f64,
    /// Window size for performance averages and trends.
    pub performance_window: usize,
    /// Latest accuracy below this is a degraded condition.
    pub accuracy_floor: f64,
    /// A declining accuracy trend larger than this is a warning.
    pub trend_change_warning: f64,
    /// P95 prediction latency above this (ms) is a warning.
    pub latency_p95_warning_ms: f64,
    /// How many recent logged predictions the latency check samples.
    pub latency_sample: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            history_capacity: 1000,
            drift_backend: DriftBackend::Ks,
            drift_significance: 0.05,
            performance_window: 100,
            accuracy_floor: 0.7,
            trend_change_warning: 0.05,
            latency_p95_warning_ms: 1000.0,
            latency_sample: 100,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Default log level when `RUST_LOG` is unset.
    pub log_level: String,
    /// Emit JSON-formatted logs.
    pub json_logs: bool,
    /// Whether to install the Prometheus metrics recorder.
    pub metrics_enabled: bool,
    /// Address the Prometheus scrape endpoint binds to.
    pub metrics_addr: SocketAddr,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
            metrics_addr: "0.0.0.0:9090".parse().expect("valid socket address"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(ModelOpsConfig::default().validate().is_ok());
        assert!(ModelOpsConfig::development().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_buffer() {
        let mut config = ModelOpsConfig::default();
        config.logger.buffer_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_significance() {
        let mut config = ModelOpsConfig::default();
        config.monitor.drift_significance = 1.5;
        assert!(config.validate().is_err());
        config.monitor.drift_significance = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = ModelOpsConfig::development();
        let json = serde_json::to_string(&config).unwrap();
        let back: ModelOpsConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.catalog.keep_latest, config.catalog.keep_latest);
        assert_eq!(back.logger.buffer_size, config.logger.buffer_size);
        assert_eq!(back.monitor.drift_backend, config.monitor.drift_backend);
    }
}
