//! modelops: model lifecycle management and production observability.
//!
//! The crate covers the operational half of a machine-learning system: which
//! model versions exist and which one serves traffic, what those models
//! predicted, and whether they are still behaving.
//!
//! ```text
//!                       +------------------+
//!                       |  VersionCatalog  |  register / promote / archive
//!                       +--------+---------+
//!                                | versions.json
//!                                v
//!   predictions --> +------------------+      +---------------+
//!                   | PredictionLogger | ---> | day JSONL logs|
//!                   +--------+---------+      +---------------+
//!                            | recent records / statistics
//!                            v
//!                   +------------------+
//!                   |   ModelMonitor   |  drift / performance / health
//!                   +------------------+
//! ```
//!
//! # Example
//!
//! ```no_run
//! use modelops::{
//!     CatalogConfig, ModelMetadata, ModelMetrics, ModelVersion, Version, VersionCatalog,
//! };
//!
//! # async fn example() -> modelops::Result<()> {
//! let catalog = VersionCatalog::open(CatalogConfig::default()).await;
//!
//! let version = Version::parse("1.2.0")?;
//! let metadata = ModelMetadata::new("churn", &version, "sklearn")
//!     .with_metrics(ModelMetrics::new().with_accuracy(0.92))?;
//! catalog
//!     .register_version(ModelVersion::new(version).with_metadata(metadata))
//!     .await;
//!
//! let latest = catalog.get_latest_version(None, true).await;
//! # let _ = latest;
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod drift;
pub mod error;
pub mod logger;
pub mod metadata;
pub mod monitor;
pub mod observability;
pub mod stats;
pub mod version;

pub use catalog::{
    JsonFileStore, MemoryStore, MetricComparison, VersionCatalog, VersionComparison, VersionStore,
};
pub use config::{
    CatalogConfig, LoggerConfig, ModelOpsConfig, MonitorConfig, ObservabilityConfig,
};
pub use drift::{DataSnapshot, DriftBackend, DriftDetector, DriftReport, DriftTest};
pub use error::{ModelOpsError, Result};
pub use logger::{
    DescriptiveStats, PredictionBuilder, PredictionLogger, PredictionRecord, PredictionStatistics,
};
pub use metadata::{ModelMetadata, ModelMetrics, ModelVersion, Stage};
pub use monitor::{
    HealthReport, HealthStatus, ModelMonitor, MonitorRegistry, MonitoringReport,
    PerformanceSnapshot, PerformanceWindow, Trend, TrendDirection,
};
pub use observability::{MetricsSink, NoopSink, PrometheusSink};
pub use version::{ChangeType, Version};
