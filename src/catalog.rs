//! Version catalog: ordered model versions with durable best-effort storage,
//! promotion decisions, and retention policy.
//!
//! The in-memory ordered list is authoritative for the process; persistence
//! is best-effort. A store write failure or timeout is logged and absorbed,
//! never surfaced to the caller.

use crate::config::CatalogConfig;
use crate::error::{ModelOpsError, Result};
use crate::metadata::{ModelVersion, Stage};
use crate::version::{ChangeType, Version};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Durable backend for the versions document.
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Load all versions. A missing document is an empty catalog, not an
    /// error; a corrupt one is an error the catalog tolerates on open.
    async fn load(&self) -> Result<Vec<ModelVersion>>;
    /// Rewrite the full document.
    async fn save(&self, versions: &[ModelVersion]) -> Result<()>;
}

/// Serialized form of the versions store.
#[derive(Serialize, Deserialize)]
struct VersionsDocument {
    versions: Vec<ModelVersion>,
    updated_at: DateTime<Utc>,
}

/// Single-JSON-document store on the filesystem.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl VersionStore for JsonFileStore {
    async fn load(&self) -> Result<Vec<ModelVersion>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let document: VersionsDocument = serde_json::from_str(&content)?;
        Ok(document.versions)
    }

    async fn save(&self, versions: &[ModelVersion]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let document = VersionsDocument {
            versions: versions.to_vec(),
            updated_at: Utc::now(),
        };
        let content = serde_json::to_vec_pretty(&document)?;
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }
}

/// In-memory store for tests, with a switch to simulate write failures.
#[derive(Default)]
pub struct MemoryStore {
    inner: std::sync::Mutex<Vec<ModelVersion>>,
    fail_writes: std::sync::atomic::AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `save` fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// The last successfully saved document.
    pub fn saved(&self) -> Vec<ModelVersion> {
        self.inner.lock().expect("store lock poisoned").clone()
    }
}

#[async_trait]
impl VersionStore for MemoryStore {
    async fn load(&self) -> Result<Vec<ModelVersion>> {
        Ok(self.inner.lock().expect("store lock poisoned").clone())
    }

    async fn save(&self, versions: &[ModelVersion]) -> Result<()> {
        if self.fail_writes.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(ModelOpsError::Storage(
                "simulated write failure".to_string(),
            ));
        }
        *self.inner.lock().expect("store lock poisoned") = versions.to_vec();
        Ok(())
    }
}

/// Per-metric side of a version comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricComparison {
    pub a: f64,
    pub b: f64,
    /// `a - b`.
    pub diff: f64,
    /// `diff / b * 100`. When `b` is exactly `0` this reports `0`, which can
    /// mask an improvement from zero; kept for parity with the reasoning
    /// behind the diff field and documented rather than corrected.
    pub pct_change: f64,
}

/// Result of comparing two versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionComparison {
    /// Whether `a` outranks `b` by version precedence. Independent of which
    /// side has better metrics.
    pub newer: bool,
    pub metrics: HashMap<String, MetricComparison>,
}

const DEFAULT_COMPARISON_METRICS: &[&str] = &["accuracy", "precision", "recall", "f1_score"];

/// Ordered collection of model versions, newest first.
pub struct VersionCatalog {
    config: CatalogConfig,
    versions: RwLock<Vec<ModelVersion>>,
    store: Arc<dyn VersionStore>,
}

impl VersionCatalog {
    /// Open a catalog backed by the configured JSON document.
    pub async fn open(config: CatalogConfig) -> Self {
        let store = Arc::new(JsonFileStore::new(config.store_path.clone()));
        Self::with_store(config, store).await
    }

    /// Open a catalog over an explicit store. A load failure (corrupt
    /// document) starts an empty catalog rather than failing.
    pub async fn with_store(config: CatalogConfig, store: Arc<dyn VersionStore>) -> Self {
        let mut versions = match store.load().await {
            Ok(versions) => versions,
            Err(e) => {
                warn!(error = %e, "Failed to load versions store; starting with an empty catalog");
                Vec::new()
            }
        };
        versions.sort_by(|a, b| b.version.cmp(&a.version));

        Self {
            config,
            versions: RwLock::new(versions),
            store,
        }
    }

    /// Register a version. Idempotent: an entry equal by version precedence
    /// already in the catalog makes this a no-op. Returns whether the entry
    /// was inserted. Persistence failures are logged, never raised.
    pub async fn register_version(&self, entry: ModelVersion) -> bool {
        let mut versions = self.versions.write().await;
        if versions.iter().any(|e| e.version == entry.version) {
            debug!(version = %entry.version, "Version already registered; skipping");
            return false;
        }
        info!(version = %entry.version, "Registering model version");
        versions.push(entry);
        versions.sort_by(|a, b| b.version.cmp(&a.version));
        self.persist(&versions).await;
        true
    }

    /// Newest version matching the filters.
    pub async fn get_latest_version(
        &self,
        stage: Option<Stage>,
        stable_only: bool,
    ) -> Option<ModelVersion> {
        self.versions
            .read()
            .await
            .iter()
            .find(|entry| {
                if stable_only && !entry.version.is_stable() {
                    return false;
                }
                match stage {
                    Some(stage) => entry.stage() == Some(stage),
                    None => true,
                }
            })
            .cloned()
    }

    /// Newest version currently in production.
    pub async fn get_production_version(&self) -> Option<ModelVersion> {
        self.get_latest_version(Some(Stage::Production), false).await
    }

    /// Decide whether `candidate` should replace `current` (or, when
    /// `current` is `None`, the resolved production version). Pure and
    /// deterministic in its inputs; no side effects.
    pub async fn should_promote(
        &self,
        candidate: &ModelVersion,
        current: Option<&ModelVersion>,
        metric_name: &str,
        threshold: f64,
    ) -> (bool, String) {
        let resolved = match current {
            Some(current) => Some(current.clone()),
            None => self.get_production_version().await,
        };

        let current = match resolved {
            Some(current) => current,
            None => return (true, "no current production model".to_string()),
        };

        if !candidate.has_metrics() {
            return (false, "new version has no metrics".to_string());
        }
        if !current.has_metrics() {
            return (true, "current version has no metrics".to_string());
        }

        let new_value = candidate.primary_metric(metric_name);
        let current_value = current.primary_metric(metric_name);
        let improvement = new_value - current_value;

        if improvement >= threshold {
            (
                true,
                format!(
                    "{} improved by {:.4} (new: {:.4}, current: {:.4}), meeting threshold {}",
                    metric_name, improvement, new_value, current_value, threshold
                ),
            )
        } else {
            (
                false,
                format!(
                    "{} improvement {:.4} (new: {:.4}, current: {:.4}) below threshold {}",
                    metric_name, improvement, new_value, current_value, threshold
                ),
            )
        }
    }

    /// Promotion decision using the configured metric and threshold.
    pub async fn evaluate_promotion(&self, candidate: &ModelVersion) -> (bool, String) {
        self.should_promote(
            candidate,
            None,
            &self.config.promotion_metric,
            self.config.promotion_threshold,
        )
        .await
    }

    /// Promote a registered version to production, archiving whichever
    /// entry held production before it. The entry must exist and carry
    /// metadata; the lifecycle state machine still applies.
    pub async fn promote_version(&self, version: &Version) -> Result<ModelVersion> {
        let mut versions = self.versions.write().await;

        let index = versions
            .iter()
            .position(|entry| &entry.version == version)
            .ok_or_else(|| {
                ModelOpsError::Validation(format!("version {} is not registered", version))
            })?;

        {
            let metadata = versions[index].metadata.as_mut().ok_or_else(|| {
                ModelOpsError::Validation(format!(
                    "version {} has no metadata to promote",
                    version
                ))
            })?;
            metadata.advance_stage(Stage::Production)?;
        }

        for (i, entry) in versions.iter_mut().enumerate() {
            if i == index {
                continue;
            }
            if let Some(metadata) = entry.metadata.as_mut() {
                if metadata.stage == Stage::Production {
                    // previous production entry steps aside
                    let _ = metadata.advance_stage(Stage::Archived);
                }
            }
        }

        info!(version = %version, "Promoted model version to production");
        let promoted = versions[index].clone();
        self.persist(&versions).await;
        Ok(promoted)
    }

    /// Next version number: `1.0.0` for an empty catalog with no base,
    /// otherwise a bump of `base` (default: the catalog's newest version).
    pub async fn auto_version(&self, base: Option<&Version>, change: ChangeType) -> Version {
        if let Some(base) = base {
            return base.bump(change);
        }
        match self.versions.read().await.first() {
            Some(latest) => latest.version.bump(change),
            None => Version::new(1, 0, 0),
        }
    }

    /// Ordered (newest-first) view of the catalog. Never mutates.
    pub async fn get_version_history(
        &self,
        limit: Option<usize>,
        stage: Option<Stage>,
    ) -> Vec<ModelVersion> {
        let versions = self.versions.read().await;
        let mut history: Vec<ModelVersion> = versions
            .iter()
            .filter(|entry| match stage {
                Some(stage) => entry.stage() == Some(stage),
                None => true,
            })
            .cloned()
            .collect();
        if let Some(limit) = limit {
            history.truncate(limit);
        }
        history
    }

    /// Look up an entry by version precedence.
    pub async fn find_version(&self, version: &Version) -> Option<ModelVersion> {
        self.versions
            .read()
            .await
            .iter()
            .find(|entry| &entry.version == version)
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.versions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.versions.read().await.is_empty()
    }

    /// Compare two entries: precedence plus per-metric values, diff, and
    /// percentage change. An empty metric list uses the standard set.
    pub fn compare_versions(
        a: &ModelVersion,
        b: &ModelVersion,
        metric_names: &[&str],
    ) -> VersionComparison {
        let names = if metric_names.is_empty() {
            DEFAULT_COMPARISON_METRICS
        } else {
            metric_names
        };

        let mut metrics = HashMap::new();
        for name in names {
            let value_a = a.primary_metric(name);
            let value_b = b.primary_metric(name);
            let diff = value_a - value_b;
            let pct_change = if value_b == 0.0 {
                0.0
            } else {
                diff / value_b * 100.0
            };
            metrics.insert(
                name.to_string(),
                MetricComparison {
                    a: value_a,
                    b: value_b,
                    diff,
                    pct_change,
                },
            );
        }

        VersionComparison {
            newer: a.version > b.version,
            metrics,
        }
    }

    /// Archive entries beyond the `keep_latest` newest, sparing the current
    /// production version when `keep_production` is set. Returns the number
    /// of entries archived.
    pub async fn archive_old_versions(&self, keep_latest: usize, keep_production: bool) -> usize {
        let mut versions = self.versions.write().await;
        let mut archived = 0usize;

        for entry in versions.iter_mut().skip(keep_latest) {
            let Some(metadata) = entry.metadata.as_mut() else {
                continue;
            };
            if metadata.stage.is_terminal() {
                continue;
            }
            if keep_production && metadata.stage == Stage::Production {
                continue;
            }
            if metadata.advance_stage(Stage::Archived).is_ok() {
                archived += 1;
            }
        }

        if archived > 0 {
            info!(archived, keep_latest, "Archived old model versions");
            self.persist(&versions).await;
        }
        archived
    }

    /// Archive using the configured retention policy.
    pub async fn apply_retention(&self) -> usize {
        self.archive_old_versions(self.config.keep_latest, self.config.keep_production)
            .await
    }

    /// Best-effort full rewrite of the versions document. Held under the
    /// writer's critical section so concurrent mutations cannot interleave
    /// a stale snapshot.
    async fn persist(&self, versions: &[ModelVersion]) {
        let write = self.store.save(versions);
        match tokio::time::timeout(self.config.persist_timeout, write).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(error = %e, "Failed to persist version catalog; in-memory state remains authoritative");
            }
            Err(_) => {
                error!(
                    timeout = ?self.config.persist_timeout,
                    "Version catalog persist timed out; in-memory state remains authoritative"
                );
            }
        }
    }
}
