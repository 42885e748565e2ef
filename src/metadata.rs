//! Model metadata: evaluation metrics, lifecycle stage, and provenance.

use crate::error::{ModelOpsError, Result};
use crate::version::Version;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Lifecycle stage of a model version.
///
/// `Archived` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Freshly trained, not yet vetted.
    Development,
    /// Candidate under evaluation.
    Staging,
    /// Actively serving traffic.
    Production,
    /// Superseded or evicted by retention policy.
    Archived,
    /// Training or deployment failed.
    Failed,
}

impl Stage {
    /// Whether no further transitions are allowed from this stage.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Archived | Stage::Failed)
    }

    /// Check the lifecycle state machine.
    ///
    /// Any non-terminal stage may fail; any non-terminal stage may be
    /// archived by retention policy; promotion runs
    /// `Development -> Staging -> Production`, with the staging step
    /// optional for serving layers that deploy directly.
    pub fn can_transition_to(&self, to: Stage) -> bool {
        if self.is_terminal() || *self == to {
            return false;
        }
        match to {
            Stage::Failed | Stage::Archived => true,
            Stage::Staging => *self == Stage::Development,
            Stage::Production => matches!(self, Stage::Development | Stage::Staging),
            Stage::Development => false,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Development => "development",
            Stage::Staging => "staging",
            Stage::Production => "production",
            Stage::Archived => "archived",
            Stage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Evaluation metrics attached to a model version.
///
/// Rate-like fields are constrained to `[0, 1]`; `log_loss` and the timing
/// fields are unconstrained non-negative. All values, including custom
/// ones, must be finite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recall: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub f1_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roc_auc: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_loss: Option<f64>,
    /// Wall-clock training time in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub training_time_secs: Option<f64>,
    /// Mean single-inference latency in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inference_time_ms: Option<f64>,
    /// Open-ended custom measures.
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub custom: HashMap<String, f64>,
}

impl ModelMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accuracy(mut self, value: f64) -> Self {
        self.accuracy = Some(value);
        self
    }

    pub fn with_precision(mut self, value: f64) -> Self {
        self.precision = Some(value);
        self
    }

    pub fn with_recall(mut self, value: f64) -> Self {
        self.recall = Some(value);
        self
    }

    pub fn with_f1_score(mut self, value: f64) -> Self {
        self.f1_score = Some(value);
        self
    }

    pub fn with_roc_auc(mut self, value: f64) -> Self {
        self.roc_auc = Some(value);
        self
    }

    pub fn with_log_loss(mut self, value: f64) -> Self {
        self.log_loss = Some(value);
        self
    }

    pub fn with_custom(mut self, name: impl Into<String>, value: f64) -> Self {
        self.custom.insert(name.into(), value);
        self
    }

    /// Whether no measure of any kind is set.
    pub fn is_empty(&self) -> bool {
        self.accuracy.is_none()
            && self.precision.is_none()
            && self.recall.is_none()
            && self.f1_score.is_none()
            && self.roc_auc.is_none()
            && self.log_loss.is_none()
            && self.training_time_secs.is_none()
            && self.inference_time_ms.is_none()
            && self.custom.is_empty()
    }

    /// Validate value ranges. Rate fields must be within `[0, 1]`; the
    /// unbounded fields and every custom value must be finite and
    /// non-negative where a negative value is meaningless.
    pub fn validate(&self) -> Result<()> {
        let bounded = [
            ("accuracy", self.accuracy),
            ("precision", self.precision),
            ("recall", self.recall),
            ("f1_score", self.f1_score),
            ("roc_auc", self.roc_auc),
        ];
        for (name, value) in bounded {
            if let Some(v) = value {
                if !v.is_finite() || !(0.0..=1.0).contains(&v) {
                    return Err(ModelOpsError::MetricOutOfRange {
                        name: name.to_string(),
                        value: v,
                        reason: "must be within [0, 1]".to_string(),
                    });
                }
            }
        }
        let non_negative = [
            ("log_loss", self.log_loss),
            ("training_time_secs", self.training_time_secs),
            ("inference_time_ms", self.inference_time_ms),
        ];
        for (name, value) in non_negative {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(ModelOpsError::MetricOutOfRange {
                        name: name.to_string(),
                        value: v,
                        reason: "must be a non-negative finite number".to_string(),
                    });
                }
            }
        }
        for (name, v) in &self.custom {
            if !v.is_finite() {
                return Err(ModelOpsError::MetricOutOfRange {
                    name: name.clone(),
                    value: *v,
                    reason: "custom metrics must be finite numbers".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Resolve a metric by name: standard fields first, then the custom
    /// mapping. Unknown or unset names resolve to `0.0`; never fails.
    pub fn primary_metric(&self, name: &str) -> f64 {
        let standard = match name {
            "accuracy" => self.accuracy,
            "precision" => self.precision,
            "recall" => self.recall,
            "f1_score" => self.f1_score,
            "roc_auc" => self.roc_auc,
            "log_loss" => self.log_loss,
            "training_time_secs" | "training_time" => self.training_time_secs,
            "inference_time_ms" | "inference_time" => self.inference_time_ms,
            _ => None,
        };
        standard
            .or_else(|| self.custom.get(name).copied())
            .unwrap_or(0.0)
    }
}

/// Full metadata record for a trained model artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Logical model identifier (shared across versions).
    pub model_id: String,
    /// Canonical version string this record belongs to.
    pub version: String,
    /// Training framework (e.g. "sklearn", "xgboost").
    pub framework: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    /// Location of the serialized model artifact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,
    /// Artifact size in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub training_dataset_size: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub training_features: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub target_classes: Vec<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub hyperparameters: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub metrics: ModelMetrics,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trained_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployed_at: Option<DateTime<Utc>>,
    pub stage: Stage,
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub tags: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Version string this model was derived from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_version: Option<String>,
    /// Opaque pointer at an external experiment-tracking run. Stored
    /// verbatim, never interpreted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provenance_reference: Option<String>,
}

impl ModelMetadata {
    /// Create a new record in `Development`.
    pub fn new(
        model_id: impl Into<String>,
        version: &Version,
        framework: impl Into<String>,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            version: version.to_string(),
            framework: framework.into(),
            algorithm: None,
            model_path: None,
            model_size_bytes: None,
            training_dataset_size: None,
            training_features: Vec::new(),
            target_classes: Vec::new(),
            hyperparameters: HashMap::new(),
            metrics: ModelMetrics::default(),
            created_at: Utc::now(),
            trained_at: None,
            deployed_at: None,
            stage: Stage::Development,
            tags: HashMap::new(),
            description: None,
            parent_version: None,
            provenance_reference: None,
        }
    }

    /// Attach validated metrics.
    pub fn with_metrics(mut self, metrics: ModelMetrics) -> Result<Self> {
        metrics.validate()?;
        self.metrics = metrics;
        Ok(self)
    }

    pub fn with_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.algorithm = Some(algorithm.into());
        self
    }

    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(path.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_hyperparameter(
        mut self,
        name: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        self.hyperparameters.insert(name.into(), value);
        self
    }

    pub fn with_training_features(mut self, features: Vec<String>) -> Self {
        self.training_features = features;
        self
    }

    pub fn with_target_classes(mut self, classes: Vec<String>) -> Self {
        self.target_classes = classes;
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_parent_version(mut self, parent: &Version) -> Self {
        self.parent_version = Some(parent.to_string());
        self
    }

    pub fn with_provenance_reference(mut self, reference: impl Into<String>) -> Self {
        self.provenance_reference = Some(reference.into());
        self
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }

    /// Move to a new lifecycle stage, enforcing the state machine.
    /// Promotion to `Production` stamps `deployed_at`.
    pub fn advance_stage(&mut self, to: Stage) -> Result<()> {
        if !self.stage.can_transition_to(to) {
            return Err(ModelOpsError::InvalidStageTransition {
                from: self.stage.to_string(),
                to: to.to_string(),
            });
        }
        if to == Stage::Production {
            self.deployed_at = Some(Utc::now());
        }
        self.stage = to;
        Ok(())
    }
}

/// A catalog entry: a version plus its optional metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelVersion {
    #[serde(flatten)]
    pub version: Version,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ModelMetadata>,
}

impl ModelVersion {
    pub fn new(version: Version) -> Self {
        Self {
            version,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: ModelMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Lifecycle stage, if metadata is attached.
    pub fn stage(&self) -> Option<Stage> {
        self.metadata.as_ref().map(|m| m.stage)
    }

    /// Attached metrics, if any measure is set.
    pub fn metrics(&self) -> Option<&ModelMetrics> {
        self.metadata
            .as_ref()
            .map(|m| &m.metrics)
            .filter(|m| !m.is_empty())
    }

    /// Whether the entry carries any usable metric.
    pub fn has_metrics(&self) -> bool {
        self.metrics().is_some()
    }

    /// Resolve a metric by name, defaulting to `0.0`.
    pub fn primary_metric(&self, name: &str) -> f64 {
        self.metrics()
            .map(|m| m.primary_metric(name))
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_machine() {
        assert!(Stage::Development.can_transition_to(Stage::Staging));
        assert!(Stage::Development.can_transition_to(Stage::Production));
        assert!(Stage::Staging.can_transition_to(Stage::Production));
        assert!(Stage::Production.can_transition_to(Stage::Archived));
        assert!(Stage::Development.can_transition_to(Stage::Failed));
        assert!(Stage::Development.can_transition_to(Stage::Archived));

        // terminal stages
        assert!(!Stage::Archived.can_transition_to(Stage::Production));
        assert!(!Stage::Failed.can_transition_to(Stage::Development));
        // no demotion back to development
        assert!(!Stage::Production.can_transition_to(Stage::Development));
    }

    #[test]
    fn test_metrics_validation_bounds() {
        assert!(ModelMetrics::new().with_accuracy(0.9).validate().is_ok());
        assert!(ModelMetrics::new().with_accuracy(1.5).validate().is_err());
        assert!(ModelMetrics::new().with_precision(-0.1).validate().is_err());
        assert!(ModelMetrics::new().with_log_loss(3.2).validate().is_ok());
        assert!(ModelMetrics::new().with_log_loss(-1.0).validate().is_err());
        assert!(ModelMetrics::new()
            .with_custom("lift", f64::NAN)
            .validate()
            .is_err());
        assert!(ModelMetrics::new()
            .with_custom("lift", 2.4)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_primary_metric_resolution() {
        let metrics = ModelMetrics::new()
            .with_accuracy(0.91)
            .with_custom("business_kpi", 0.42);

        assert_eq!(metrics.primary_metric("accuracy"), 0.91);
        assert_eq!(metrics.primary_metric("business_kpi"), 0.42);
        // unknown and unset names never fail
        assert_eq!(metrics.primary_metric("f1_score"), 0.0);
        assert_eq!(metrics.primary_metric("nonexistent"), 0.0);
    }

    #[test]
    fn test_metadata_lifecycle() {
        let version = Version::new(1, 0, 0);
        let mut meta = ModelMetadata::new("churn", &version, "sklearn")
            .with_algorithm("random_forest")
            .with_provenance_reference("mlflow://runs/abc123");

        assert_eq!(meta.stage, Stage::Development);
        assert!(meta.deployed_at.is_none());

        meta.advance_stage(Stage::Staging).unwrap();
        meta.advance_stage(Stage::Production).unwrap();
        assert_eq!(meta.stage, Stage::Production);
        assert!(meta.deployed_at.is_some());

        meta.advance_stage(Stage::Archived).unwrap();
        let err = meta.advance_stage(Stage::Production).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_with_metrics_validates() {
        let version = Version::new(1, 0, 0);
        let bad = ModelMetrics::new().with_accuracy(7.0);
        assert!(ModelMetadata::new("m", &version, "sklearn")
            .with_metrics(bad)
            .is_err());
    }

    #[test]
    fn test_model_version_metric_access() {
        let version = Version::new(1, 1, 0);
        let meta = ModelMetadata::new("churn", &version, "sklearn")
            .with_metrics(ModelMetrics::new().with_accuracy(0.88))
            .unwrap();
        let entry = ModelVersion::new(version).with_metadata(meta);

        assert!(entry.has_metrics());
        assert_eq!(entry.primary_metric("accuracy"), 0.88);
        assert_eq!(entry.stage(), Some(Stage::Development));

        let bare = ModelVersion::new(Version::new(2, 0, 0));
        assert!(!bare.has_metrics());
        assert_eq!(bare.primary_metric("accuracy"), 0.0);
    }

    #[test]
    fn test_entry_serialization_flattens_version() {
        let entry = ModelVersion::new(Version::parse("1.2.0-beta+b1").unwrap());
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["version"], "1.2.0-beta+b1");
        assert_eq!(json["major"], 1);
        assert_eq!(json["minor"], 2);
        assert_eq!(json["prerelease"], "beta");
        assert!(json.get("metadata").is_none());

        let back: ModelVersion = serde_json::from_value(json).unwrap();
        assert_eq!(back.version, entry.version);
    }
}
