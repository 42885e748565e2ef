//! Model monitoring: data drift, performance tracking, and health checks.
//!
//! A [`ModelMonitor`] owns a bounded performance history and an optional
//! reference dataset per model, and reads recent prediction telemetry from
//! the shared [`PredictionLogger`]. Severity combines worst-wins: a degraded
//! condition is never masked by a later, milder finding.

use crate::config::MonitorConfig;
use crate::drift::{
    detector_for, DataSnapshot, DriftDetector, DriftReport, DriftedFeature, KsDetector,
};
use crate::error::{ModelOpsError, Result};
use crate::logger::{PredictionLogger, PredictionStatistics};
use crate::observability::{MetricsSink, NoopSink};
use crate::stats;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// Health of a monitored model, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Degraded,
}

impl HealthStatus {
    /// Worst-wins combination. `Degraded` dominates `Warning` dominates
    /// `Healthy`, regardless of the order findings arrive in.
    pub fn combine(self, other: HealthStatus) -> HealthStatus {
        self.max(other)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "warning",
            HealthStatus::Degraded => "degraded",
        };
        f.write_str(s)
    }
}

/// Outcome of a health check: overall severity plus every finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    /// All findings, not just the worst one.
    pub issues: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

/// One recorded evaluation of the model against ground truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub timestamp: DateTime<Utc>,
    pub metrics: HashMap<String, f64>,
    pub sample_count: usize,
}

/// Direction of a metric trend over the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
}

/// A metric's movement between the older and newer halves of the window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trend {
    pub direction: TrendDirection,
    /// Mean of the newer half minus mean of the older half.
    pub change: f64,
}

/// Windowed view of the performance history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceWindow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest: Option<PerformanceSnapshot>,
    /// Configured window size.
    pub window: usize,
    /// Snapshots actually present in the window.
    pub samples: usize,
    pub averages: HashMap<String, f64>,
    /// Per-metric trends; absent below four samples.
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub trends: HashMap<String, Trend>,
}

/// Full monitoring report bundling health, performance, and prediction
/// statistics for the trailing week.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringReport {
    pub id: String,
    pub model_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub health: HealthReport,
    pub performance: PerformanceWindow,
    pub prediction_stats: PredictionStatistics,
}

const STABLE_TREND_EPSILON: f64 = 0.01;

/// Monitor for one model.
pub struct ModelMonitor {
    model_name: String,
    model_version: Option<String>,
    config: MonitorConfig,
    history: RwLock<VecDeque<PerformanceSnapshot>>,
    reference: RwLock<Option<DataSnapshot>>,
    detector: Box<dyn DriftDetector>,
    logger: Arc<PredictionLogger>,
    sink: Arc<dyn MetricsSink>,
}

impl ModelMonitor {
    pub fn new(
        model_name: impl Into<String>,
        config: MonitorConfig,
        logger: Arc<PredictionLogger>,
    ) -> Self {
        let detector = detector_for(config.drift_backend);
        Self {
            model_name: model_name.into(),
            model_version: None,
            config,
            history: RwLock::new(VecDeque::new()),
            reference: RwLock::new(None),
            detector,
            logger,
            sink: Arc::new(NoopSink),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.model_version = Some(version.into());
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Store the reference dataset drift checks compare against.
    pub async fn set_reference_data(&self, snapshot: DataSnapshot) {
        info!(
            model = %self.model_name,
            features = snapshot.len(),
            "Reference data set"
        );
        *self.reference.write().await = Some(snapshot);
    }

    /// Test the current dataset for drift against `reference` (or the
    /// stored reference). Missing reference data yields a not-applicable
    /// report, never an error; a backend failure on a feature falls back to
    /// the KS test for that feature.
    pub async fn detect_data_drift(
        &self,
        current: &DataSnapshot,
        reference: Option<&DataSnapshot>,
    ) -> DriftReport {
        let stored = self.reference.read().await;
        let reference = match reference.or(stored.as_ref()) {
            Some(reference) => reference,
            None => return DriftReport::not_applicable("no reference data available"),
        };

        let significance = self.config.drift_significance;
        let mut drifted_features = Vec::new();
        let mut features_checked = 0usize;

        for name in reference.column_names() {
            let (Some(ref_col), Some(cur_col)) = (reference.column(name), current.column(name))
            else {
                continue;
            };
            features_checked += 1;

            let test = match self.detector.test(ref_col, cur_col, significance) {
                Ok(test) => test,
                Err(e) => {
                    warn!(
                        model = %self.model_name,
                        feature = name,
                        detector = self.detector.name(),
                        error = %e,
                        "Drift backend failed; falling back to KS"
                    );
                    match KsDetector.test(ref_col, cur_col, significance) {
                        Ok(test) => test,
                        Err(e) => {
                            warn!(
                                model = %self.model_name,
                                feature = name,
                                error = %e,
                                "Skipping feature in drift check"
                            );
                            continue;
                        }
                    }
                }
            };

            if test.drifted {
                drifted_features.push(DriftedFeature {
                    feature: name.to_string(),
                    statistic: test.statistic,
                    p_value: test.p_value,
                });
            }
        }

        let drift_detected = !drifted_features.is_empty();
        if drift_detected {
            self.sink.record_drift(&self.model_name);
            warn!(
                model = %self.model_name,
                features = ?drifted_features.iter().map(|f| f.feature.as_str()).collect::<Vec<_>>(),
                "Data drift detected"
            );
        }

        DriftReport {
            drift_detected,
            detector: self.detector.name().to_string(),
            drifted_features,
            features_checked,
            timestamp: Utc::now(),
            error: None,
        }
    }

    /// Evaluate predictions against ground truth and append a snapshot to
    /// the bounded history. Extra precomputed metrics (e.g. regression
    /// measures) merge into the snapshot and win on name collisions.
    pub async fn track_performance<T: Eq + Hash>(
        &self,
        y_true: &[T],
        y_pred: &[T],
        precomputed: Option<HashMap<String, f64>>,
    ) -> Result<PerformanceSnapshot> {
        if y_true.len() != y_pred.len() {
            return Err(ModelOpsError::Validation(format!(
                "label count mismatch: {} true vs {} predicted",
                y_true.len(),
                y_pred.len()
            )));
        }
        if y_true.is_empty() {
            return Err(ModelOpsError::Validation(
                "cannot track performance on an empty evaluation".to_string(),
            ));
        }

        let mut metrics = classification_metrics(y_true, y_pred);
        if let Some(extra) = precomputed {
            metrics.extend(extra);
        }

        if let Some(accuracy) = metrics.get("accuracy") {
            self.sink.record_accuracy(&self.model_name, *accuracy);
        }

        let snapshot = PerformanceSnapshot {
            timestamp: Utc::now(),
            metrics,
            sample_count: y_true.len(),
        };

        let mut history = self.history.write().await;
        while history.len() >= self.config.history_capacity {
            history.pop_front();
        }
        history.push_back(snapshot.clone());

        Ok(snapshot)
    }

    /// Averages and trends over the most recent configured window.
    pub async fn performance_window(&self) -> PerformanceWindow {
        let history = self.history.read().await;
        let start = history.len().saturating_sub(self.config.performance_window);
        let window: Vec<&PerformanceSnapshot> = history.iter().skip(start).collect();

        let mut series: HashMap<&str, Vec<f64>> = HashMap::new();
        for snapshot in &window {
            for (name, value) in &snapshot.metrics {
                series.entry(name).or_default().push(*value);
            }
        }

        let averages = series
            .iter()
            .map(|(name, values)| (name.to_string(), stats::mean(values)))
            .collect();

        let mut trends = HashMap::new();
        for (name, values) in &series {
            if values.len() >= 4 {
                trends.insert(name.to_string(), trend_of(values));
            }
        }

        PerformanceWindow {
            latest: window.last().map(|s| (*s).clone()),
            window: self.config.performance_window,
            samples: window.len(),
            averages,
            trends,
        }
    }

    /// Run all health checks and combine severities worst-wins. Every
    /// finding is reported, not just the decisive one.
    pub async fn check_health(&self) -> HealthReport {
        let mut status = HealthStatus::Healthy;
        let mut issues = Vec::new();

        let window = self.performance_window().await;

        if let Some(latest) = &window.latest {
            if let Some(accuracy) = latest.metrics.get("accuracy") {
                if *accuracy < self.config.accuracy_floor {
                    status = status.combine(HealthStatus::Degraded);
                    issues.push(format!(
                        "accuracy {:.4} below floor {:.4}",
                        accuracy, self.config.accuracy_floor
                    ));
                }
            }
        }

        if let Some(trend) = window.trends.get("accuracy") {
            if trend.direction == TrendDirection::Declining
                && trend.change.abs() > self.config.trend_change_warning
            {
                status = status.combine(HealthStatus::Warning);
                issues.push(format!(
                    "accuracy declining: change of {:.4} over the window",
                    trend.change
                ));
            }
        }

        let recent = self
            .logger
            .get_recent_predictions(Some(&self.model_name), None, self.config.latency_sample)
            .await;
        let latencies: Vec<f64> = recent.iter().filter_map(|r| r.prediction_time_ms).collect();
        if !latencies.is_empty() {
            let p95 = stats::percentile(&stats::sorted(&latencies), 0.95);
            if p95 > self.config.latency_p95_warning_ms {
                status = status.combine(HealthStatus::Warning);
                issues.push(format!(
                    "p95 prediction latency {:.1}ms above {:.1}ms",
                    p95, self.config.latency_p95_warning_ms
                ));
            }
        }

        HealthReport {
            status,
            issues,
            checked_at: Utc::now(),
        }
    }

    /// Bundle health, windowed performance, and the trailing week of
    /// prediction statistics into one report.
    pub async fn generate_report(&self) -> MonitoringReport {
        let start = (Utc::now() - Duration::days(7)).date_naive();
        let prediction_stats = self
            .logger
            .get_prediction_statistics(&self.model_name, start, None)
            .await;

        MonitoringReport {
            id: Uuid::new_v4().to_string(),
            model_name: self.model_name.clone(),
            model_version: self.model_version.clone(),
            generated_at: Utc::now(),
            health: self.check_health().await,
            performance: self.performance_window().await,
            prediction_stats,
        }
    }
}

/// Accuracy plus support-weighted precision, recall, and F1 over arbitrary
/// hashable labels.
fn classification_metrics<T: Eq + Hash>(y_true: &[T], y_pred: &[T]) -> HashMap<String, f64> {
    let n = y_true.len() as f64;
    let correct = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(t, p)| t == p)
        .count() as f64;

    #[derive(Default)]
    struct Tally {
        tp: f64,
        fp: f64,
        fn_: f64,
        support: f64,
    }

    let mut tallies: HashMap<&T, Tally> = HashMap::new();
    for (t, p) in y_true.iter().zip(y_pred.iter()) {
        tallies.entry(t).or_default().support += 1.0;
        if t == p {
            tallies.entry(t).or_default().tp += 1.0;
        } else {
            tallies.entry(t).or_default().fn_ += 1.0;
            tallies.entry(p).or_default().fp += 1.0;
        }
    }

    let mut precision = 0.0;
    let mut recall = 0.0;
    let mut f1 = 0.0;
    for tally in tallies.values() {
        let weight = tally.support / n;
        if weight == 0.0 {
            continue;
        }
        let p = if tally.tp + tally.fp > 0.0 {
            tally.tp / (tally.tp + tally.fp)
        } else {
            0.0
        };
        let r = if tally.tp + tally.fn_ > 0.0 {
            tally.tp / (tally.tp + tally.fn_)
        } else {
            0.0
        };
        let f = if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 };
        precision += weight * p;
        recall += weight * r;
        f1 += weight * f;
    }

    HashMap::from([
        ("accuracy".to_string(), correct / n),
        ("precision".to_string(), precision),
        ("recall".to_string(), recall),
        ("f1_score".to_string(), f1),
    ])
}

/// Change between the older and newer halves of a series.
fn trend_of(values: &[f64]) -> Trend {
    let mid = values.len() / 2;
    let change = stats::mean(&values[mid..]) - stats::mean(&values[..mid]);
    let direction = if change.abs() < STABLE_TREND_EPSILON {
        TrendDirection::Stable
    } else if change > 0.0 {
        TrendDirection::Improving
    } else {
        TrendDirection::Declining
    };
    Trend { direction, change }
}

/// Shared registry handing out one monitor per model name.
pub struct MonitorRegistry {
    config: MonitorConfig,
    logger: Arc<PredictionLogger>,
    monitors: RwLock<HashMap<String, Arc<ModelMonitor>>>,
}

impl MonitorRegistry {
    pub fn new(config: MonitorConfig, logger: Arc<PredictionLogger>) -> Self {
        Self {
            config,
            logger,
            monitors: RwLock::new(HashMap::new()),
        }
    }

    /// The monitor for a model, created on first use.
    pub async fn get_or_create(&self, model_name: &str) -> Arc<ModelMonitor> {
        if let Some(monitor) = self.monitors.read().await.get(model_name) {
            return monitor.clone();
        }
        let mut monitors = self.monitors.write().await;
        monitors
            .entry(model_name.to_string())
            .or_insert_with(|| {
                Arc::new(ModelMonitor::new(
                    model_name,
                    self.config.clone(),
                    self.logger.clone(),
                ))
            })
            .clone()
    }

    pub async fn model_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.monitors.read().await.keys().cloned().collect();
        names.sort_unstable();
        names
    }
}
