//! Observability: logging bootstrap and the metrics sink.
//!
//! Components never touch global counters directly; they write to an
//! injected [`MetricsSink`], so tests substitute [`NoopSink`] and production
//! wiring uses [`PrometheusSink`] backed by the `metrics` recorder.

use crate::config::ObservabilityConfig;
use crate::error::{ModelOpsError, Result};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize logging and, when enabled, the Prometheus metrics recorder
/// with its scrape endpoint.
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| ModelOpsError::Internal(format!("Failed to init logging: {}", e)))?;
    } else {
        subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| ModelOpsError::Internal(format!("Failed to init logging: {}", e)))?;
    }

    if config.metrics_enabled {
        PrometheusBuilder::new()
            .with_http_listener(config.metrics_addr)
            .install()
            .map_err(|e| {
                ModelOpsError::Internal(format!("Failed to install metrics recorder: {}", e))
            })?;
        info!(addr = %config.metrics_addr, "Metrics endpoint listening");
    }

    info!("Observability initialized");
    Ok(())
}

/// Fire-and-forget telemetry sink. The core only ever writes to it.
pub trait MetricsSink: Send + Sync {
    /// Count one prediction for a model, labelled by predicted class.
    fn record_prediction(&self, model: &str, class: &str);
    /// Observe one prediction latency in milliseconds.
    fn record_latency(&self, model: &str, latency_ms: f64);
    /// Publish the model's current accuracy.
    fn record_accuracy(&self, model: &str, accuracy: f64);
    /// Count one drift detection for a model.
    fn record_drift(&self, model: &str);
}

/// Sink that feeds the installed `metrics` recorder.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusSink;

impl MetricsSink for PrometheusSink {
    fn record_prediction(&self, model: &str, class: &str) {
        counter!(
            "modelops_predictions_total",
            "model" => model.to_string(),
            "class" => class.to_string()
        )
        .increment(1);
    }

    fn record_latency(&self, model: &str, latency_ms: f64) {
        histogram!("modelops_prediction_latency_ms", "model" => model.to_string())
            .record(latency_ms);
    }

    fn record_accuracy(&self, model: &str, accuracy: f64) {
        gauge!("modelops_model_accuracy", "model" => model.to_string()).set(accuracy);
    }

    fn record_drift(&self, model: &str) {
        counter!("modelops_drift_detections_total", "model" => model.to_string()).increment(1);
    }
}

/// Sink that discards everything; the default for tests and library use.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn record_prediction(&self, _model: &str, _class: &str) {}
    fn record_latency(&self, _model: &str, _latency_ms: f64) {}
    fn record_accuracy(&self, _model: &str, _accuracy: f64) {}
    fn record_drift(&self, _model: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Counting sink used across the crate's tests.
    #[derive(Default)]
    pub struct CountingSink {
        pub predictions: AtomicUsize,
        pub drifts: AtomicUsize,
    }

    impl MetricsSink for CountingSink {
        fn record_prediction(&self, _model: &str, _class: &str) {
            self.predictions.fetch_add(1, Ordering::Relaxed);
        }
        fn record_latency(&self, _model: &str, _latency_ms: f64) {}
        fn record_accuracy(&self, _model: &str, _accuracy: f64) {}
        fn record_drift(&self, _model: &str) {
            self.drifts.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_sink_is_object_safe() {
        let sink: Arc<dyn MetricsSink> = Arc::new(NoopSink);
        sink.record_prediction("m", "a");
        sink.record_drift("m");

        let counting = Arc::new(CountingSink::default());
        let dynamic: Arc<dyn MetricsSink> = counting.clone();
        dynamic.record_prediction("m", "a");
        dynamic.record_drift("m");
        assert_eq!(counting.predictions.load(Ordering::Relaxed), 1);
        assert_eq!(counting.drifts.load(Ordering::Relaxed), 1);
    }
}
