//! Prediction logging: buffered, append-only JSONL partitioned by UTC day.
//!
//! Records accumulate in an in-memory buffer and are flushed to
//! `predictions_YYYY-MM-DD.jsonl` files when the buffer reaches capacity or
//! on an explicit [`PredictionLogger::flush`]. Write failures are logged and
//! absorbed; a prediction log must never take down the serving path.

use crate::config::LoggerConfig;
use crate::observability::{MetricsSink, NoopSink};
use crate::stats;
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// One logged prediction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    /// Unique record id.
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub model_name: String,
    pub model_version: String,
    /// Input features as given by the caller.
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub features: HashMap<String, Value>,
    pub prediction: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
    /// Ground truth, attached later when it becomes known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction_time_ms: Option<f64>,
    /// Caller-supplied correlation id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub metadata: HashMap<String, String>,
}

impl PredictionRecord {
    pub fn builder(
        model_name: impl Into<String>,
        model_version: impl Into<String>,
        prediction: Value,
    ) -> PredictionBuilder {
        PredictionBuilder::new(model_name, model_version, prediction)
    }

    /// The UTC day this record partitions into.
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// Builder for [`PredictionRecord`].
pub struct PredictionBuilder {
    record: PredictionRecord,
}

impl PredictionBuilder {
    pub fn new(
        model_name: impl Into<String>,
        model_version: impl Into<String>,
        prediction: Value,
    ) -> Self {
        Self {
            record: PredictionRecord {
                id: Uuid::new_v4().to_string(),
                timestamp: Utc::now(),
                model_name: model_name.into(),
                model_version: model_version.into(),
                features: HashMap::new(),
                prediction,
                probability: None,
                actual_value: None,
                prediction_time_ms: None,
                request_id: None,
                user_id: None,
                metadata: HashMap::new(),
            },
        }
    }

    pub fn feature(mut self, name: impl Into<String>, value: Value) -> Self {
        self.record.features.insert(name.into(), value);
        self
    }

    pub fn features(mut self, features: HashMap<String, Value>) -> Self {
        self.record.features = features;
        self
    }

    pub fn probability(mut self, probability: f64) -> Self {
        self.record.probability = Some(probability);
        self
    }

    pub fn actual_value(mut self, actual: Value) -> Self {
        self.record.actual_value = Some(actual);
        self
    }

    pub fn prediction_time_ms(mut self, ms: f64) -> Self {
        self.record.prediction_time_ms = Some(ms);
        self
    }

    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.record.request_id = Some(request_id.into());
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.record.user_id = Some(user_id.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.record.metadata.insert(key.into(), value.into());
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.record.timestamp = timestamp;
        self
    }

    pub fn build(self) -> PredictionRecord {
        self.record
    }
}

/// Summary statistics for one numeric series.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DescriptiveStats {
    pub count: usize,
    pub mean: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

impl DescriptiveStats {
    fn from_values(values: &[f64]) -> Self {
        let sorted = stats::sorted(values);
        Self {
            count: values.len(),
            mean: stats::mean(values),
            p50: stats::percentile(&sorted, 0.50),
            p95: stats::percentile(&sorted, 0.95),
            p99: stats::percentile(&sorted, 0.99),
        }
    }
}

/// Aggregated statistics over a date range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionStatistics {
    pub model_name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_predictions: usize,
    /// Count per predicted class label.
    pub class_counts: HashMap<String, usize>,
    pub latency_ms: DescriptiveStats,
    pub probability: DescriptiveStats,
}

/// Buffered, day-partitioned prediction logger.
pub struct PredictionLogger {
    config: LoggerConfig,
    buffer: Mutex<Vec<PredictionRecord>>,
    sink: Arc<dyn MetricsSink>,
}

impl PredictionLogger {
    pub fn new(config: LoggerConfig) -> Self {
        Self::with_sink(config, Arc::new(NoopSink))
    }

    pub fn with_sink(config: LoggerConfig, sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            config,
            buffer: Mutex::new(Vec::new()),
            sink,
        }
    }

    /// Record one prediction. The append, the capacity check, and any
    /// resulting flush happen inside one buffer critical section, so two
    /// concurrent callers cannot both observe a full buffer.
    pub async fn log_prediction(&self, record: PredictionRecord) {
        self.sink
            .record_prediction(&record.model_name, &class_label(&record.prediction));
        if let Some(ms) = record.prediction_time_ms {
            self.sink.record_latency(&record.model_name, ms);
        }

        let mut buffer = self.buffer.lock().await;
        buffer.push(record);
        if buffer.len() >= self.config.buffer_size {
            self.flush_locked(&mut buffer).await;
        }
    }

    /// Flush all buffered records to their day files.
    pub async fn flush(&self) {
        let mut buffer = self.buffer.lock().await;
        self.flush_locked(&mut buffer).await;
    }

    /// Write the buffer out, grouping consecutive records that share a UTC
    /// day into one append. On a write failure the already-written prefix is
    /// dropped from the buffer and the rest is retained for the next flush;
    /// the error is logged, never propagated.
    async fn flush_locked(&self, buffer: &mut Vec<PredictionRecord>) {
        if buffer.is_empty() {
            return;
        }

        let mut written = 0usize;
        while written < buffer.len() {
            let date = buffer[written].date();
            let run_end = buffer[written..]
                .iter()
                .position(|r| r.date() != date)
                .map(|offset| written + offset)
                .unwrap_or(buffer.len());

            match self.append_run(date, &buffer[written..run_end]).await {
                Ok(()) => written = run_end,
                Err(e) => {
                    error!(
                        error = %e,
                        date = %date,
                        retained = buffer.len() - written,
                        "Failed to flush prediction log; retaining unwritten records"
                    );
                    break;
                }
            }
        }

        buffer.drain(..written);
        if buffer.is_empty() {
            debug!(written, "Flushed prediction buffer");
        }
    }

    async fn append_run(&self, date: NaiveDate, records: &[PredictionRecord]) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.config.log_dir).await?;

        let mut lines = String::new();
        for record in records {
            let line = serde_json::to_string(record)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            lines.push_str(&line);
            lines.push('\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.day_file(date))
            .await?;
        file.write_all(lines.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    fn day_file(&self, date: NaiveDate) -> PathBuf {
        self.config
            .log_dir
            .join(format!("predictions_{}.jsonl", date.format("%Y-%m-%d")))
    }

    /// Most recent buffered records, newest first, optionally filtered by
    /// model and version. Only unflushed records are visible here.
    pub async fn get_recent_predictions(
        &self,
        model: Option<&str>,
        version: Option<&str>,
        limit: usize,
    ) -> Vec<PredictionRecord> {
        let buffer = self.buffer.lock().await;
        buffer
            .iter()
            .rev()
            .filter(|record| {
                model.map_or(true, |m| record.model_name == m)
                    && version.map_or(true, |v| record.model_version == v)
            })
            .take(limit)
            .cloned()
            .collect()
    }

    /// Attach a ground-truth value to the buffered record with the given
    /// request id. Returns whether a record was found. Records already
    /// flushed to disk are not rewritten.
    pub async fn attach_actual(&self, request_id: &str, actual: Value) -> bool {
        let mut buffer = self.buffer.lock().await;
        match buffer
            .iter_mut()
            .rev()
            .find(|record| record.request_id.as_deref() == Some(request_id))
        {
            Some(record) => {
                record.actual_value = Some(actual);
                true
            }
            None => {
                debug!(request_id, "No buffered prediction for request id");
                false
            }
        }
    }

    /// Load one day's flushed records, optionally filtered by model. A
    /// missing day file is an empty result; a malformed line is skipped with
    /// a warning rather than failing the whole read.
    pub async fn load_predictions_from_date(
        &self,
        date: NaiveDate,
        model: Option<&str>,
    ) -> Vec<PredictionRecord> {
        let path = self.day_file(date);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(date = %date, "No prediction log for date");
                return Vec::new();
            }
            Err(e) => {
                warn!(error = %e, path = %path.display(), "Failed to read prediction log");
                return Vec::new();
            }
        };

        let mut records = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<PredictionRecord>(line) {
                Ok(record) => {
                    if model.map_or(true, |m| record.model_name == m) {
                        records.push(record);
                    }
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        path = %path.display(),
                        line = lineno + 1,
                        "Skipping malformed prediction record"
                    );
                }
            }
        }
        records
    }

    /// Aggregate statistics for one model over an inclusive date range
    /// (`end` defaults to today, UTC). Flushes first so today's buffered
    /// records are counted.
    pub async fn get_prediction_statistics(
        &self,
        model: &str,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> PredictionStatistics {
        self.flush().await;
        let end = end.unwrap_or_else(|| Utc::now().date_naive());

        let mut total = 0usize;
        let mut class_counts: HashMap<String, usize> = HashMap::new();
        let mut latencies = Vec::new();
        let mut probabilities = Vec::new();

        let mut date = start;
        while date <= end {
            for record in self.load_predictions_from_date(date, Some(model)).await {
                total += 1;
                *class_counts
                    .entry(class_label(&record.prediction))
                    .or_insert(0) += 1;
                if let Some(ms) = record.prediction_time_ms {
                    latencies.push(ms);
                }
                if let Some(p) = record.probability {
                    probabilities.push(p);
                }
            }
            date = match date.checked_add_days(Days::new(1)) {
                Some(next) => next,
                None => break,
            };
        }

        PredictionStatistics {
            model_name: model.to_string(),
            start_date: start,
            end_date: end,
            total_predictions: total,
            class_counts,
            latency_ms: DescriptiveStats::from_values(&latencies),
            probability: DescriptiveStats::from_values(&probabilities),
        }
    }

    /// Number of records currently buffered.
    pub async fn buffered(&self) -> usize {
        self.buffer.lock().await.len()
    }
}

/// Class label for counting: strings unquoted, everything else in its JSON
/// rendering.
fn class_label(prediction: &Value) -> String {
    match prediction {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn logger_in(dir: &TempDir, buffer_size: usize) -> PredictionLogger {
        PredictionLogger::new(LoggerConfig {
            log_dir: dir.path().to_path_buf(),
            buffer_size,
        })
    }

    fn record(model: &str, prediction: Value) -> PredictionRecord {
        PredictionRecord::builder(model, "1.0.0", prediction).build()
    }

    #[test]
    fn test_builder_sets_fields() {
        let r = PredictionRecord::builder("churn", "1.2.0", json!("yes"))
            .feature("age", json!(41))
            .probability(0.83)
            .prediction_time_ms(12.5)
            .request_id("req-1")
            .metadata("region", "eu")
            .build();
        assert_eq!(r.model_name, "churn");
        assert_eq!(r.model_version, "1.2.0");
        assert_eq!(r.probability, Some(0.83));
        assert_eq!(r.request_id.as_deref(), Some("req-1"));
        assert!(!r.id.is_empty());

        // optional fields absent from the wire form when unset
        let bare = record("churn", json!(1));
        let line = serde_json::to_string(&bare).unwrap();
        assert!(!line.contains("probability"));
        assert!(!line.contains("request_id"));
    }

    #[tokio::test]
    async fn test_flush_at_capacity() {
        let dir = TempDir::new().unwrap();
        let logger = logger_in(&dir, 3);

        logger.log_prediction(record("m", json!("a"))).await;
        logger.log_prediction(record("m", json!("b"))).await;
        assert_eq!(logger.buffered().await, 2);

        // third record hits capacity and flushes within the call
        logger.log_prediction(record("m", json!("a"))).await;
        assert_eq!(logger.buffered().await, 0);

        let today = Utc::now().date_naive();
        let records = logger.load_predictions_from_date(today, None).await;
        assert_eq!(records.len(), 3);
    }

    #[tokio::test]
    async fn test_flush_empty_buffer_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let logger = logger_in(&dir, 10);
        logger.flush().await;
        let today = Utc::now().date_naive();
        assert!(!dir
            .path()
            .join(format!("predictions_{}.jsonl", today.format("%Y-%m-%d")))
            .exists());
    }

    #[tokio::test]
    async fn test_records_partition_by_day() {
        let dir = TempDir::new().unwrap();
        let logger = logger_in(&dir, 100);

        let yesterday = Utc::now() - chrono::Duration::days(1);
        logger
            .log_prediction(
                PredictionRecord::builder("m", "1.0.0", json!("a"))
                    .timestamp(yesterday)
                    .build(),
            )
            .await;
        logger.log_prediction(record("m", json!("b"))).await;
        logger.flush().await;

        let from_yesterday = logger
            .load_predictions_from_date(yesterday.date_naive(), None)
            .await;
        assert_eq!(from_yesterday.len(), 1);
        assert_eq!(from_yesterday[0].prediction, json!("a"));

        let from_today = logger
            .load_predictions_from_date(Utc::now().date_naive(), None)
            .await;
        assert_eq!(from_today.len(), 1);
    }

    #[tokio::test]
    async fn test_recent_predictions_filtering() {
        let dir = TempDir::new().unwrap();
        let logger = logger_in(&dir, 100);

        logger.log_prediction(record("alpha", json!("x"))).await;
        logger.log_prediction(record("beta", json!("y"))).await;
        logger.log_prediction(record("alpha", json!("z"))).await;

        let alpha = logger.get_recent_predictions(Some("alpha"), None, 10).await;
        assert_eq!(alpha.len(), 2);
        // newest first
        assert_eq!(alpha[0].prediction, json!("z"));

        let limited = logger.get_recent_predictions(None, None, 1).await;
        assert_eq!(limited.len(), 1);

        let versioned = logger
            .get_recent_predictions(Some("alpha"), Some("9.9.9"), 10)
            .await;
        assert!(versioned.is_empty());
    }

    #[tokio::test]
    async fn test_attach_actual() {
        let dir = TempDir::new().unwrap();
        let logger = logger_in(&dir, 100);

        logger
            .log_prediction(
                PredictionRecord::builder("m", "1.0.0", json!("yes"))
                    .request_id("req-7")
                    .build(),
            )
            .await;

        assert!(logger.attach_actual("req-7", json!("no")).await);
        assert!(!logger.attach_actual("req-missing", json!("no")).await);

        let recent = logger.get_recent_predictions(None, None, 1).await;
        assert_eq!(recent[0].actual_value, Some(json!("no")));
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let logger = logger_in(&dir, 100);
        logger.log_prediction(record("m", json!("a"))).await;
        logger.flush().await;

        let today = Utc::now().date_naive();
        let path = dir
            .path()
            .join(format!("predictions_{}.jsonl", today.format("%Y-%m-%d")));
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("{not json}\n");
        std::fs::write(&path, content).unwrap();

        logger.log_prediction(record("m", json!("b"))).await;
        logger.flush().await;

        let records = logger.load_predictions_from_date(today, None).await;
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_prediction_statistics() {
        let dir = TempDir::new().unwrap();
        let logger = logger_in(&dir, 100);

        for (class, latency, prob) in [("yes", 10.0, 0.9), ("yes", 20.0, 0.8), ("no", 30.0, 0.3)] {
            logger
                .log_prediction(
                    PredictionRecord::builder("churn", "1.0.0", json!(class))
                        .prediction_time_ms(latency)
                        .probability(prob)
                        .build(),
                )
                .await;
        }
        // a different model must not be counted
        logger.log_prediction(record("other", json!("yes"))).await;

        let today = Utc::now().date_naive();
        let stats = logger.get_prediction_statistics("churn", today, None).await;
        assert_eq!(stats.total_predictions, 3);
        assert_eq!(stats.class_counts["yes"], 2);
        assert_eq!(stats.class_counts["no"], 1);
        assert_eq!(stats.latency_ms.count, 3);
        assert!((stats.latency_ms.mean - 20.0).abs() < 1e-9);
        assert_eq!(stats.probability.count, 3);
    }

    #[tokio::test]
    async fn test_statistics_over_empty_range() {
        let dir = TempDir::new().unwrap();
        let logger = logger_in(&dir, 100);
        let start = Utc::now().date_naive();
        let stats = logger.get_prediction_statistics("ghost", start, None).await;
        assert_eq!(stats.total_predictions, 0);
        assert!(stats.class_counts.is_empty());
        assert_eq!(stats.latency_ms.count, 0);
        assert_eq!(stats.latency_ms.p95, 0.0);
    }

    #[test]
    fn test_class_label_rendering() {
        assert_eq!(class_label(&json!("churn")), "churn");
        assert_eq!(class_label(&json!(1)), "1");
        assert_eq!(class_label(&json!(true)), "true");
        assert_eq!(class_label(&json!(null)), "null");
    }
}
