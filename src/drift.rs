//! Data drift detection.
//!
//! A [`DataSnapshot`] is the minimal columnar interface drift testing needs:
//! named columns, each an ordered sequence of numbers. Detectors are chosen
//! by explicit [`DriftBackend`] configuration, never by capability probing;
//! [`KsDetector`] (two-sample Kolmogorov-Smirnov) is always available and is
//! the fallback when the configured backend errors.

use crate::error::{ModelOpsError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Columnar numeric snapshot of a dataset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataSnapshot {
    columns: HashMap<String, Vec<f64>>,
}

impl DataSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.columns.insert(name.into(), values);
        self
    }

    pub fn insert_column(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.columns.insert(name.into(), values);
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Column names in deterministic (sorted) order.
    pub fn column_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.columns.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Which drift-detection backend to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftBackend {
    /// Two-sample Kolmogorov-Smirnov test (always available).
    #[default]
    Ks,
    /// Population stability index.
    Psi,
}

/// Result of testing one feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftTest {
    /// Test statistic (KS `D`, or the PSI score).
    pub statistic: f64,
    /// Asymptotic p-value, where the backend produces one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p_value: Option<f64>,
    pub drifted: bool,
}

/// One drifted feature in a report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftedFeature {
    pub feature: String,
    pub statistic: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p_value: Option<f64>,
}

/// Per-call drift report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftReport {
    pub drift_detected: bool,
    pub detector: String,
    pub drifted_features: Vec<DriftedFeature>,
    /// How many features were present in both datasets and tested.
    pub features_checked: usize,
    pub timestamp: DateTime<Utc>,
    /// Set when the check could not run (e.g. no reference data). Such a
    /// report is a not-applicable result, never an error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DriftReport {
    /// A report for a check that could not run.
    pub fn not_applicable(reason: impl Into<String>) -> Self {
        Self {
            drift_detected: false,
            detector: String::new(),
            drifted_features: Vec::new(),
            features_checked: 0,
            timestamp: Utc::now(),
            error: Some(reason.into()),
        }
    }
}

/// Strategy interface for per-feature two-sample drift testing.
pub trait DriftDetector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Compare one feature's reference and current samples. `significance`
    /// is the rejection level for backends that produce a p-value.
    fn test(&self, reference: &[f64], current: &[f64], significance: f64) -> Result<DriftTest>;
}

/// Build the detector for a configured backend.
pub fn detector_for(backend: DriftBackend) -> Box<dyn DriftDetector> {
    match backend {
        DriftBackend::Ks => Box::new(KsDetector),
        DriftBackend::Psi => Box::new(PsiDetector::default()),
    }
}

/// Two-sample Kolmogorov-Smirnov detector.
#[derive(Debug, Clone, Copy, Default)]
pub struct KsDetector;

impl DriftDetector for KsDetector {
    fn name(&self) -> &'static str {
        "ks"
    }

    fn test(&self, reference: &[f64], current: &[f64], significance: f64) -> Result<DriftTest> {
        if reference.is_empty() || current.is_empty() {
            return Err(ModelOpsError::DriftDetector(
                "KS test requires non-empty samples".to_string(),
            ));
        }
        let d = ks_statistic(reference, current);
        let p = ks_p_value(d, reference.len(), current.len());
        Ok(DriftTest {
            statistic: d,
            p_value: Some(p),
            drifted: p < significance,
        })
    }
}

/// Population-stability-index detector.
///
/// Bins the reference sample into equal-frequency bins and scores the shift
/// of the current sample's bin proportions. Scores above `threshold`
/// (conventionally 0.2) count as drift; no p-value is produced.
#[derive(Debug, Clone, Copy)]
pub struct PsiDetector {
    pub bins: usize,
    pub threshold: f64,
}

impl Default for PsiDetector {
    fn default() -> Self {
        Self {
            bins: 10,
            threshold: 0.2,
        }
    }
}

impl DriftDetector for PsiDetector {
    fn name(&self) -> &'static str {
        "psi"
    }

    fn test(&self, reference: &[f64], current: &[f64], _significance: f64) -> Result<DriftTest> {
        if reference.len() < self.bins * 2 {
            return Err(ModelOpsError::DriftDetector(format!(
                "PSI needs at least {} reference samples, got {}",
                self.bins * 2,
                reference.len()
            )));
        }
        if current.is_empty() {
            return Err(ModelOpsError::DriftDetector(
                "PSI requires a non-empty current sample".to_string(),
            ));
        }

        let mut sorted_ref = reference.to_vec();
        sorted_ref.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

        // Equal-frequency bin edges from the reference distribution.
        let mut edges = Vec::with_capacity(self.bins - 1);
        for i in 1..self.bins {
            let idx = i * sorted_ref.len() / self.bins;
            edges.push(sorted_ref[idx.min(sorted_ref.len() - 1)]);
        }

        let ref_counts = bin_counts(reference, &edges, self.bins);
        let cur_counts = bin_counts(current, &edges, self.bins);

        const EPSILON: f64 = 1e-6;
        let mut psi = 0.0;
        for (r, c) in ref_counts.iter().zip(cur_counts.iter()) {
            let rp = (*r as f64 / reference.len() as f64).max(EPSILON);
            let cp = (*c as f64 / current.len() as f64).max(EPSILON);
            psi += (cp - rp) * (cp / rp).ln();
        }

        Ok(DriftTest {
            statistic: psi,
            p_value: None,
            drifted: psi > self.threshold,
        })
    }
}

fn bin_counts(values: &[f64], edges: &[f64], bins: usize) -> Vec<usize> {
    let mut counts = vec![0usize; bins];
    for v in values {
        let bin = edges.partition_point(|edge| edge < v).min(bins - 1);
        counts[bin] += 1;
    }
    counts
}

/// Supremum distance between the two empirical CDFs.
fn ks_statistic(a: &[f64], b: &[f64]) -> f64 {
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort_by(|x, y| x.partial_cmp(y).unwrap_or(Ordering::Equal));
    b.sort_by(|x, y| x.partial_cmp(y).unwrap_or(Ordering::Equal));

    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let (mut i, mut j) = (0usize, 0usize);
    let mut d: f64 = 0.0;
    while i < a.len() && j < b.len() {
        let (x1, x2) = (a[i], b[j]);
        if x1 <= x2 {
            i += 1;
        }
        if x2 <= x1 {
            j += 1;
        }
        d = d.max((i as f64 / n1 - j as f64 / n2).abs());
    }
    d
}

/// Asymptotic two-sided p-value for the two-sample KS statistic
/// (Kolmogorov distribution with the small-sample correction).
fn ks_p_value(d: f64, n1: usize, n2: usize) -> f64 {
    let en = ((n1 * n2) as f64 / (n1 + n2) as f64).sqrt();
    let lambda = (en + 0.12 + 0.11 / en) * d;
    if lambda <= 0.0 {
        return 1.0;
    }
    let mut sum = 0.0;
    let mut sign = 1.0;
    for j in 1..=100 {
        let term = sign * (-2.0 * (j as f64).powi(2) * lambda.powi(2)).exp();
        sum += term;
        if term.abs() < 1e-10 {
            break;
        }
        sign = -sign;
    }
    (2.0 * sum).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize, offset: f64) -> Vec<f64> {
        (0..n).map(|i| i as f64 / n as f64 + offset).collect()
    }

    #[test]
    fn test_ks_identical_samples() {
        let sample = ramp(500, 0.0);
        let result = KsDetector.test(&sample, &sample, 0.05).unwrap();
        assert!(!result.drifted);
        assert!(result.p_value.unwrap() > 0.95);
        assert!(result.statistic < 0.01);
    }

    #[test]
    fn test_ks_shifted_samples() {
        let reference = ramp(500, 0.0);
        let shifted = ramp(500, 0.5);
        let result = KsDetector.test(&reference, &shifted, 0.05).unwrap();
        assert!(result.drifted);
        assert!(result.p_value.unwrap() < 0.01);
        assert!(result.statistic > 0.3);
    }

    #[test]
    fn test_ks_rejects_empty() {
        assert!(KsDetector.test(&[], &[1.0], 0.05).is_err());
        assert!(KsDetector.test(&[1.0], &[], 0.05).is_err());
    }

    #[test]
    fn test_psi_stable_and_shifted() {
        let reference = ramp(1000, 0.0);
        let stable = PsiDetector::default()
            .test(&reference, &ramp(1000, 0.0), 0.05)
            .unwrap();
        assert!(!stable.drifted);
        assert!(stable.p_value.is_none());

        let shifted = PsiDetector::default()
            .test(&reference, &ramp(1000, 0.6), 0.05)
            .unwrap();
        assert!(shifted.drifted);
        assert!(shifted.statistic > 0.2);
    }

    #[test]
    fn test_psi_small_reference_errors() {
        let err = PsiDetector::default()
            .test(&[1.0, 2.0, 3.0], &ramp(100, 0.0), 0.05)
            .unwrap_err();
        assert!(matches!(err, ModelOpsError::DriftDetector(_)));
    }

    #[test]
    fn test_snapshot_accessors() {
        let snapshot = DataSnapshot::new()
            .with_column("age", vec![1.0, 2.0])
            .with_column("income", vec![3.0]);
        assert_eq!(snapshot.column_names(), vec!["age", "income"]);
        assert_eq!(snapshot.column("age"), Some(&[1.0, 2.0][..]));
        assert!(snapshot.column("missing").is_none());
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn test_detector_for_backend() {
        assert_eq!(detector_for(DriftBackend::Ks).name(), "ks");
        assert_eq!(detector_for(DriftBackend::Psi).name(), "psi");
    }
}
