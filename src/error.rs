//! Error types for modelops.
//!
//! This module provides a unified error type [`ModelOpsError`] for all
//! catalog, logging, and monitoring operations, along with a convenient
//! [`Result`] type alias.
//!
//! # Error Categories
//!
//! - **Validation**: malformed version strings, out-of-range metric values,
//!   illegal stage transitions. Always returned to the caller.
//! - **Configuration**: invalid settings or unreadable config files.
//! - **Persistence**: catalog-store or prediction-log I/O failures. Callers
//!   inside this crate log these and continue with in-memory state; they are
//!   never allowed to abort a promotion or health-check call.
//! - **Serialization/IO**: wrapped external errors.
//!
//! # Example
//!
//! ```rust
//! use modelops::error::{ModelOpsError, Result};
//!
//! fn parse_threshold(raw: &str) -> Result<f64> {
//!     raw.parse::<f64>()
//!         .map_err(|e| ModelOpsError::Validation(format!("bad threshold: {}", e)))
//! }
//! ```

use std::io;
use thiserror::Error;

/// Main error type for modelops operations.
#[derive(Error, Debug)]
pub enum ModelOpsError {
    // Validation errors
    #[error("Invalid version string '{input}': {reason}")]
    InvalidVersion { input: String, reason: String },

    #[error("Metric '{name}' out of range: {value} ({reason})")]
    MetricOutOfRange {
        name: String,
        value: f64,
        reason: String,
    },

    #[error("Invalid stage transition: {from} -> {to}")]
    InvalidStageTransition { from: String, to: String },

    #[error("Validation error: {0}")]
    Validation(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    // Persistence errors
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    // Statistical backend errors
    #[error("Drift detector error: {0}")]
    DriftDetector(String),

    // External errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ModelOpsError {
    /// Check whether the error indicates bad caller input rather than a
    /// runtime fault. Validation errors are always surfaced; they are never
    /// absorbed by best-effort paths.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ModelOpsError::InvalidVersion { .. }
                | ModelOpsError::MetricOutOfRange { .. }
                | ModelOpsError::InvalidStageTransition { .. }
                | ModelOpsError::Validation(_)
        )
    }

    /// Check whether the error is a persistence-class failure that callers
    /// inside this crate log and absorb.
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            ModelOpsError::Storage(_) | ModelOpsError::Timeout(_) | ModelOpsError::Io(_)
        )
    }
}

/// Result type alias for modelops operations.
pub type Result<T> = std::result::Result<T, ModelOpsError>;
