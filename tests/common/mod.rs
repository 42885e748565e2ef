#![allow(dead_code)]

use modelops::{CatalogConfig, LoggerConfig};
use std::path::PathBuf;
use tempfile::TempDir;

/// Isolated on-disk environment for one test.
pub struct TestEnv {
    dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp dir"),
        }
    }

    pub fn store_path(&self) -> PathBuf {
        self.dir.path().join("versions.json")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.dir.path().join("predictions")
    }

    pub fn catalog_config(&self) -> CatalogConfig {
        CatalogConfig {
            store_path: self.store_path(),
            ..Default::default()
        }
    }

    pub fn logger_config(&self, buffer_size: usize) -> LoggerConfig {
        LoggerConfig {
            log_dir: self.log_dir(),
            buffer_size,
        }
    }
}
