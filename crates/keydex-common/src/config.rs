//! Configuration structures for keydex.

use crate::error::{KeydexError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File extension used for index stores.
pub const INDEX_FILE_EXTENSION: &str = "idx";

/// Configuration shared by the index engine and the export drivers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeydexConfig {
    /// Directory holding index stores.
    pub data_dir: PathBuf,
    /// Enable fsync when an index build finishes.
    pub fsync_enabled: bool,
    /// Maximum number of entries a single index may hold.
    pub max_index_entries: u64,
    /// Maximum number of entries collected by the batch sort builder.
    pub max_sort_entries: usize,
    /// Estimated volume at or above which the batch sort path is used.
    pub batch_threshold: usize,
}

impl Default for KeydexConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            fsync_enabled: true,
            max_index_entries: 32_767, // signed 16-bit record ceiling
            max_sort_entries: 4_000,
            batch_threshold: 1_000,
        }
    }
}

impl KeydexConfig {
    /// Creates a configuration rooted at the given directory.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Returns the path of the index store with the given name.
    pub fn index_path(&self, name: &str) -> PathBuf {
        self.data_dir
            .join(format!("{}.{}", name, INDEX_FILE_EXTENSION))
    }

    /// Returns the data directory.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Checks that every capacity is usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_index_entries == 0 {
            return Err(KeydexError::ConfigError(
                "max_index_entries must be positive".to_string(),
            ));
        }
        if self.max_sort_entries == 0 {
            return Err(KeydexError::ConfigError(
                "max_sort_entries must be positive".to_string(),
            ));
        }
        if self.batch_threshold == 0 {
            return Err(KeydexError::ConfigError(
                "batch_threshold must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
