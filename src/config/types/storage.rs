//! Storage configuration types
//!
//! Where the device identity and device tokens are kept.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage backend
    #[serde(default)]
    pub backend: StorageBackendType,
    /// File path for the file backend (defaults to the state directory)
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Storage backend type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendType {
    /// JSON file (default)
    #[default]
    File,
    /// In-memory (no persistence)
    Memory,
}

impl StorageConfig {
    /// Resolved file path of the file backend
    pub fn file_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| crate::config::state_dir().join("gateway-store.json"))
    }
}
