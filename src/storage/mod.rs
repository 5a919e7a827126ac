//! Storage port - Abstract key-value persistence
//!
//! The client never touches a platform storage API directly. Device identity
//! and device tokens go through a [`KeyValueStore`] injected by the host, so
//! the host decides how durable they are:
//! - `MemoryStore`: process lifetime only (tests, ephemeral sessions)
//! - `FileStore`: one JSON file under the state directory

mod file;
mod memory;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{StorageBackendType, StorageConfig};
use crate::error::Result;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Abstract interface for string-keyed persistence
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get the backend ID
    fn id(&self) -> &str;

    /// Retrieve a value
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value, replacing any previous one
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Open the backend selected by the storage configuration
pub fn open_store(config: &StorageConfig) -> Arc<dyn KeyValueStore> {
    match config.backend {
        StorageBackendType::File => Arc::new(FileStore::new(config.file_path())),
        StorageBackendType::Memory => Arc::new(MemoryStore::new()),
    }
}
