//! File-backed key-value store
//!
//! Keeps every entry in a single JSON object file. Writes go to a temp file
//! that is renamed over the original, so a crash never leaves a torn file.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use super::KeyValueStore;
use crate::error::{Error, Result};

/// Durable store persisted as one JSON file
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles
    lock: Mutex<()>,
}

impl FileStore {
    /// Create a store at the given path; the file is created on first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileStore {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<BTreeMap<String, String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                Error::Storage(format!("Corrupt store file {}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(entries)?;
        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, json.as_bytes()).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&self.path, perms).await?;
        }

        debug!("Wrote {} entries to {}", entries.len(), self.path.display());
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    fn id(&self) -> &str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_all().await?;
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let first = FileStore::new(&path);
        first.set("device", "abc").await.unwrap();
        first.set("token", "xyz").await.unwrap();

        let second = FileStore::new(&path);
        assert_eq!(second.get("device").await.unwrap().as_deref(), Some("abc"));
        assert_eq!(second.get("token").await.unwrap().as_deref(), Some("xyz"));
        assert!(second.get("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = FileStore::new(&path);
        assert!(matches!(store.get("k").await, Err(Error::Storage(_))));
    }
}
