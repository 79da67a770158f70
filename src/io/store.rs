//! Persistent byte store for downloaded tiles.
//!
//! Keys are relative slash-separated paths such as `12/2048/1361.png`.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use crate::error::StoreError;

/// Trait for durable byte storage keyed by string.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Read the bytes stored under `key`, or `None` if absent.
    async fn read(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    /// Store `data` under `key`, replacing any previous value.
    async fn write(&self, key: &str, data: &[u8]) -> Result<(), StoreError>;

    /// Delete the value under `key`. Succeeds if the key is absent.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: PersistentStore + ?Sized> PersistentStore for Arc<T> {
    async fn read(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        (**self).read(key).await
    }

    async fn write(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        (**self).write(key, data).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key).await
    }
}

// =============================================================================
// FileStore
// =============================================================================

/// Sequence number for temporary file names, unique within the process.
static TMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Filesystem-backed store rooted at a directory.
///
/// Writes go to a uniquely named temporary sibling file and are renamed into
/// place, so a reader never sees a half-written tile and concurrent writers
/// of one key never share a temporary file.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The store root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to a path under the root.
    ///
    /// Rejects empty keys, absolute paths and any `..` component.
    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(key);
        let is_plain = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));

        if !is_plain {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

fn io_error(key: &str, err: std::io::Error) -> StoreError {
    StoreError::Io {
        key: key.to_string(),
        message: err.to_string(),
    }
}

#[async_trait]
impl PersistentStore for FileStore {
    async fn read(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(key, e)),
        }
    }

    async fn write(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(key, e))?;
        }

        let sequence = TMP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let mut tmp = path.clone().into_os_string();
        tmp.push(format!(".{}.{}.tmp", std::process::id(), sequence));
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, data)
            .await
            .map_err(|e| io_error(key, e))?;

        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_error(key, e));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(key, e)),
        }
    }
}

// =============================================================================
// MemoryStore
// =============================================================================

/// In-process store backed by a map. Contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Bytes>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl PersistentStore for MemoryStore {
    async fn read(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn write(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), Bytes::copy_from_slice(data));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
