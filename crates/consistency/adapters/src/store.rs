use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use flowsync_types::ContentId;
use tracing::debug;

use crate::error::AdapterError;

/// Content-addressable store.
///
/// Identical bytes always map to the same [`ContentId`], so `put` is
/// idempotent.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store bytes and return their content address.
    async fn put(&self, bytes: Vec<u8>) -> Result<ContentId, AdapterError>;

    /// Fetch the bytes stored under `id`.
    async fn get(&self, id: &ContentId) -> Result<Vec<u8>, AdapterError>;

    async fn contains(&self, id: &ContentId) -> Result<bool, AdapterError>;
}

/// Content address of `bytes`: hex BLAKE3.
pub fn content_id_of(bytes: &[u8]) -> ContentId {
    ContentId::new(blake3::hash(bytes).to_hex().to_string())
}

/// In-memory store for tests and single-process deployments.
#[derive(Clone, Default)]
pub struct InMemoryContentStore {
    blobs: Arc<RwLock<HashMap<ContentId, Vec<u8>>>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn put(&self, bytes: Vec<u8>) -> Result<ContentId, AdapterError> {
        let id = content_id_of(&bytes);
        let mut blobs = self
            .blobs
            .write()
            .map_err(|e| AdapterError::Io(std::io::Error::other(format!("lock poisoned: {}", e))))?;
        blobs.entry(id.clone()).or_insert(bytes);
        Ok(id)
    }

    async fn get(&self, id: &ContentId) -> Result<Vec<u8>, AdapterError> {
        let blobs = self
            .blobs
            .read()
            .map_err(|e| AdapterError::Io(std::io::Error::other(format!("lock poisoned: {}", e))))?;
        blobs
            .get(id)
            .cloned()
            .ok_or_else(|| AdapterError::NotFound(id.clone()))
    }

    async fn contains(&self, id: &ContentId) -> Result<bool, AdapterError> {
        let blobs = self
            .blobs
            .read()
            .map_err(|e| AdapterError::Io(std::io::Error::other(format!("lock poisoned: {}", e))))?;
        Ok(blobs.contains_key(id))
    }
}

/// File-backed store: blobs live at `<root>/<id[..2]>/<id[2..]>`.
///
/// Writes go to a temporary file first and are renamed into place; reads
/// re-hash the blob and reject content that no longer matches its address.
pub struct FileContentStore {
    root: PathBuf,
}

impl FileContentStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, AdapterError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, id: &ContentId) -> Option<PathBuf> {
        let hex = id.as_str();
        if hex.len() < 3 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(self.root.join(&hex[..2]).join(&hex[2..]))
    }
}

#[async_trait]
impl ContentStore for FileContentStore {
    async fn put(&self, bytes: Vec<u8>) -> Result<ContentId, AdapterError> {
        let id = content_id_of(&bytes);
        let path = self
            .blob_path(&id)
            .ok_or_else(|| AdapterError::NotFound(id.clone()))?;
        if tokio::fs::try_exists(&path).await? {
            return Ok(id);
        }
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(content_id = %id, size = bytes.len(), "Blob written");
        Ok(id)
    }

    async fn get(&self, id: &ContentId) -> Result<Vec<u8>, AdapterError> {
        let path = self
            .blob_path(id)
            .ok_or_else(|| AdapterError::NotFound(id.clone()))?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AdapterError::NotFound(id.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        let computed = content_id_of(&bytes);
        if &computed != id {
            return Err(AdapterError::Integrity {
                id: id.clone(),
                computed: computed.0,
            });
        }
        Ok(bytes)
    }

    async fn contains(&self, id: &ContentId) -> Result<bool, AdapterError> {
        match self.blob_path(id) {
            Some(path) => Ok(tokio::fs::try_exists(&path).await?),
            None => Ok(false),
        }
    }
}
