//! Single-file blob adapter.
//!
//! The whole store travels as one JSON file in a cloud-drive style
//! backend. The drive itself is reached through the minimal [`BlobStore`]
//! capability (list, create, read, write), so the adapter works against
//! any provider that can hold named files; [`MemoryBlobStore`] is the
//! in-process implementation used in tests and demos.

use crate::error::{Result, SyncError};
use crate::remote::{RemoteAdapter, RemoteHandle};
use async_trait::async_trait;
use parking_lot::Mutex;
use satchel_engine::Bundle;
use std::collections::HashMap;

/// A file the blob store knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobInfo {
    pub id: String,
    pub name: String,
}

/// Minimal capability surface of a cloud-drive-like store.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Files visible to this app.
    async fn list(&self) -> Result<Vec<BlobInfo>>;

    /// Create an empty file, returning its id.
    async fn create(&self, name: &str) -> Result<String>;

    /// Read a file's content; `None` if the file does not exist.
    async fn read(&self, id: &str) -> Result<Option<String>>;

    /// Overwrite a file's content.
    async fn write(&self, id: &str, content: &str) -> Result<()>;
}

/// Remote adapter storing the snapshot as a single opaque file.
#[derive(Debug)]
pub struct DriveAdapter<B: BlobStore> {
    blobs: B,
    file_name: String,
}

impl<B: BlobStore> DriveAdapter<B> {
    /// Create an adapter keeping the snapshot in `file_name`.
    pub fn new(blobs: B, file_name: impl Into<String>) -> Self {
        Self {
            blobs,
            file_name: file_name.into(),
        }
    }
}

#[async_trait]
impl<B: BlobStore> RemoteAdapter for DriveAdapter<B> {
    async fn ensure_handle(&self) -> Result<RemoteHandle> {
        let existing = self
            .blobs
            .list()
            .await?
            .into_iter()
            .find(|blob| blob.name == self.file_name);
        match existing {
            Some(blob) => Ok(RemoteHandle(blob.id)),
            None => {
                tracing::info!(file = %self.file_name, "creating remote data file");
                let id = self.blobs.create(&self.file_name).await?;
                Ok(RemoteHandle(id))
            }
        }
    }

    async fn download(&self, handle: &RemoteHandle) -> Result<Option<Bundle>> {
        let content = match self.blobs.read(&handle.0).await? {
            None => return Ok(None),
            Some(content) if content.is_empty() => return Ok(None),
            Some(content) => content,
        };
        let decoded = Bundle::from_json(&content)
            .map_err(|err| SyncError::Protocol(format!("unreadable remote snapshot: {err}")))?;
        if decoded.skipped > 0 {
            tracing::warn!(
                skipped = decoded.skipped,
                "dropped malformed records from remote snapshot"
            );
        }
        Ok(Some(decoded.bundle))
    }

    async fn upload(&self, handle: &RemoteHandle, bundle: &Bundle) -> Result<()> {
        let content = bundle.to_json()?;
        self.blobs.write(&handle.0, &content).await
    }
}

/// An in-memory [`BlobStore`].
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, (String, String)>>,
}

impl MemoryBlobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn list(&self) -> Result<Vec<BlobInfo>> {
        Ok(self
            .blobs
            .lock()
            .iter()
            .map(|(id, (name, _))| BlobInfo {
                id: id.clone(),
                name: name.clone(),
            })
            .collect())
    }

    async fn create(&self, name: &str) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.blobs
            .lock()
            .insert(id.clone(), (name.to_string(), String::new()));
        Ok(id)
    }

    async fn read(&self, id: &str) -> Result<Option<String>> {
        Ok(self.blobs.lock().get(id).map(|(_, content)| content.clone()))
    }

    async fn write(&self, id: &str, content: &str) -> Result<()> {
        let mut blobs = self.blobs.lock();
        match blobs.get_mut(id) {
            Some((_, stored)) => {
                *stored = content.to_string();
                Ok(())
            }
            None => Err(SyncError::Protocol(format!("no such blob: {id}"))),
        }
    }
}

// Blob stores are usually shared between an adapter and test assertions.
#[async_trait]
impl<B: BlobStore> BlobStore for std::sync::Arc<B> {
    async fn list(&self) -> Result<Vec<BlobInfo>> {
        self.as_ref().list().await
    }

    async fn create(&self, name: &str) -> Result<String> {
        self.as_ref().create(name).await
    }

    async fn read(&self, id: &str) -> Result<Option<String>> {
        self.as_ref().read(id).await
    }

    async fn write(&self, id: &str, content: &str) -> Result<()> {
        self.as_ref().write(id, content).await
    }
}
