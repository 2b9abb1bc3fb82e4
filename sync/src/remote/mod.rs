//! Remote adapter abstraction.
//!
//! The orchestrator is written against [`RemoteAdapter`] and never against
//! a concrete remote. Two real adapters exist - per-collection REST
//! endpoints ([`RestAdapter`]) and a single opaque file in a cloud-drive
//! style store ([`DriveAdapter`]) - plus an in-memory double for tests.
//! The concrete adapter is chosen at composition time.

mod drive;
mod rest;

pub use drive::{BlobInfo, BlobStore, DriveAdapter, MemoryBlobStore};
pub use rest::RestAdapter;

use crate::error::{Result, SyncError};
use async_trait::async_trait;
use parking_lot::Mutex;
use satchel_engine::{Bundle, Record};
use std::time::Duration;

/// Identifies the remote container holding the shared copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteHandle(pub String);

/// The write granularity a remote supports, which decides how merge
/// results are applied: a single opaque file takes whole snapshots, a
/// REST backend takes one collection at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Granularity {
    /// The remote stores one opaque snapshot; transfers are all-or-nothing.
    #[default]
    Snapshot,
    /// The remote exposes per-collection endpoints; merges are applied
    /// collection by collection.
    PerCollection,
}

/// Capability surface of whatever holds the remote copy.
#[async_trait]
pub trait RemoteAdapter: Send + Sync {
    /// Locate the remote container, creating it on first use.
    async fn ensure_handle(&self) -> Result<RemoteHandle>;

    /// Download the remote snapshot, `None` if nothing exists yet.
    async fn download(&self, handle: &RemoteHandle) -> Result<Option<Bundle>>;

    /// Replace the remote snapshot wholesale.
    async fn upload(&self, handle: &RemoteHandle, bundle: &Bundle) -> Result<()>;

    /// How merge results must be written back.
    fn granularity(&self) -> Granularity {
        Granularity::Snapshot
    }

    /// Replace one remote collection (per-collection remotes only).
    async fn save_collection(
        &self,
        _handle: &RemoteHandle,
        name: &str,
        _records: &[Record],
    ) -> Result<()> {
        Err(SyncError::Protocol(format!(
            "remote does not support per-collection writes (collection {name})"
        )))
    }
}

/// An in-memory remote for tests.
///
/// Holds one bundle, counts calls, and can be told to fail the next N
/// requests or to stall each download (for exercising the in-progress
/// guard).
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    bundle: Mutex<Option<Bundle>>,
    saved_collections: Mutex<Vec<(String, Vec<Record>)>>,
    uploads: Mutex<u32>,
    downloads: Mutex<u32>,
    fail_remaining: Mutex<u32>,
    granularity: Mutex<Granularity>,
    download_delay: Mutex<Option<Duration>>,
}

impl MemoryAdapter {
    /// Create an empty snapshot-granularity remote.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a remote that accepts per-collection writes.
    pub fn per_collection() -> Self {
        let adapter = Self::new();
        *adapter.granularity.lock() = Granularity::PerCollection;
        adapter
    }

    /// Set the bundle the next download returns.
    pub fn set_bundle(&self, bundle: Bundle) {
        *self.bundle.lock() = Some(bundle);
    }

    /// The currently stored bundle.
    pub fn bundle(&self) -> Option<Bundle> {
        self.bundle.lock().clone()
    }

    /// Fail the next `n` adapter calls with a transient network error.
    pub fn fail_next(&self, n: u32) {
        *self.fail_remaining.lock() = n;
    }

    /// Stall every download by `delay`.
    pub fn set_download_delay(&self, delay: Duration) {
        *self.download_delay.lock() = Some(delay);
    }

    /// How many uploads the remote has accepted.
    pub fn upload_count(&self) -> u32 {
        *self.uploads.lock()
    }

    /// How many downloads the remote has served.
    pub fn download_count(&self) -> u32 {
        *self.downloads.lock()
    }

    /// Collections written through `save_collection`, in call order.
    pub fn saved_collections(&self) -> Vec<(String, Vec<Record>)> {
        self.saved_collections.lock().clone()
    }

    fn check_failure(&self) -> Result<()> {
        let mut remaining = self.fail_remaining.lock();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(SyncError::Network("injected failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteAdapter for MemoryAdapter {
    async fn ensure_handle(&self) -> Result<RemoteHandle> {
        self.check_failure()?;
        Ok(RemoteHandle("memory".into()))
    }

    async fn download(&self, _handle: &RemoteHandle) -> Result<Option<Bundle>> {
        let delay = *self.download_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_failure()?;
        *self.downloads.lock() += 1;
        Ok(self.bundle.lock().clone())
    }

    async fn upload(&self, _handle: &RemoteHandle, bundle: &Bundle) -> Result<()> {
        self.check_failure()?;
        *self.uploads.lock() += 1;
        *self.bundle.lock() = Some(bundle.clone());
        Ok(())
    }

    fn granularity(&self) -> Granularity {
        *self.granularity.lock()
    }

    async fn save_collection(
        &self,
        _handle: &RemoteHandle,
        name: &str,
        records: &[Record],
    ) -> Result<()> {
        self.check_failure()?;
        self.saved_collections
            .lock()
            .push((name.to_string(), records.to_vec()));
        Ok(())
    }
}
