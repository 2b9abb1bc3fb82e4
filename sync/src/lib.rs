//! # Satchel Sync
//!
//! Offline-first synchronization for Satchel business documents.
//!
//! This crate wraps the pure [`satchel_engine`] core with everything a
//! running app needs to keep its local store consistent with a remote
//! copy over intermittent connectivity:
//!
//! - [`SyncOrchestrator`] drives one pass at a time: download the remote
//!   snapshot, bundle the local store, merge, apply both ways, persist
//!   the watermark, and publish [`SyncEvent`]s along the way.
//! - [`RemoteAdapter`] abstracts whatever holds the shared copy. Two real
//!   adapters ship: per-collection REST endpoints ([`RestAdapter`]) and a
//!   single JSON file in a cloud-drive style store ([`DriveAdapter`]).
//! - [`NetworkController`] turns connectivity signals and a periodic
//!   timer into sync triggers; the orchestrator's guards make overlapping
//!   triggers harmless.
//! - [`RetryBreaker`] stops automatic attempts after repeated failures
//!   until a cooldown elapses, with a manual reset for operators.
//!
//! ## Quick Start
//!
//! ```rust
//! use satchel_engine::Store;
//! use satchel_sync::{
//!     DriveAdapter, MemoryBlobStore, NetworkController, SyncConfig, SyncOrchestrator,
//! };
//! use parking_lot::RwLock;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = Arc::new(RwLock::new(Store::new()));
//! let remote = Arc::new(DriveAdapter::new(MemoryBlobStore::new(), "satchel-data.json"));
//! let orchestrator = Arc::new(SyncOrchestrator::new(
//!     SyncConfig::default(),
//!     store,
//!     remote,
//! ));
//!
//! let controller = NetworkController::new(orchestrator.clone());
//! controller.set_online(true);
//!
//! orchestrator.sync_all().await.unwrap();
//! # }
//! ```

pub mod breaker;
pub mod config;
pub mod error;
pub mod events;
pub mod network;
pub mod orchestrator;
pub mod remote;

// Re-export main types at crate root
pub use breaker::RetryBreaker;
pub use config::{ConfigError, SyncConfig};
pub use error::{Result, SyncError};
pub use events::{EventBus, SyncEvent};
pub use network::NetworkController;
pub use orchestrator::{
    PassOutcome, SharedStore, SyncOrchestrator, SyncReport, SyncState, SyncStatus,
};
pub use remote::{
    BlobInfo, BlobStore, DriveAdapter, Granularity, MemoryAdapter, MemoryBlobStore, RemoteAdapter,
    RemoteHandle, RestAdapter,
};
