//! The sync orchestrator: drives one synchronization pass at a time.
//!
//! A pass downloads the remote snapshot, bundles the local store, merges,
//! applies the result on both sides, and persists the watermark. The
//! orchestrator owns the only [`SyncState`] instance and is its only
//! writer; `in_progress` doubles as a non-reentrant lock, so however many
//! triggers fire at once (timer, reconnect, manual), at most one pass runs
//! and every other caller gets `Ok(None)` back immediately.

use crate::breaker::RetryBreaker;
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::events::{EventBus, SyncEvent};
use crate::remote::{Granularity, RemoteAdapter, RemoteHandle};
use parking_lot::{Mutex, RwLock};
use satchel_engine::{
    bundle_direction, merge_collection, Bundle, Direction, MergeStats, Record, Store, Timestamp,
};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// The store as shared by UI code and the orchestrator.
///
/// Bundling takes the read lock so a pass never sees a half-applied edit.
pub type SharedStore = Arc<RwLock<Store>>;

/// Mutable synchronization state, one instance per orchestrator.
///
/// Mutated exclusively by the orchestrator and the network controller
/// through it; never replaced, only reset piecemeal.
#[derive(Debug)]
pub struct SyncState {
    /// A pass is currently between its guard and its cleanup
    pub in_progress: bool,
    /// Last connectivity signal received
    pub online: bool,
    /// Watermark of the last successful pass
    pub last_sync_time: Option<Timestamp>,
    /// Attempt limiter for failed passes
    pub breaker: RetryBreaker,
}

/// A cloneable view of [`SyncState`] for UI badges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub in_progress: bool,
    pub online: bool,
    pub last_sync_time: Option<Timestamp>,
    pub consecutive_failures: u32,
    pub circuit_open: bool,
}

/// What a successful pass did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PassOutcome {
    /// The local snapshot was newer and was uploaded wholesale.
    Pushed { records: usize },
    /// The remote snapshot was newer and replaced the local store.
    Pulled { records: usize },
    /// Collections were merged record by record and written both ways.
    Merged { collections: usize, stats: MergeStats },
    /// Both snapshots carried the same timestamp.
    NoChange,
}

/// Result of a successful pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub outcome: PassOutcome,
    /// The persisted watermark
    pub last_sync_time: Timestamp,
    pub duration: Duration,
}

/// Clears `in_progress` on every exit path, panics and early returns
/// included.
struct InProgressGuard<'a> {
    state: &'a Mutex<SyncState>,
}

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.state.lock().in_progress = false;
    }
}

/// Drives synchronization between the shared store and one remote.
pub struct SyncOrchestrator {
    config: SyncConfig,
    store: SharedStore,
    remote: Arc<dyn RemoteAdapter>,
    state: Mutex<SyncState>,
    events: EventBus,
}

impl SyncOrchestrator {
    /// Create an orchestrator over `store` and `remote`.
    ///
    /// The watermark is loaded from the store's settings; connectivity is
    /// assumed until the network controller reports otherwise.
    pub fn new(config: SyncConfig, store: SharedStore, remote: Arc<dyn RemoteAdapter>) -> Self {
        let last_sync_time = store.read().last_sync_time();
        let breaker = RetryBreaker::new(config.failure_threshold, config.breaker_cooldown);
        Self {
            state: Mutex::new(SyncState {
                in_progress: false,
                online: true,
                last_sync_time,
                breaker,
            }),
            config,
            store,
            remote,
            events: EventBus::default(),
        }
    }

    /// The shared store this orchestrator syncs.
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// The configuration in effect.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Subscribe to sync and network events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// A point-in-time view of the sync state.
    pub fn status(&self) -> SyncStatus {
        let state = self.state.lock();
        SyncStatus {
            in_progress: state.in_progress,
            online: state.online,
            last_sync_time: state.last_sync_time,
            consecutive_failures: state.breaker.consecutive_failures(),
            circuit_open: state.breaker.is_open(Instant::now()),
        }
    }

    /// Feed a connectivity transition; returns whether anything changed.
    ///
    /// Coming back online clears the failure counter so the next pass is
    /// attempted immediately.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = {
            let mut state = self.state.lock();
            if state.online == online {
                false
            } else {
                state.online = online;
                if online {
                    state.breaker.reset();
                }
                true
            }
        };
        if changed {
            self.events.emit(if online {
                SyncEvent::NetworkConnected
            } else {
                SyncEvent::NetworkDisconnected
            });
        }
        changed
    }

    /// Clear the circuit breaker immediately (operator/debug use).
    pub fn reset_breaker(&self) {
        self.state.lock().breaker.reset();
    }

    /// Run one synchronization pass.
    ///
    /// Returns `Ok(None)` without doing anything when a pass is already
    /// in flight, the engine is offline, or the circuit is open - safe to
    /// call from as many triggers as fire. A failed pass leaves the local
    /// store on its last known good state.
    pub async fn sync_all(&self) -> Result<Option<SyncReport>> {
        {
            let mut state = self.state.lock();
            if state.in_progress {
                tracing::debug!("sync pass already in progress");
                return Ok(None);
            }
            if !state.online {
                tracing::debug!("offline, not starting a sync pass");
                return Ok(None);
            }
            if state.breaker.is_open(Instant::now()) {
                tracing::debug!("circuit open, not starting a sync pass");
                return Ok(None);
            }
            state.in_progress = true;
        }
        let _guard = InProgressGuard { state: &self.state };
        self.events.emit(SyncEvent::SyncStarted);

        match self.run_pass().await {
            Ok(report) => {
                {
                    let mut state = self.state.lock();
                    state.breaker.record_success();
                    state.last_sync_time = Some(report.last_sync_time);
                }
                tracing::info!(
                    outcome = ?report.outcome,
                    last_sync_time = report.last_sync_time,
                    "sync pass completed"
                );
                self.events.emit(SyncEvent::SyncCompleted {
                    last_sync_time: report.last_sync_time,
                });
                Ok(Some(report))
            }
            Err(err) => {
                let retries = {
                    let mut state = self.state.lock();
                    if !err.is_auth() {
                        state.breaker.record_failure(Instant::now());
                    }
                    state.breaker.consecutive_failures()
                };
                tracing::warn!(error = %err, retries, "sync pass failed");
                self.events.emit(SyncEvent::SyncError {
                    message: err.to_string(),
                    retries,
                });
                Err(err)
            }
        }
    }

    async fn run_pass(&self) -> Result<SyncReport> {
        let started = Instant::now();

        let handle = self.remote.ensure_handle().await?;
        let remote_bundle = self.remote.download(&handle).await?;

        let (outcome, last_sync_time) = match self.remote.granularity() {
            Granularity::Snapshot => self.apply_snapshot(&handle, remote_bundle).await?,
            Granularity::PerCollection => self.apply_collections(&handle, remote_bundle).await?,
        };

        self.store.write().set_last_sync_time(last_sync_time);

        Ok(SyncReport {
            outcome,
            last_sync_time,
            duration: started.elapsed(),
        })
    }

    /// Whole-snapshot reconciliation: the newer bundle replaces the other.
    async fn apply_snapshot(
        &self,
        handle: &RemoteHandle,
        remote: Option<Bundle>,
    ) -> Result<(PassOutcome, Timestamp)> {
        let local = self.store.read().to_bundle();

        match bundle_direction(&local, remote.as_ref()) {
            Direction::Push => {
                let records = local.record_count();
                tracing::debug!(records, "local snapshot is newer, pushing");
                self.remote.upload(handle, &local).await?;
                Ok((PassOutcome::Pushed { records }, local.created_at))
            }
            Direction::Pull => {
                let Some(remote) = remote else {
                    return Err(SyncError::Protocol(
                        "pull decided without a remote snapshot".into(),
                    ));
                };
                let records = remote.record_count();
                tracing::debug!(records, "remote snapshot is newer, pulling");
                let created_at = remote.created_at;
                self.store.write().replace_from(&remote);
                Ok((PassOutcome::Pulled { records }, created_at))
            }
            Direction::Noop => {
                tracing::debug!("snapshots agree, nothing to transfer");
                Ok((PassOutcome::NoChange, local.created_at))
            }
        }
    }

    /// Record-level reconciliation, one collection at a time.
    ///
    /// Each collection is merged, written back locally, then saved
    /// remotely before the next one starts: all-or-nothing per collection.
    async fn apply_collections(
        &self,
        handle: &RemoteHandle,
        remote: Option<Bundle>,
    ) -> Result<(PassOutcome, Timestamp)> {
        let remote = remote.unwrap_or_else(|| Bundle::new(0));
        let local = self.store.read().to_bundle();

        let names: BTreeSet<String> = local
            .collections
            .keys()
            .chain(remote.collections.keys())
            .cloned()
            .collect();

        let mut stats = MergeStats::default();
        for name in &names {
            let merged = merge_collection(local.collection(name), remote.collection(name));
            stats.absorb(&merged.stats);

            let records: Vec<Record> = merged.records.values().cloned().collect();
            self.store.write().apply_merged(name, merged.records);
            self.remote.save_collection(handle, name, &records).await?;
        }

        Ok((
            PassOutcome::Merged {
                collections: names.len(),
                stats,
            },
            now_ms(),
        ))
    }
}

/// Wall clock in milliseconds since the epoch.
pub(crate) fn now_ms() -> Timestamp {
    chrono::Utc::now().timestamp_millis() as Timestamp
}
