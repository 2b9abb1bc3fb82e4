//! Typed sync events for UI and observability collaborators.
//!
//! Fire-and-forget: the orchestrator publishes to a broadcast channel and
//! never waits on subscribers; a send with nobody listening is not an
//! error.

use satchel_engine::Timestamp;
use tokio::sync::broadcast;

/// Events published over the lifetime of the sync subsystem.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A pass made it past the guards and is running.
    SyncStarted,
    /// A pass finished; carries the new watermark.
    SyncCompleted { last_sync_time: Timestamp },
    /// A pass failed; carries the consecutive-failure count so far.
    SyncError { message: String, retries: u32 },
    /// Connectivity came back.
    NetworkConnected,
    /// Connectivity went away.
    NetworkDisconnected,
}

/// Broadcast fan-out for [`SyncEvent`]s.
#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to whoever is listening.
    pub fn emit(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }
}
