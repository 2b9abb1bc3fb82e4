//! Network controller: connectivity transitions and the periodic timer.
//!
//! Platform glue feeds connectivity signals in through [`set_online`];
//! the controller reacts by resetting the failure counter and kicking off
//! a pass on reconnect, and by letting an in-flight pass fail naturally on
//! disconnect (no forced cancellation - the next network call errors and
//! the failure path runs). A background timer retries on a fixed interval
//! while online; the orchestrator's own guards make overlapping triggers
//! harmless.
//!
//! [`set_online`]: NetworkController::set_online

use crate::orchestrator::SyncOrchestrator;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Reacts to connectivity changes and drives the periodic sync timer.
pub struct NetworkController {
    orchestrator: Arc<SyncOrchestrator>,
    interval: Duration,
}

impl NetworkController {
    /// Create a controller using the orchestrator's configured interval.
    pub fn new(orchestrator: Arc<SyncOrchestrator>) -> Self {
        let interval = orchestrator.config().sync_interval;
        Self {
            orchestrator,
            interval,
        }
    }

    /// Create a controller with an explicit timer interval.
    pub fn with_interval(orchestrator: Arc<SyncOrchestrator>, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval,
        }
    }

    /// Feed a platform connectivity signal.
    ///
    /// On an offline-to-online transition the failure counter is cleared
    /// and a pass is triggered immediately; must be called from within a
    /// tokio runtime for that trigger to be spawned.
    pub fn set_online(&self, online: bool) {
        let changed = self.orchestrator.set_online(online);
        if !changed || !online {
            return;
        }

        tracing::info!("connectivity restored, triggering sync");
        let orchestrator = Arc::clone(&self.orchestrator);
        tokio::spawn(async move {
            if let Err(err) = orchestrator.sync_all().await {
                tracing::warn!(error = %err, "reconnect sync failed");
            }
        });
    }

    /// Spawn the periodic timer loop; aborts when the handle is dropped
    /// or aborted.
    pub fn spawn_timer(&self) -> JoinHandle<()> {
        let orchestrator = Arc::clone(&self.orchestrator);
        let interval = self.interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so the timer only
            // covers the steady state.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(err) = orchestrator.sync_all().await {
                    tracing::warn!(error = %err, "periodic sync failed");
                }
            }
        })
    }
}
