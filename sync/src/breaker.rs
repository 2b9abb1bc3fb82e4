//! Bounded-retry circuit breaker.
//!
//! One generic attempt limiter shared by every subsystem that must stop
//! hammering a failing dependency: synchronization passes here, and the
//! same shape fits login attempts or settings fetches. Counts consecutive
//! failures; at the threshold the circuit opens for a cooldown window.
//! After the window one probe is allowed: success resets the counter,
//! another failure re-opens the circuit.

use std::time::{Duration, Instant};

/// Attempt limiter parameterized by threshold and cooldown.
///
/// Time is passed in by the caller so the breaker itself stays clock-free
/// and testable.
#[derive(Debug, Clone)]
pub struct RetryBreaker {
    threshold: u32,
    cooldown: Duration,
    failures: u32,
    open_until: Option<Instant>,
}

impl RetryBreaker {
    /// Create a closed breaker.
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold,
            cooldown,
            failures: 0,
            open_until: None,
        }
    }

    /// Whether attempts are currently suppressed.
    pub fn is_open(&self, now: Instant) -> bool {
        matches!(self.open_until, Some(until) if now < until)
    }

    /// Record a failed attempt, opening the circuit at the threshold.
    pub fn record_failure(&mut self, now: Instant) {
        self.failures = self.failures.saturating_add(1);
        if self.failures >= self.threshold {
            self.open_until = Some(now + self.cooldown);
        }
    }

    /// Record a successful attempt, closing the circuit.
    pub fn record_success(&mut self) {
        self.failures = 0;
        self.open_until = None;
    }

    /// Clear the breaker immediately (operator/debug use).
    pub fn reset(&mut self) {
        self.record_success();
    }

    /// Consecutive failures so far.
    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    /// When the circuit closes again, if it is open.
    pub fn open_until(&self) -> Option<Instant> {
        self.open_until
    }
}
