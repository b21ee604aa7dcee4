//! Classification cycle bookkeeping so late results from abandoned cycles are dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Handle for one capture-classify-lookup cycle.
#[derive(Debug, Clone)]
pub struct CycleTicket {
    id: u64,
    token: CancellationToken,
}

impl CycleTicket {
    /// Monotonic cycle number.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Cancelled once a newer cycle begins.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Hands out tickets and cancels the previous one whenever a new cycle begins.
#[derive(Debug, Default)]
pub struct CycleTracker {
    latest: AtomicU64,
    current: Mutex<Option<CancellationToken>>,
}

impl CycleTracker {
    /// Create a tracker with no cycle in flight.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new cycle, superseding whatever was in flight.
    pub fn begin(&self) -> CycleTicket {
        let token = CancellationToken::new();
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = current.replace(token.clone()) {
            previous.cancel();
        }
        let id = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        drop(current);
        debug!(cycle = id, "cycle started");
        CycleTicket { id, token }
    }

    /// Whether `ticket` still belongs to the newest cycle.
    #[must_use]
    pub fn is_current(&self, ticket: &CycleTicket) -> bool {
        !ticket.token.is_cancelled() && self.latest.load(Ordering::SeqCst) == ticket.id
    }

    /// Abandon the cycle in flight, e.g. when the viewer goes away.
    pub fn cancel_all(&self) {
        if let Some(previous) = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            previous.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_cycle_supersedes_the_old_one() {
        let tracker = CycleTracker::new();
        let first = tracker.begin();
        assert!(tracker.is_current(&first));

        let second = tracker.begin();
        assert!(first.token().is_cancelled());
        assert!(!tracker.is_current(&first));
        assert!(tracker.is_current(&second));
        assert!(second.id() > first.id());
    }

    #[test]
    fn cancel_all_abandons_the_current_cycle() {
        let tracker = CycleTracker::new();
        let ticket = tracker.begin();
        tracker.cancel_all();
        assert!(!tracker.is_current(&ticket));
    }
}
