//! Sliding-window visit ledger.
//!
//! # Responsibilities
//! - Record visit timestamps in arrival order
//! - Drop visits older than the retention window from the oldest end
//!
//! # Design Decisions
//! - One short-lived mutex per client, never held across an await
//! - A poisoned lock is recovered; the queue holds plain timestamps

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use crate::clients::record::older_than;

/// Visit timestamps of a single client.
#[derive(Debug, Default)]
pub struct VisitLedger {
    visits: Mutex<VecDeque<SystemTime>>,
}

impl VisitLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn visits(&self) -> MutexGuard<'_, VecDeque<SystemTime>> {
        self.visits.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a visit.
    pub fn record(&self, at: SystemTime) {
        self.visits().push_back(at);
    }

    /// Remove visits older than `keep_alive` relative to `now`.
    ///
    /// Returns the number of visits removed.
    pub fn prune(&self, now: SystemTime, keep_alive: Duration) -> usize {
        let mut visits = self.visits();
        let mut removed = 0;
        while let Some(&oldest) = visits.front() {
            if !older_than(oldest, now, keep_alive) {
                break;
            }
            visits.pop_front();
            removed += 1;
        }
        removed
    }

    /// Number of retained visits.
    pub fn len(&self) -> usize {
        self.visits().len()
    }

    pub fn is_empty(&self) -> bool {
        self.visits().is_empty()
    }

    /// Oldest retained visit.
    pub fn oldest(&self) -> Option<SystemTime> {
        self.visits().front().copied()
    }
}
