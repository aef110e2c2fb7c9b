//! Per-client state record.

use std::time::{Duration, SystemTime};

/// State tracked for one remote address.
///
/// `blocked_until` only carries meaning while `blocked` is set. `entered`
/// moves from false to true once and never back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRecord {
    /// Remote address, the registry key.
    pub address: String,
    pub blocked: bool,
    /// Last admitted request.
    pub last_visit: SystemTime,
    pub blocked_until: SystemTime,
    /// The client passed the minimum-visit gate (or the gate is off).
    pub entered: bool,
    /// When the record was created.
    pub first_seen: SystemTime,
}

impl ClientRecord {
    /// A fresh record for an address seen for the first time at `now`.
    pub fn new(address: impl Into<String>, now: SystemTime) -> Self {
        Self {
            address: address.into(),
            blocked: false,
            last_visit: now,
            blocked_until: SystemTime::UNIX_EPOCH,
            entered: false,
            first_seen: now,
        }
    }

    /// Block the client until `now + duration`.
    pub fn block(&mut self, now: SystemTime, duration: Duration) {
        self.blocked = true;
        self.blocked_until = now.checked_add(duration).unwrap_or(now);
    }

    /// Lift a block. `entered` is left untouched.
    pub fn unblock(&mut self) {
        self.blocked = false;
    }

    /// True once the block window has passed.
    pub fn block_expired(&self, now: SystemTime) -> bool {
        now > self.blocked_until
    }

    /// True if the client has been idle for longer than `lifetime`.
    pub fn idle_beyond(&self, now: SystemTime, lifetime: Duration) -> bool {
        older_than(self.last_visit, now, lifetime)
    }
}

/// `now > since + window`, without overflowing on large windows.
pub(crate) fn older_than(since: SystemTime, now: SystemTime, window: Duration) -> bool {
    now.duration_since(since)
        .map(|age| age > window)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn block_window() {
        let mut record = ClientRecord::new("10.0.0.1", at(100));
        record.block(at(100), Duration::from_secs(5));

        assert!(record.blocked);
        assert_eq!(record.blocked_until, at(105));
        assert!(!record.block_expired(at(105)));
        assert!(record.block_expired(at(106)));

        record.entered = true;
        record.unblock();
        assert!(!record.blocked);
        assert!(record.entered);
    }

    #[test]
    fn idle_is_strictly_greater() {
        let record = ClientRecord::new("10.0.0.1", at(100));
        assert!(!record.idle_beyond(at(110), Duration::from_secs(10)));
        assert!(record.idle_beyond(at(111), Duration::from_secs(10)));
        // Clock stepped backwards.
        assert!(!record.idle_beyond(at(50), Duration::from_secs(10)));
    }
}
