use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::clients::ClientSnapshot;
use crate::http::GateStatus;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub uptime_secs: u64,
    pub tracked_clients: usize,
    pub blocked_clients: usize,
    pub active_connections: u64,
    pub available_slots: usize,
    pub max_concurrency: usize,
}

#[derive(Debug, Serialize)]
pub struct ClientView {
    pub address: String,
    pub blocked: bool,
    pub entered: bool,
    pub visits: usize,
    /// Unix seconds.
    pub first_seen: u64,
    pub last_visit: u64,
    /// Present only while blocked.
    pub blocked_until: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct UnblockOutcome {
    pub address: String,
    /// False if the client was not blocked.
    pub was_blocked: bool,
}

fn unix_secs(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

impl From<ClientSnapshot> for ClientView {
    fn from(snapshot: ClientSnapshot) -> Self {
        let record = snapshot.record;
        Self {
            blocked_until: record.blocked.then(|| unix_secs(record.blocked_until)),
            first_seen: unix_secs(record.first_seen),
            last_visit: unix_secs(record.last_visit),
            address: record.address,
            blocked: record.blocked,
            entered: record.entered,
            visits: snapshot.visits,
        }
    }
}

pub fn status(state: &GateStatus) -> SystemStatus {
    let snapshot = state.registry.snapshot();
    SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        tracked_clients: snapshot.len(),
        blocked_clients: snapshot.iter().filter(|c| c.record.blocked).count(),
        active_connections: state.tracker.active_count(),
        available_slots: state.limiter.available(),
        max_concurrency: state.limiter.capacity(),
    }
}

/// All tracked clients, sorted by address.
pub fn clients(state: &GateStatus) -> Vec<ClientView> {
    let mut views: Vec<ClientView> = state
        .registry
        .snapshot()
        .into_iter()
        .map(ClientView::from)
        .collect();
    views.sort_by(|a, b| a.address.cmp(&b.address));
    views
}

/// Lift a block by hand. `None` if the address is unknown.
pub fn unblock(state: &GateStatus, address: &str) -> Option<UnblockOutcome> {
    let was_blocked = state.registry.update(address, |record, _| {
        let was_blocked = record.blocked;
        record.unblock();
        was_blocked
    })?;

    if was_blocked {
        tracing::info!(client = %address, "Client unblocked by admin");
    }
    Some(UnblockOutcome {
        address: address.to_string(),
        was_blocked,
    })
}
