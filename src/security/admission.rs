//! Per-request admission decisions.
//!
//! # Responsibilities
//! - Reject oversized requests before touching client state
//! - Reject requests from blocked clients without recording a visit
//! - Record a visit and refresh `last_visit` for admitted requests
//!
//! # Design Decisions
//! - The visit is filed after the block check, so a blocked client cannot
//!   grow its ledger by hammering the server
//! - `last_visit` is written with a whole-record replace; concurrent
//!   requests from one client may overwrite each other's timestamp

use std::sync::Arc;
use std::time::SystemTime;

use crate::clients::ClientRegistry;
use crate::config::SharedPolicy;
use crate::security::limits::DeclaredLength;

/// Decision for one incoming request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admit,
    RejectBlocked,
    RejectOversized,
}

impl Admission {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Admission::Admit => "admit",
            Admission::RejectBlocked => "reject_blocked",
            Admission::RejectOversized => "reject_oversized",
        }
    }
}

/// Admission checks shared by every connection of a server.
#[derive(Clone)]
pub struct AdmissionGate {
    registry: Arc<ClientRegistry>,
    policy: SharedPolicy,
}

impl AdmissionGate {
    pub fn new(registry: Arc<ClientRegistry>, policy: SharedPolicy) -> Self {
        Self { registry, policy }
    }

    /// Decide whether a request from `address` may proceed, recording the
    /// visit if it does.
    pub fn admit(&self, address: &str, declared: DeclaredLength, now: SystemTime) -> Admission {
        let max_bytes = self.policy.load().max_request_bytes;
        if declared.exceeds(max_bytes) {
            return Admission::RejectOversized;
        }

        let mut client = self.registry.get_or_create(address, now);
        if client.record.blocked {
            return Admission::RejectBlocked;
        }

        client.ledger.record(now);
        client.record.last_visit = now;
        self.registry.replace(client.record);
        Admission::Admit
    }

    /// Current body size limit.
    pub fn max_request_bytes(&self) -> u64 {
        self.policy.load().max_request_bytes
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::policy::shared_policy;
    use crate::config::GateConfig;
    use std::time::Duration;

    fn gate(max_request_bytes: u64) -> AdmissionGate {
        let mut config = GateConfig::default();
        config.server.max_request_bytes = max_request_bytes;
        AdmissionGate::new(Arc::new(ClientRegistry::new()), shared_policy(&config))
    }

    #[test]
    fn admitted_request_records_visit() {
        let gate = gate(1024);
        let now = SystemTime::now();

        assert_eq!(gate.admit("10.0.0.1", DeclaredLength::Bytes(10), now), Admission::Admit);
        let client = gate.registry().get("10.0.0.1").unwrap();
        assert_eq!(client.ledger.len(), 1);
        assert_eq!(client.record.last_visit, now);
    }

    #[test]
    fn blocked_client_is_rejected_without_visit() {
        let gate = gate(1024);
        let now = SystemTime::now();
        gate.admit("10.0.0.2", DeclaredLength::Absent, now);
        gate.registry()
            .update("10.0.0.2", |record, _| record.block(now, Duration::from_secs(60)));

        let later = now + Duration::from_secs(1);
        assert_eq!(
            gate.admit("10.0.0.2", DeclaredLength::Absent, later),
            Admission::RejectBlocked
        );
        let client = gate.registry().get("10.0.0.2").unwrap();
        assert_eq!(client.ledger.len(), 1);
        assert_eq!(client.record.last_visit, now);
    }

    #[test]
    fn oversized_request_is_not_tracked() {
        let gate = gate(100);
        assert_eq!(
            gate.admit("10.0.0.3", DeclaredLength::Bytes(101), SystemTime::now()),
            Admission::RejectOversized
        );
        assert!(gate.registry().get("10.0.0.3").is_none());
    }

    #[test]
    fn policy_swap_applies_to_next_request() {
        let mut config = GateConfig::default();
        config.server.max_request_bytes = 100;
        let policy = shared_policy(&config);
        let gate = AdmissionGate::new(Arc::new(ClientRegistry::new()), policy.clone());

        assert_eq!(
            gate.admit("10.0.0.4", DeclaredLength::Bytes(500), SystemTime::now()),
            Admission::RejectOversized
        );

        config.server.max_request_bytes = 1000;
        policy.store(Arc::new(crate::config::GatePolicy::from_config(&config)));
        assert_eq!(
            gate.admit("10.0.0.4", DeclaredLength::Bytes(500), SystemTime::now()),
            Admission::Admit
        );
    }
}
