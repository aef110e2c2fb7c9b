//! Background maintenance of client state.
//!
//! # Responsibilities
//! - Prune every visit ledger on a fixed cadence
//! - Lift expired blocks
//! - Forget clients idle beyond their lifetime
//! - Apply the entry gate and the maximum-visit gate
//!
//! # Rule Order (per client, first match wins)
//! ```text
//! prune (always)
//!   → blocked?      expired → unblock; otherwise leave alone
//!   → idle?         evict record and ledger
//!   → entry gate:   enough visits → entered; window passed → block
//!   → maximum gate: too many visits → block
//! ```
//!
//! # Design Decisions
//! - Runs on its own task, outside the admission limiter
//! - Works over a snapshot of addresses; each client is updated under its key lock
//! - A panicking tick is logged and the loop carries on

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::clients::ledger::VisitLedger;
use crate::clients::record::{older_than, ClientRecord};
use crate::clients::registry::ClientRegistry;
use crate::config::{SharedPolicy, ThrottleConfig};
use crate::observability::metrics;

/// Why a client was blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// Did not reach `visits_minimum` within the entry window.
    EntryTimeout,
    /// Exceeded `visits_maximum` within the retention window.
    TooManyVisits,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockReason::EntryTimeout => "entry_timeout",
            BlockReason::TooManyVisits => "too_many_visits",
        }
    }
}

/// Outcome of evaluating one client in a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    None,
    Unblocked,
    /// The client is idle and should be removed.
    Evict,
    Entered,
    Blocked(BlockReason),
}

/// Counters for one sweep tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Clients examined.
    pub visited: usize,
    /// Visits dropped from ledgers.
    pub pruned: usize,
    pub unblocked: usize,
    pub evicted: usize,
    pub entered: usize,
    pub blocked: usize,
}

/// Apply the maintenance rules to one client.
///
/// Mutates the record for every transition except eviction, which the
/// caller carries out on the registry.
pub fn evaluate(
    record: &mut ClientRecord,
    ledger: &VisitLedger,
    policy: &ThrottleConfig,
    now: SystemTime,
) -> (usize, Transition) {
    let pruned = ledger.prune(now, policy.keep_alive());

    if record.blocked {
        if record.block_expired(now) {
            record.unblock();
            return (pruned, Transition::Unblocked);
        }
        return (pruned, Transition::None);
    }

    if record.idle_beyond(now, policy.client_lifetime()) {
        return (pruned, Transition::Evict);
    }

    if policy.visits_minimum > 0 && !record.entered {
        if ledger.len() >= policy.visits_minimum as usize {
            record.entered = true;
            return (pruned, Transition::Entered);
        }
        // An empty ledger never trips the entry window.
        let window_passed = ledger
            .oldest()
            .is_some_and(|oldest| older_than(oldest, now, policy.entry_time()));
        if window_passed {
            record.block(now, policy.block_time());
            return (pruned, Transition::Blocked(BlockReason::EntryTimeout));
        }
    }

    if policy.visits_maximum > 0 && ledger.len() > policy.visits_maximum as usize {
        record.block(now, policy.block_time());
        return (pruned, Transition::Blocked(BlockReason::TooManyVisits));
    }

    (pruned, Transition::None)
}

/// Periodic maintenance loop over a registry.
pub struct Sweeper {
    registry: Arc<ClientRegistry>,
    policy: SharedPolicy,
}

impl Sweeper {
    pub fn new(registry: Arc<ClientRegistry>, policy: SharedPolicy) -> Self {
        Self { registry, policy }
    }

    /// Run one tick as of `now`.
    pub fn sweep_at(&self, now: SystemTime) -> SweepReport {
        let policy = self.policy.load_full();
        let throttle = &policy.throttle;
        let mut report = SweepReport::default();

        for address in self.registry.addresses() {
            let outcome = self
                .registry
                .update(&address, |record, ledger| evaluate(record, ledger, throttle, now));

            // Evicted or removed since the snapshot was taken.
            let Some((pruned, transition)) = outcome else {
                continue;
            };
            report.visited += 1;
            report.pruned += pruned;

            match transition {
                Transition::None => {}
                Transition::Unblocked => {
                    report.unblocked += 1;
                    tracing::info!(client = %address, "Client unblocked");
                }
                Transition::Evict => {
                    // Re-check under the key lock: a visit may have landed since.
                    let lifetime = throttle.client_lifetime();
                    if self
                        .registry
                        .remove_if(&address, |r| !r.blocked && r.idle_beyond(now, lifetime))
                    {
                        report.evicted += 1;
                        tracing::debug!(client = %address, "Idle client forgotten");
                    }
                }
                Transition::Entered => {
                    report.entered += 1;
                    tracing::debug!(client = %address, "Client passed entry gate");
                }
                Transition::Blocked(reason) => {
                    report.blocked += 1;
                    tracing::info!(
                        client = %address,
                        reason = reason.as_str(),
                        block_secs = throttle.block_time_secs,
                        "Client blocked"
                    );
                }
            }
        }

        report
    }

    /// Run until a shutdown signal arrives.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut period = self.policy.load().throttle.sweep_interval();
        let mut ticker = Self::ticker(period);

        tracing::info!(interval_ms = period.as_millis() as u64, "Sweeper starting");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick();

                    let current = self.policy.load().throttle.sweep_interval();
                    if current != period {
                        tracing::info!(interval_ms = current.as_millis() as u64, "Sweep interval changed");
                        period = current;
                        ticker = Self::ticker(period);
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    fn ticker(period: Duration) -> time::Interval {
        let mut ticker = time::interval_at(time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    fn tick(&self) {
        let started = Instant::now();
        match catch_unwind(AssertUnwindSafe(|| self.sweep_at(SystemTime::now()))) {
            Ok(report) => {
                metrics::record_sweep(&report, self.registry.len(), started);
                if report.blocked + report.unblocked + report.evicted > 0 {
                    tracing::debug!(
                        visited = report.visited,
                        pruned = report.pruned,
                        blocked = report.blocked,
                        unblocked = report.unblocked,
                        evicted = report.evicted,
                        "Sweep finished"
                    );
                }
            }
            Err(_) => {
                tracing::error!("Sweep tick panicked, continuing with next tick");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::policy::shared_policy;
    use crate::config::GateConfig;

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000 + secs)
    }

    fn sweeper(throttle: ThrottleConfig) -> (Sweeper, Arc<ClientRegistry>) {
        let mut config = GateConfig::default();
        config.throttle = throttle;
        let registry = Arc::new(ClientRegistry::new());
        (Sweeper::new(registry.clone(), shared_policy(&config)), registry)
    }

    fn visit(registry: &ClientRegistry, address: &str, now: SystemTime) {
        let mut handle = registry.get_or_create(address, now);
        handle.ledger.record(now);
        handle.record.last_visit = now;
        registry.replace(handle.record);
    }

    #[test]
    fn blocks_above_maximum() {
        let (sweeper, registry) = sweeper(ThrottleConfig {
            visits_maximum: 5,
            keep_alive_secs: 3600,
            block_time_secs: 30,
            client_lifetime_secs: 3600,
            ..ThrottleConfig::default()
        });
        for i in 0..6 {
            visit(&registry, "10.0.0.1", at(i));
        }

        let tick = at(7);
        let report = sweeper.sweep_at(tick);
        assert_eq!(report.blocked, 1);

        let record = registry.get("10.0.0.1").unwrap().record;
        assert!(record.blocked);
        assert_eq!(record.blocked_until, tick + Duration::from_secs(30));
    }

    #[test]
    fn exactly_maximum_is_allowed() {
        let (sweeper, registry) = sweeper(ThrottleConfig {
            visits_maximum: 5,
            keep_alive_secs: 3600,
            client_lifetime_secs: 3600,
            ..ThrottleConfig::default()
        });
        for i in 0..5 {
            visit(&registry, "10.0.0.1", at(i));
        }

        assert_eq!(sweeper.sweep_at(at(6)).blocked, 0);
        assert!(!registry.get("10.0.0.1").unwrap().record.blocked);
    }

    #[test]
    fn single_visit_fails_entry_gate() {
        let (sweeper, registry) = sweeper(ThrottleConfig {
            visits_minimum: 3,
            entry_time_secs: 10,
            keep_alive_secs: 3600,
            block_time_secs: 60,
            client_lifetime_secs: 3600,
            ..ThrottleConfig::default()
        });
        visit(&registry, "10.0.0.2", at(0));

        for secs in 1..=10 {
            let report = sweeper.sweep_at(at(secs));
            assert_eq!(report.blocked, 0, "blocked too early at {}s", secs);
        }

        let report = sweeper.sweep_at(at(11));
        assert_eq!(report.blocked, 1);
        let record = registry.get("10.0.0.2").unwrap().record;
        assert!(record.blocked);
        assert!(!record.entered);
    }

    #[test]
    fn aged_out_visits_do_not_trip_entry_gate() {
        let (sweeper, registry) = sweeper(ThrottleConfig {
            visits_minimum: 3,
            entry_time_secs: 10,
            keep_alive_secs: 5,
            block_time_secs: 60,
            client_lifetime_secs: 3600,
            ..ThrottleConfig::default()
        });
        visit(&registry, "10.0.0.5", at(0));

        let report = sweeper.sweep_at(at(20));
        assert_eq!(report.pruned, 1);
        assert_eq!(report.blocked, 0);
        let client = registry.get("10.0.0.5").unwrap();
        assert!(client.ledger.is_empty());
        assert!(!client.record.blocked);
    }

    #[test]
    fn enough_visits_pass_entry_gate() {
        let (sweeper, registry) = sweeper(ThrottleConfig {
            visits_minimum: 3,
            entry_time_secs: 10,
            keep_alive_secs: 3600,
            client_lifetime_secs: 3600,
            ..ThrottleConfig::default()
        });
        for i in 0..3 {
            visit(&registry, "10.0.0.3", at(i));
        }

        assert_eq!(sweeper.sweep_at(at(4)).entered, 1);
        assert!(registry.get("10.0.0.3").unwrap().record.entered);

        // Once entered, the window no longer applies.
        assert_eq!(sweeper.sweep_at(at(60)).blocked, 0);
        assert!(registry.get("10.0.0.3").unwrap().record.entered);
    }

    #[test]
    fn unblock_keeps_entered_and_ledger() {
        let (sweeper, registry) = sweeper(ThrottleConfig {
            visits_maximum: 2,
            keep_alive_secs: 3600,
            block_time_secs: 5,
            client_lifetime_secs: 3600,
            ..ThrottleConfig::default()
        });
        for i in 0..3 {
            visit(&registry, "10.0.0.4", at(i));
        }
        registry.update("10.0.0.4", |record, _| record.entered = true);

        assert_eq!(sweeper.sweep_at(at(10)).blocked, 1);
        let before = registry.get("10.0.0.4").unwrap();
        assert_eq!(before.record.blocked_until, at(15));

        // Still inside the block window, including its last instant.
        assert_eq!(sweeper.sweep_at(at(15)).unblocked, 0);
        assert!(registry.get("10.0.0.4").unwrap().record.blocked);

        let report = sweeper.sweep_at(at(16));
        assert_eq!(report.unblocked, 1);
        assert_eq!(report.blocked, 0);
        let after = registry.get("10.0.0.4").unwrap();
        assert!(!after.record.blocked);
        assert!(after.record.entered);
        assert_eq!(after.ledger.len(), before.ledger.len());
    }

    #[test]
    fn idle_client_is_evicted_and_returns_fresh() {
        let (sweeper, registry) = sweeper(ThrottleConfig {
            visits_minimum: 1,
            entry_time_secs: 5,
            keep_alive_secs: 3600,
            client_lifetime_secs: 10,
            ..ThrottleConfig::default()
        });
        visit(&registry, "10.0.0.5", at(0));
        assert_eq!(sweeper.sweep_at(at(1)).entered, 1);

        assert_eq!(sweeper.sweep_at(at(10)).evicted, 0);
        assert_eq!(sweeper.sweep_at(at(11)).evicted, 1);
        assert!(registry.get("10.0.0.5").is_none());

        let fresh = registry.get_or_create("10.0.0.5", at(12));
        assert!(!fresh.record.entered);
        assert!(fresh.ledger.is_empty());
    }

    #[test]
    fn blocked_client_is_not_evicted() {
        let (sweeper, registry) = sweeper(ThrottleConfig {
            visits_maximum: 1,
            keep_alive_secs: 3600,
            block_time_secs: 100,
            client_lifetime_secs: 10,
            ..ThrottleConfig::default()
        });
        visit(&registry, "10.0.0.6", at(0));
        visit(&registry, "10.0.0.6", at(1));
        assert_eq!(sweeper.sweep_at(at(2)).blocked, 1);

        let report = sweeper.sweep_at(at(50));
        assert_eq!(report.evicted, 0);
        assert!(registry.get("10.0.0.6").unwrap().record.blocked);
    }

    #[test]
    fn prune_runs_for_every_client() {
        let (sweeper, registry) = sweeper(ThrottleConfig {
            keep_alive_secs: 5,
            client_lifetime_secs: 3600,
            ..ThrottleConfig::default()
        });
        visit(&registry, "10.0.0.7", at(0));
        visit(&registry, "10.0.0.7", at(8));
        registry.update("10.0.0.7", |record, _| record.block(at(8), Duration::from_secs(100)));

        let report = sweeper.sweep_at(at(9));
        assert_eq!(report.pruned, 1);
        assert_eq!(registry.get("10.0.0.7").unwrap().ledger.len(), 1);
    }

    #[test]
    fn disabled_gates_never_block() {
        let (sweeper, registry) = sweeper(ThrottleConfig {
            keep_alive_secs: 3600,
            client_lifetime_secs: 3600,
            ..ThrottleConfig::default()
        });
        for i in 0..100 {
            visit(&registry, "10.0.0.8", at(i));
        }
        let report = sweeper.sweep_at(at(200));
        assert_eq!(report, SweepReport { visited: 1, ..SweepReport::default() });
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let (sweeper, _registry) = sweeper(ThrottleConfig {
            sweep_interval_ms: 10,
            ..ThrottleConfig::default()
        });
        let (tx, rx) = broadcast::channel(1);
        let task = tokio::spawn(sweeper.run(rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
