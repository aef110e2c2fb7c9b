//! Concurrent client registry.
//!
//! # Responsibilities
//! - Map remote addresses to their record and visit ledger
//! - Create entries race-tolerantly on first sighting
//! - Offer per-key atomic mutation and removal to the sweeper
//!
//! # Design Decisions
//! - Record and ledger live in one map entry, so they share a lifetime
//! - DashMap shards give per-key atomicity; nothing locks the whole map
//! - `replace` is a whole-record overwrite: concurrent writers race and the
//!   later write wins. Only approximate freshness of `last_visit` is needed.
//! - A `replace` that finds the client evicted recreates it from scratch

use std::sync::Arc;
use std::time::SystemTime;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::clients::ledger::VisitLedger;
use crate::clients::record::ClientRecord;

#[derive(Debug)]
struct ClientEntry {
    record: ClientRecord,
    ledger: Arc<VisitLedger>,
}

impl ClientEntry {
    fn handle(&self) -> ClientHandle {
        ClientHandle {
            record: self.record.clone(),
            ledger: Arc::clone(&self.ledger),
        }
    }
}

/// A copy of a client's record plus a shared reference to its ledger.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    pub record: ClientRecord,
    pub ledger: Arc<VisitLedger>,
}

/// Point-in-time view of one client, for reporting.
#[derive(Debug, Clone)]
pub struct ClientSnapshot {
    pub record: ClientRecord,
    pub visits: usize,
}

/// All clients currently known to a server instance.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: DashMap<String, ClientEntry>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a client, creating a fresh record and ledger if it is unknown.
    ///
    /// Concurrent callers for the same address converge on a single entry.
    /// An address evicted a moment ago is simply created again.
    pub fn get_or_create(&self, address: &str, now: SystemTime) -> ClientHandle {
        if let Some(entry) = self.clients.get(address) {
            return entry.handle();
        }

        let entry = self
            .clients
            .entry(address.to_string())
            .or_insert_with(|| {
                tracing::debug!(client = %address, "New client");
                ClientEntry {
                    record: ClientRecord::new(address, now),
                    ledger: Arc::new(VisitLedger::new()),
                }
            });
        entry.handle()
    }

    /// Look up a client without creating it.
    pub fn get(&self, address: &str) -> Option<ClientHandle> {
        self.clients.get(address).map(|entry| entry.handle())
    }

    /// Overwrite a client's record.
    ///
    /// If the client was evicted since the caller read it, the address counts
    /// as unseen: a fresh record is created with `last_visit` as its only visit.
    pub fn replace(&self, record: ClientRecord) {
        match self.clients.entry(record.address.clone()) {
            Entry::Occupied(mut occupied) => {
                occupied.get_mut().record = record;
            }
            Entry::Vacant(vacant) => {
                tracing::trace!(client = %record.address, "Client evicted concurrently, recreating");
                let fresh = VisitLedger::new();
                fresh.record(record.last_visit);
                vacant.insert(ClientEntry {
                    record: ClientRecord::new(record.address, record.last_visit),
                    ledger: Arc::new(fresh),
                });
            }
        }
    }

    /// Mutate a client's record in place while holding its key lock.
    ///
    /// Returns `None` if the client is unknown.
    pub fn update<R>(
        &self,
        address: &str,
        f: impl FnOnce(&mut ClientRecord, &VisitLedger) -> R,
    ) -> Option<R> {
        let mut entry = self.clients.get_mut(address)?;
        let entry = &mut *entry;
        Some(f(&mut entry.record, &entry.ledger))
    }

    /// Remove a client if `predicate` holds for its current record.
    pub fn remove_if(&self, address: &str, predicate: impl FnOnce(&ClientRecord) -> bool) -> bool {
        self.clients
            .remove_if(address, |_, entry| predicate(&entry.record))
            .is_some()
    }

    /// Remove a client and its ledger.
    pub fn remove(&self, address: &str) -> bool {
        self.clients.remove(address).is_some()
    }

    /// Snapshot of all known addresses.
    pub fn addresses(&self) -> Vec<String> {
        self.clients.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Snapshot of all records with their current visit counts.
    pub fn snapshot(&self) -> Vec<ClientSnapshot> {
        self.clients
            .iter()
            .map(|entry| ClientSnapshot {
                record: entry.record.clone(),
                visits: entry.ledger.len(),
            })
            .collect()
    }

    /// Number of tracked clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
