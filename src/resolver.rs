//! Record resolution
//!
//! Maps an info hash to at most one torrent record. The gate is consulted
//! before every query; an unhealthy connection short-circuits without
//! touching the store.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::db::{ConnectionGate, ExternalRecord};
use crate::events::{EventCode, EventEmitter};
use crate::identifier::ContentId;

#[derive(Debug, Default)]
struct Counters {
    queries: AtomicU64,
    short_circuits: AtomicU64,
    not_found: AtomicU64,
    ambiguous: AtomicU64,
    failures: AtomicU64,
}

/// Resolver statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolverStats {
    /// Queries issued to the store
    pub queries: u64,
    /// Lookups refused because the connection was unhealthy
    pub short_circuits: u64,
    /// Queries that matched nothing
    pub not_found: u64,
    /// Queries that matched more than one row
    pub ambiguous: u64,
    /// Queries that failed
    pub failures: u64,
}

pub struct RecordResolver {
    gate: Arc<ConnectionGate>,
    events: EventEmitter,
    counters: Counters,
}

impl RecordResolver {
    pub fn new(gate: Arc<ConnectionGate>, events: EventEmitter) -> Self {
        Self {
            gate,
            events,
            counters: Counters::default(),
        }
    }

    /// Look up the record for `id`.
    ///
    /// When several rows match, the last one in store order wins. The Mongo
    /// store sorts by `_id`, so that is the most recently inserted record.
    pub fn resolve(&self, id: &ContentId) -> Option<ExternalRecord> {
        let ih_hex = id.to_hex();

        let Some(store) = self.gate.healthy_store() else {
            self.counters.short_circuits.fetch_add(1, Ordering::Relaxed);
            self.events.post(EventCode::DbConnectionFailed, || {
                format!("Connection in failed state: {}", ih_hex)
            });
            return None;
        };

        self.counters.queries.fetch_add(1, Ordering::Relaxed);
        let mut rows = match store.find_by_info_hash(&ih_hex) {
            Ok(rows) => rows,
            Err(e) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                let reason = e.to_string();
                self.gate.mark_failed(&reason);
                self.events.post(EventCode::UnclassifiedError, || {
                    format!("ERROR: record query failed for {}: {}", ih_hex, reason)
                });
                return None;
            }
        };

        if rows.len() > 1 {
            self.counters.ambiguous.fetch_add(1, Ordering::Relaxed);
            warn!(info_hash = %ih_hex, rows = rows.len(), "Multiple torrent records, using the last");
        }

        match rows.pop() {
            Some(record) => {
                debug!(info_hash = %ih_hex, "Resolved torrent record");
                Some(record)
            }
            None => {
                self.counters.not_found.fetch_add(1, Ordering::Relaxed);
                self.events
                    .post(EventCode::TorrentNotFound, || format!("Torrent not found: {}", ih_hex));
                None
            }
        }
    }

    pub fn stats(&self) -> ResolverStats {
        ResolverStats {
            queries: self.counters.queries.load(Ordering::Relaxed),
            short_circuits: self.counters.short_circuits.load(Ordering::Relaxed),
            not_found: self.counters.not_found.load(Ordering::Relaxed),
            ambiguous: self.counters.ambiguous.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }
}
