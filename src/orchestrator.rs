//! Activation orchestrator
//!
//! Entry point for registry misses. A miss that is allowed to go external is
//! resolved against the record store, its descriptor is loaded from the
//! sharded layout, and the torrent is registered as a paused seed-only entry
//! that is then switched to seeding with no trackers.
//!
//! ## Guarantees
//!
//! - A live reference is returned untouched before any I/O happens.
//! - `allow_external_lookup = false` returns the input untouched. Activation
//!   can trigger lookups inside the host; those must pass `false`.
//! - Concurrent misses for the same id share one resolution. A miss for an id
//!   whose resolution is already running on the current thread is treated as
//!   a re-entrant lookup and returns the input untouched. Waiting on another
//!   thread's resolution is bounded by the coalesce timeout, after which the
//!   waiter returns its input; a host that activates on a helper thread which
//!   looks the same id up again cannot deadlock the pair.
//! - Nothing propagates to the caller: every failure becomes an event and the
//!   caller gets back the reference it passed in.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::descriptor::DescriptorLoader;
use crate::events::{EventCode, EventEmitter};
use crate::identifier::ContentId;
use crate::registry::{ActivationRequest, Registry};
use crate::resolver::RecordResolver;

/// One in-progress resolution that other callers can wait on
struct Flight<E> {
    leader: ThreadId,
    result: Mutex<Option<Option<Weak<E>>>>,
    done: Condvar,
}

impl<E> Flight<E> {
    fn new() -> Self {
        Self {
            leader: thread::current().id(),
            result: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    /// Publish the outcome; only the first call counts
    fn complete(&self, outcome: Option<Weak<E>>) {
        let mut result = self.result.lock();
        if result.is_none() {
            *result = Some(outcome);
            self.done.notify_all();
        }
    }

    /// Wait for the outcome; `None` when `timeout` passes first
    fn wait(&self, timeout: Duration) -> Option<Option<Weak<E>>> {
        let deadline = Instant::now() + timeout;
        let mut result = self.result.lock();
        while result.is_none() {
            if self.done.wait_until(&mut result, deadline).timed_out() {
                break;
            }
        }
        result.clone()
    }
}

/// Removes the flight from the map and wakes waiters, even on unwind
struct FlightGuard<'a, E> {
    flights: &'a DashMap<ContentId, Arc<Flight<E>>>,
    id: ContentId,
    flight: Arc<Flight<E>>,
}

impl<E> Drop for FlightGuard<'_, E> {
    fn drop(&mut self) {
        self.flights
            .remove_if(&self.id, |_, f| Arc::ptr_eq(f, &self.flight));
        self.flight.complete(None);
    }
}

#[derive(Debug, Default)]
struct Counters {
    lookups: AtomicU64,
    fast_path: AtomicU64,
    opted_out: AtomicU64,
    reentrant: AtomicU64,
    coalesced: AtomicU64,
    wait_timeouts: AtomicU64,
    activated: AtomicU64,
    failed: AtomicU64,
}

/// Orchestrator statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActivationStats {
    /// Calls to find_or_activate
    pub lookups: u64,
    /// Calls answered by a live reference
    pub fast_path: u64,
    /// Misses where external lookup was disallowed
    pub opted_out: u64,
    /// Misses re-entered from inside their own resolution
    pub reentrant: u64,
    /// Misses that waited on another caller's resolution
    pub coalesced: u64,
    /// Waits that gave up before the other resolution finished
    pub wait_timeouts: u64,
    /// Torrents activated
    pub activated: u64,
    /// Resolutions that ended without an entry
    pub failed: u64,
}

/// Default bound on waiting for another caller's resolution
pub const DEFAULT_COALESCE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Activator<R: Registry> {
    registry: Arc<R>,
    resolver: RecordResolver,
    loader: DescriptorLoader,
    events: EventEmitter,
    in_flight: DashMap<ContentId, Arc<Flight<R::Entry>>>,
    coalesce_timeout: Duration,
    counters: Counters,
}

impl<R: Registry> Activator<R> {
    pub fn new(
        registry: Arc<R>,
        resolver: RecordResolver,
        loader: DescriptorLoader,
        events: EventEmitter,
    ) -> Self {
        Self {
            registry,
            resolver,
            loader,
            events,
            in_flight: DashMap::new(),
            coalesce_timeout: DEFAULT_COALESCE_TIMEOUT,
            counters: Counters::default(),
        }
    }

    pub fn with_coalesce_timeout(mut self, timeout: Duration) -> Self {
        self.coalesce_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<R> {
        &self.registry
    }

    pub fn resolver(&self) -> &RecordResolver {
        &self.resolver
    }

    pub fn loader(&self) -> &DescriptorLoader {
        &self.loader
    }

    /// Return a reference to the registry entry for `id`, activating it from
    /// the record store on a miss when `allow_external_lookup` is set.
    pub fn find_or_activate(
        &self,
        id: &ContentId,
        existing: Weak<R::Entry>,
        allow_external_lookup: bool,
    ) -> Weak<R::Entry> {
        self.counters.lookups.fetch_add(1, Ordering::Relaxed);

        if existing.strong_count() > 0 {
            self.counters.fast_path.fetch_add(1, Ordering::Relaxed);
            return existing;
        }

        if !allow_external_lookup {
            self.counters.opted_out.fetch_add(1, Ordering::Relaxed);
            return existing;
        }

        let (flight, leader) = match self.in_flight.entry(*id) {
            Entry::Occupied(e) => (Arc::clone(e.get()), false),
            Entry::Vacant(slot) => {
                let flight = Arc::new(Flight::new());
                slot.insert(Arc::clone(&flight));
                (flight, true)
            }
        };

        if !leader {
            if flight.leader == thread::current().id() {
                self.counters.reentrant.fetch_add(1, Ordering::Relaxed);
                debug!(info_hash = %id, "Re-entrant lookup during activation, not resolving again");
                return existing;
            }

            self.counters.coalesced.fetch_add(1, Ordering::Relaxed);
            debug!(info_hash = %id, "Waiting on in-flight resolution");
            return match flight.wait(self.coalesce_timeout) {
                Some(outcome) => outcome.unwrap_or(existing),
                None => {
                    self.counters.wait_timeouts.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        info_hash = %id,
                        timeout_ms = self.coalesce_timeout.as_millis() as u64,
                        "Gave up waiting on in-flight resolution"
                    );
                    existing
                }
            };
        }

        let _guard = FlightGuard {
            flights: &self.in_flight,
            id: *id,
            flight: Arc::clone(&flight),
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.find_and_activate(id)));
        match outcome {
            Ok(Some(entry)) => {
                flight.complete(Some(entry.clone()));
                entry
            }
            Ok(None) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                existing
            }
            Err(payload) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                let reason = panic_message(payload.as_ref());
                self.events.post(EventCode::UnclassifiedError, || {
                    format!("ERROR: caught panic in find_or_activate: {}", reason)
                });
                existing
            }
        }
    }

    fn find_and_activate(&self, id: &ContentId) -> Option<Weak<R::Entry>> {
        let record = self.resolver.resolve(id)?;

        let Some((ih_hex, data_root)) = record.activation_target() else {
            self.events.post(EventCode::UnclassifiedError, || {
                format!("ERROR: record for {} is missing info_hash or data_root", id)
            });
            return None;
        };

        let descriptor = self.loader.load(ih_hex)?;

        // The registry keys entries by the descriptor's own hash, so a file
        // stored under the wrong name would register a different torrent.
        if descriptor.info_hash != *id {
            self.events.post(EventCode::UnclassifiedError, || {
                format!(
                    "ERROR: descriptor stored for {} has info hash {}, not registering",
                    id, descriptor.info_hash
                )
            });
            return None;
        }

        let request = ActivationRequest::seed_only(descriptor, data_root);
        if let Err(e) = self.registry.activate(request) {
            self.events.post(EventCode::UnclassifiedError, || {
                format!("ERROR: registry refused torrent {}: {}", ih_hex, e)
            });
            return None;
        }

        // Registration does not hand back the entry, so read it back.
        let Some(entry) = self.registry.find(id) else {
            self.events.post(EventCode::UnclassifiedError, || {
                format!("ERROR: registered but not found in registry: {}", ih_hex)
            });
            return None;
        };

        self.registry.clear_peer_sources(&entry);
        self.registry.force_complete(&entry);
        self.registry.set_peer_connectivity(&entry, true, false);

        self.counters.activated.fetch_add(1, Ordering::Relaxed);
        info!(info_hash = %id, data_root = %data_root, "Activated torrent");
        self.events
            .post(EventCode::TorrentActivated, || format!("Activated new torrent: {}", ih_hex));

        Some(Arc::downgrade(&entry))
    }

    pub fn stats(&self) -> ActivationStats {
        ActivationStats {
            lookups: self.counters.lookups.load(Ordering::Relaxed),
            fast_path: self.counters.fast_path.load(Ordering::Relaxed),
            opted_out: self.counters.opted_out.load(Ordering::Relaxed),
            reentrant: self.counters.reentrant.load(Ordering::Relaxed),
            coalesced: self.counters.coalesced.load(Ordering::Relaxed),
            wait_timeouts: self.counters.wait_timeouts.load(Ordering::Relaxed),
            activated: self.counters.activated.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
