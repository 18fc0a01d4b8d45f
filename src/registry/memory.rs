//! In-memory torrent registry
//!
//! ## Thread Safety
//!
//! Entries live in a DashMap keyed by info hash; per-entry state sits behind
//! its own lock so commands on one torrent never block lookups of another.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use crate::descriptor::Descriptor;
use crate::identifier::ContentId;
use crate::registry::{ActivationRequest, PolicyFlags, Registry, RegistryError};

/// Mutable state of a registered torrent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryState {
    pub trackers: Vec<String>,
    pub complete: bool,
    pub paused: bool,
    pub allow_peers: bool,
    pub graceful_pause: bool,
}

/// A registered torrent
#[derive(Debug)]
pub struct TorrentEntry {
    pub info_hash: ContentId,
    pub descriptor: Descriptor,
    pub save_path: PathBuf,
    pub flags: PolicyFlags,
    state: RwLock<EntryState>,
}

impl TorrentEntry {
    pub fn state(&self) -> EntryState {
        self.state.read().clone()
    }
}

#[derive(Default)]
pub struct MemoryRegistry {
    entries: DashMap<ContentId, Arc<TorrentEntry>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> Vec<ContentId> {
        self.entries.iter().map(|e| *e.key()).collect()
    }

    /// Drop a torrent; outstanding weak references expire
    pub fn remove(&self, id: &ContentId) -> bool {
        let removed = self.entries.remove(id).is_some();
        if removed {
            info!(info_hash = %id, "Removed torrent from registry");
        }
        removed
    }
}

impl Registry for MemoryRegistry {
    type Entry = TorrentEntry;

    fn find(&self, id: &ContentId) -> Option<Arc<TorrentEntry>> {
        self.entries.get(id).map(|e| Arc::clone(e.value()))
    }

    fn activate(&self, request: ActivationRequest) -> Result<(), RegistryError> {
        let id = request.descriptor.info_hash;

        match self.entries.entry(id) {
            Entry::Occupied(_) if request.flags.reject_duplicate => Err(RegistryError::Duplicate(id)),
            Entry::Occupied(_) => {
                debug!(info_hash = %id, "Torrent already registered, keeping existing entry");
                Ok(())
            }
            Entry::Vacant(slot) => {
                let state = EntryState {
                    trackers: request.descriptor.trackers.clone(),
                    complete: false,
                    paused: request.flags.paused,
                    allow_peers: !request.flags.paused,
                    graceful_pause: false,
                };
                slot.insert(Arc::new(TorrentEntry {
                    info_hash: id,
                    descriptor: request.descriptor,
                    save_path: request.save_path,
                    flags: request.flags,
                    state: RwLock::new(state),
                }));
                debug!(info_hash = %id, "Registered torrent");
                Ok(())
            }
        }
    }

    fn clear_peer_sources(&self, entry: &TorrentEntry) {
        entry.state.write().trackers.clear();
    }

    fn force_complete(&self, entry: &TorrentEntry) {
        entry.state.write().complete = true;
    }

    fn set_peer_connectivity(&self, entry: &TorrentEntry, allow_peers: bool, graceful: bool) {
        let mut state = entry.state.write();
        state.allow_peers = allow_peers;
        state.paused = !allow_peers;
        state.graceful_pause = !allow_peers && graceful;
    }
}
