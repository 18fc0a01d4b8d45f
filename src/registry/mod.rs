//! Host registry capability
//!
//! The pipeline never owns registry entries. It asks the host whether an
//! entry exists, submits activation requests, and issues a small set of
//! commands against entries it found. Hosts implement [`Registry`];
//! [`MemoryRegistry`] is the in-process implementation used by the operator
//! tool.

pub mod memory;

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::descriptor::Descriptor;
use crate::identifier::ContentId;

pub use memory::{EntryState, MemoryRegistry, TorrentEntry};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("torrent already in registry: {0}")]
    Duplicate(ContentId),

    #[error("registry rejected torrent: {0}")]
    Rejected(String),
}

/// Flags submitted with an activation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PolicyFlags {
    /// Start paused until setup is complete
    pub paused: bool,
    /// Leave queueing decisions to the host
    pub auto_managed: bool,
    /// Assume all data is present, skip hash checking
    pub seed_only: bool,
    /// Ignore any persisted resume state
    pub ignore_persisted_resume_state: bool,
    /// Never download
    pub upload_only: bool,
    /// Fail instead of merging when the id is already registered
    pub reject_duplicate: bool,
}

impl PolicyFlags {
    /// Flags for activating offline content as a paused, seed-only torrent
    pub const fn seed_only() -> Self {
        Self {
            paused: true,
            auto_managed: false,
            seed_only: true,
            ignore_persisted_resume_state: true,
            upload_only: true,
            reject_duplicate: true,
        }
    }
}

/// Request to add a torrent to the registry
#[derive(Debug, Clone)]
pub struct ActivationRequest {
    pub descriptor: Descriptor,
    pub save_path: PathBuf,
    pub flags: PolicyFlags,
}

impl ActivationRequest {
    pub fn seed_only(descriptor: Descriptor, save_path: impl Into<PathBuf>) -> Self {
        Self {
            descriptor,
            save_path: save_path.into(),
            flags: PolicyFlags::seed_only(),
        }
    }
}

/// The host's torrent registry, as seen by the lookup pipeline
pub trait Registry: Send + Sync {
    type Entry: Send + Sync + 'static;

    /// Live entry for `id`, if any
    fn find(&self, id: &ContentId) -> Option<Arc<Self::Entry>>;

    fn contains(&self, id: &ContentId) -> bool {
        self.find(id).is_some()
    }

    /// Register a torrent. Does not hand back the entry; use [`Registry::find`].
    fn activate(&self, request: ActivationRequest) -> Result<(), RegistryError>;

    /// Remove every tracker so the entry never announces
    fn clear_peer_sources(&self, entry: &Self::Entry);

    /// Mark all content as downloaded
    fn force_complete(&self, entry: &Self::Entry);

    fn set_peer_connectivity(&self, entry: &Self::Entry, allow_peers: bool, graceful: bool);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_only_flags() {
        let flags = PolicyFlags::seed_only();
        assert!(flags.paused);
        assert!(!flags.auto_managed);
        assert!(flags.seed_only);
        assert!(flags.ignore_persisted_resume_state);
        assert!(flags.upload_only);
        assert!(flags.reject_duplicate);
    }
}
