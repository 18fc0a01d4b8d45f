//! Seedbank lookup - lazy activation of offline torrents
//!
//! When the host session misses an info hash in its torrent registry, this
//! crate looks the hash up in a MongoDB record store, loads the `.torrent`
//! descriptor from a sharded directory tree, and registers the torrent as a
//! seed-only, trackerless entry.
//!
//! ## Pipeline
//!
//! ```text
//! registry miss
//!   → Activator (fast path / recursion guard / in-flight coalescing)
//!   → RecordResolver (ConnectionGate → RecordStore)
//!   → DescriptorLoader (DescriptorLayout → sharding)
//!   → Registry (activate, clear trackers, force complete, allow peers)
//!   → EventEmitter
//! ```
//!
//! Failures never reach the caller; they are reported as coded events and
//! the miss stands.

pub mod cli;
pub mod config;
pub mod db;
pub mod descriptor;
pub mod error;
pub mod events;
pub mod identifier;
pub mod orchestrator;
pub mod plugin;
pub mod registry;
pub mod resolver;
pub mod sharding;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::{LookupError, Result};
pub use events::{EventCode, EventSink, LookupEvent, MemorySink, Severity, TracingSink};
pub use identifier::ContentId;
pub use orchestrator::{ActivationStats, Activator};
pub use plugin::SeedbankPlugin;
pub use registry::{MemoryRegistry, Registry};
