//! Descriptor loading for the activation pipeline

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::descriptor::{Descriptor, DescriptorLayout};
use crate::events::{EventCode, EventEmitter};
use crate::identifier::ContentId;

pub struct DescriptorLoader {
    layout: DescriptorLayout,
    events: EventEmitter,
    reads: AtomicU64,
}

impl DescriptorLoader {
    pub fn new(layout: DescriptorLayout, events: EventEmitter) -> Self {
        Self {
            layout,
            events,
            reads: AtomicU64::new(0),
        }
    }

    pub fn layout(&self) -> &DescriptorLayout {
        &self.layout
    }

    /// Load the descriptor stored for `hex_id`, reporting any failure as an
    /// event. An empty or non-hex id never touches the filesystem.
    pub fn load(&self, hex_id: &str) -> Option<Descriptor> {
        if hex_id.is_empty() {
            self.events.post(EventCode::UnclassifiedError, || {
                "ERROR: got empty info hash while loading descriptor".to_string()
            });
            return None;
        }

        let id = match ContentId::from_hex(hex_id) {
            Ok(id) => id,
            Err(e) => {
                self.events.post(EventCode::UnclassifiedError, || {
                    format!("ERROR: refusing to load descriptor: {}", e)
                });
                return None;
            }
        };

        let path = self.layout.path_for(&id);
        self.reads.fetch_add(1, Ordering::Relaxed);
        debug!(info_hash = %id, path = %path.display(), "Loading descriptor");

        match Descriptor::from_file(&path) {
            Ok(descriptor) => Some(descriptor),
            Err(e) => {
                self.events.post(EventCode::InvalidTorrentFile, || {
                    format!(
                        "Failed to load descriptor ({}) when adding torrent {} ({})",
                        e,
                        id,
                        path.display()
                    )
                });
                None
            }
        }
    }

    /// Number of descriptor file reads attempted
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }
}
