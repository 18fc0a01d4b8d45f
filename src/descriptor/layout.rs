//! Sharded descriptor layout on disk
//!
//! `{root}/3/1/1/e/311edf6121b1f365201520f914219b5cec9890ae.torrent`
//!
//! Besides path computation this covers the maintenance side of the layout:
//! storing a descriptor in its sharded location and removing one again,
//! pruning shard directories that become empty.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::Config;
use crate::descriptor::{Descriptor, DescriptorError};
use crate::error::LookupError;
use crate::identifier::{ContentId, HEX_LEN};
use crate::sharding;

/// Result of storing a descriptor
#[derive(Debug, Clone)]
pub struct StoredDescriptor {
    pub info_hash: ContentId,
    pub path: PathBuf,
    /// A descriptor was already present at the path
    pub already_existed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorLayout {
    root: PathBuf,
    depth: usize,
    extension: String,
}

impl DescriptorLayout {
    pub fn new(root: impl Into<PathBuf>, depth: usize, extension: impl Into<String>) -> Result<Self, LookupError> {
        if depth == 0 || depth > HEX_LEN {
            return Err(LookupError::Config(format!(
                "shard depth must be between 1 and {}, got {}",
                HEX_LEN, depth
            )));
        }
        Ok(Self {
            root: root.into(),
            depth,
            extension: extension.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, LookupError> {
        Self::new(
            config.descriptor_root.clone(),
            config.shard_depth,
            config.descriptor_extension.clone(),
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Path for an arbitrary hex string; `None` when it is shorter than the depth
    pub fn path_for_hex(&self, hex_id: &str) -> Option<PathBuf> {
        sharding::descriptor_path(&self.root, hex_id, self.depth, &self.extension)
    }

    pub fn path_for(&self, id: &ContentId) -> PathBuf {
        let hex_id = id.to_hex();
        // depth <= HEX_LEN is checked in new(), so the sharded path always exists
        self.path_for_hex(&hex_id)
            .unwrap_or_else(|| self.root.join(format!("{}.{}", hex_id, self.extension)))
    }

    pub fn exists(&self, id: &ContentId) -> bool {
        self.path_for(id).is_file()
    }

    /// Validate `data` as a descriptor and write it to its sharded location
    pub fn store(&self, data: &[u8]) -> Result<StoredDescriptor, LookupError> {
        let descriptor = Descriptor::from_bytes(data)?;
        let path = self.path_for(&descriptor.info_hash);

        if path.is_file() {
            debug!(info_hash = %descriptor.info_hash, "Descriptor already stored");
            return Ok(StoredDescriptor {
                info_hash: descriptor.info_hash,
                path,
                already_existed: true,
            });
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write then rename so readers never observe a partial file.
        let tmp = path.with_extension(format!("{}.tmp", self.extension));
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &path)?;

        info!(info_hash = %descriptor.info_hash, path = %path.display(), "Stored descriptor");
        Ok(StoredDescriptor {
            info_hash: descriptor.info_hash,
            path,
            already_existed: false,
        })
    }

    /// Copy a descriptor file from anywhere into the layout
    pub fn store_file(&self, source: &Path) -> Result<StoredDescriptor, LookupError> {
        let data = fs::read(source).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LookupError::Descriptor(DescriptorError::NotFound(source.to_path_buf()))
            } else {
                LookupError::Io(e)
            }
        })?;
        self.store(&data)
    }

    /// Delete a descriptor and prune emptied shard directories below the root
    pub fn remove(&self, id: &ContentId) -> Result<PathBuf, LookupError> {
        let path = self.path_for(id);
        if !path.is_file() {
            return Err(DescriptorError::NotFound(path).into());
        }

        fs::remove_file(&path)?;
        if let Some(parent) = path.parent() {
            self.prune_empty_dirs(parent)?;
        }

        info!(info_hash = %id, path = %path.display(), "Removed descriptor");
        Ok(path)
    }

    fn prune_empty_dirs(&self, start: &Path) -> Result<(), LookupError> {
        let mut dir = start;
        while dir != self.root && dir.starts_with(&self.root) {
            if fs::read_dir(dir)?.next().is_some() {
                break;
            }
            fs::remove_dir(dir)?;
            debug!(dir = %dir.display(), "Pruned empty shard directory");
            match dir.parent() {
                Some(parent) => dir = parent,
                None => break,
            }
        }
        Ok(())
    }
}
