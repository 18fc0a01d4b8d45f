//! Sharded descriptor paths
//!
//! Descriptors are spread over nested one-character directories taken from
//! the leading characters of the hex id, which keeps any single directory
//! small:
//!
//! ```text
//! 311edf6121b1f365201520f914219b5cec9890ae, depth 4 -> /3/1/1/e
//! ```

use std::path::{Path, PathBuf};

/// Shard depth used by the on-disk layout
pub const DEFAULT_SHARD_DEPTH: usize = 4;

/// Build the shard suffix for a hex id, one `/`-prefixed segment per level.
///
/// Returns `None` when the id is shorter than `depth` characters or not
/// ASCII, so callers can never index past the end of the id.
pub fn shard_path(hex_id: &str, depth: usize) -> Option<String> {
    if !hex_id.is_ascii() || hex_id.len() < depth {
        return None;
    }

    let mut suffix = String::with_capacity(depth * 2);
    for c in hex_id.chars().take(depth) {
        suffix.push('/');
        suffix.push(c);
    }
    Some(suffix)
}

/// Full descriptor path: `{root}{shard_path}/{hex_id}.{ext}`
pub fn descriptor_path(root: &Path, hex_id: &str, depth: usize, extension: &str) -> Option<PathBuf> {
    let suffix = shard_path(hex_id, depth)?;

    let mut path = root.to_path_buf();
    for segment in suffix.split('/').filter(|s| !s.is_empty()) {
        path.push(segment);
    }
    path.push(format!("{}.{}", hex_id, extension));
    Some(path)
}
