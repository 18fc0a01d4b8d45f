//! Torrent records as stored in the record store

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

/// One row from the torrent collection.
///
/// Either field may be missing; a record without both is still a valid query
/// result, it just cannot be activated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalRecord {
    /// Hex info hash
    pub info_hash: Option<String>,
    /// Directory the torrent's data lives under
    pub data_root: Option<String>,
}

impl ExternalRecord {
    pub fn new(info_hash: impl Into<String>, data_root: impl Into<String>) -> Self {
        Self {
            info_hash: Some(info_hash.into()),
            data_root: Some(data_root.into()),
        }
    }

    /// Read `info_hash` and `data_root`. Non-string values count as absent.
    pub fn from_document(doc: &Document) -> Self {
        Self {
            info_hash: string_field(doc, "info_hash"),
            data_root: string_field(doc, "data_root"),
        }
    }

    /// `(info_hash, data_root)` when both are present and non-empty
    pub fn activation_target(&self) -> Option<(&str, &str)> {
        let info_hash = self.info_hash.as_deref().filter(|s| !s.is_empty())?;
        let data_root = self.data_root.as_deref().filter(|s| !s.is_empty())?;
        Some((info_hash, data_root))
    }
}

fn string_field(doc: &Document, key: &str) -> Option<String> {
    match doc.get(key) {
        Some(Bson::String(s)) => Some(s.clone()),
        _ => None,
    }
}
