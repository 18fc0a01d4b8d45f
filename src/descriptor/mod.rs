//! Torrent descriptors
//!
//! A descriptor is the parsed `.torrent` metainfo for one info hash. Parsing
//! checks what a metainfo reader needs to serve the content: an `info`
//! dictionary with a name, a piece size, whole SHA-1 piece hashes, and file
//! sizes the pieces actually cover.
//!
//! ## Layout
//!
//! Descriptor files live under a sharded directory tree, see
//! [`DescriptorLayout`] and [`crate::sharding`].

pub mod bencode;
pub mod layout;
pub mod loader;

use sha1::{Digest, Sha1};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

use crate::identifier::ContentId;
use bencode::{BencodeError, Node};

pub use layout::{DescriptorLayout, StoredDescriptor};
pub use loader::DescriptorLoader;

/// Length of one SHA-1 piece hash
const PIECE_HASH_LEN: usize = 20;

#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("descriptor file not found: {0}")]
    NotFound(PathBuf),

    #[error("not a file: {0}")]
    NotAFile(PathBuf),

    #[error("empty descriptor file: {0}")]
    EmptyFile(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("empty descriptor data")]
    Empty,

    #[error("malformed bencode: {0}")]
    Bencode(#[from] BencodeError),

    #[error("descriptor is not a dictionary")]
    NotADictionary,

    #[error("missing key: {0}")]
    MissingKey(&'static str),

    #[error("invalid {key}: {reason}")]
    InvalidField { key: &'static str, reason: String },

    #[error("expected {expected} pieces for {total_size} bytes, found {actual}")]
    PieceCountMismatch {
        expected: u64,
        actual: u64,
        total_size: u64,
    },
}

/// One file inside the torrent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path relative to the torrent's save directory
    pub path: PathBuf,
    pub length: u64,
}

/// Parsed and validated torrent metainfo
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub info_hash: ContentId,
    pub name: String,
    pub piece_length: u64,
    pub piece_count: u64,
    pub total_size: u64,
    pub files: Vec<FileEntry>,
    /// Announce URLs in tier order, duplicates removed
    pub trackers: Vec<String>,
    raw: Vec<u8>,
}

impl Descriptor {
    /// Read and parse a descriptor file
    pub fn from_file(path: &Path) -> Result<Self, DescriptorError> {
        let metadata = std::fs::metadata(path).map_err(|e| io_error(path, e))?;
        if metadata.is_dir() {
            return Err(DescriptorError::NotAFile(path.to_path_buf()));
        }
        if metadata.len() == 0 {
            return Err(DescriptorError::EmptyFile(path.to_path_buf()));
        }

        let data = std::fs::read(path).map_err(|e| io_error(path, e))?;
        Self::from_bytes(&data)
    }

    /// Parse bencoded metainfo
    pub fn from_bytes(data: &[u8]) -> Result<Self, DescriptorError> {
        if data.is_empty() {
            return Err(DescriptorError::Empty);
        }

        let root = bencode::decode(data)?;
        if !root.is_dict() {
            return Err(DescriptorError::NotADictionary);
        }

        let info = root.get("info").ok_or(DescriptorError::MissingKey("info"))?;
        if !info.is_dict() {
            return Err(invalid("info", "not a dictionary"));
        }

        let pieces = info
            .get("pieces")
            .ok_or(DescriptorError::MissingKey("pieces"))?
            .as_bytes()
            .ok_or_else(|| invalid("pieces", "not a byte string"))?;
        if pieces.is_empty() || pieces.len() % PIECE_HASH_LEN != 0 {
            return Err(invalid(
                "pieces",
                format!("length {} is not a positive multiple of {}", pieces.len(), PIECE_HASH_LEN),
            ));
        }

        let piece_length = info
            .get("piece length")
            .ok_or(DescriptorError::MissingKey("piece length"))?
            .as_int()
            .filter(|&n| n > 0)
            .ok_or_else(|| invalid("piece length", "not a positive integer"))? as u64;

        let name = info
            .get("name")
            .ok_or(DescriptorError::MissingKey("name"))?
            .as_str()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| invalid("name", "not a non-empty UTF-8 string"))?
            .to_string();
        check_component("name", &name)?;

        let files = parse_files(info, &name)?;
        let total_size = files
            .iter()
            .try_fold(0u64, |acc, f| acc.checked_add(f.length))
            .ok_or_else(|| invalid("length", "total size overflows"))?;

        let piece_count = (pieces.len() / PIECE_HASH_LEN) as u64;
        let expected = total_size.div_ceil(piece_length);
        if expected != piece_count {
            return Err(DescriptorError::PieceCountMismatch {
                expected,
                actual: piece_count,
                total_size,
            });
        }

        let digest: [u8; 20] = Sha1::digest(info.raw).into();

        Ok(Self {
            info_hash: ContentId::from_bytes(digest),
            name,
            piece_length,
            piece_count,
            total_size,
            files,
            trackers: parse_trackers(&root),
            raw: data.to_vec(),
        })
    }

    /// The bencoded bytes this descriptor was parsed from
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn is_single_file(&self) -> bool {
        self.files.len() == 1 && self.files[0].path == Path::new(&self.name)
    }
}

fn io_error(path: &Path, source: std::io::Error) -> DescriptorError {
    if source.kind() == std::io::ErrorKind::NotFound {
        DescriptorError::NotFound(path.to_path_buf())
    } else {
        DescriptorError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

fn invalid(key: &'static str, reason: impl Into<String>) -> DescriptorError {
    DescriptorError::InvalidField {
        key,
        reason: reason.into(),
    }
}

/// Reject path components that would escape the save directory
fn check_component(key: &'static str, component: &str) -> Result<(), DescriptorError> {
    let mut components = Path::new(component).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !component.contains(['/', '\\']) => Ok(()),
        _ => Err(invalid(key, format!("unsafe path component {:?}", component))),
    }
}

fn parse_files(info: &Node<'_>, name: &str) -> Result<Vec<FileEntry>, DescriptorError> {
    if let Some(length) = info.get("length") {
        let length = length
            .as_int()
            .filter(|&n| n >= 0)
            .ok_or_else(|| invalid("length", "not a non-negative integer"))?;
        return Ok(vec![FileEntry {
            path: PathBuf::from(name),
            length: length as u64,
        }]);
    }

    let list = info
        .get("files")
        .ok_or(DescriptorError::MissingKey("length"))?
        .as_list()
        .filter(|l| !l.is_empty())
        .ok_or_else(|| invalid("files", "not a non-empty list"))?;

    list.iter()
        .map(|file| {
            let length = file
                .get("length")
                .and_then(Node::as_int)
                .filter(|&n| n >= 0)
                .ok_or_else(|| invalid("files", "entry without a valid length"))?;

            let segments = file
                .get("path")
                .and_then(Node::as_list)
                .filter(|p| !p.is_empty())
                .ok_or_else(|| invalid("files", "entry without a path"))?;

            let mut path = PathBuf::from(name);
            for segment in segments {
                let segment = segment
                    .as_str()
                    .ok_or_else(|| invalid("files", "path segment is not UTF-8"))?;
                check_component("files", segment)?;
                path.push(segment);
            }

            Ok(FileEntry {
                path,
                length: length as u64,
            })
        })
        .collect()
}

fn parse_trackers(root: &Node<'_>) -> Vec<String> {
    let mut trackers: Vec<String> = Vec::new();
    let mut push = |url: &str| {
        if !url.is_empty() && !trackers.iter().any(|t| t == url) {
            trackers.push(url.to_string());
        }
    };

    if let Some(tiers) = root.get("announce-list").and_then(Node::as_list) {
        for tier in tiers {
            for url in tier.as_list().unwrap_or_default() {
                if let Some(url) = url.as_str() {
                    push(url);
                }
            }
        }
    }
    if let Some(url) = root.get("announce").and_then(Node::as_str) {
        push(url);
    }

    trackers
}
