//! Test doubles shared by the unit tests

use parking_lot::Mutex;
use sha1::{Digest, Sha1};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::db::{ExternalRecord, RecordStore, StoreConnector};
use crate::error::{LookupError, Result};
use crate::identifier::ContentId;

pub const HASH: &str = "311edf6121b1f365201520f914219b5cec9890ae";

/// In-memory record store with call counting
#[derive(Default)]
pub struct FakeStore {
    rows: Mutex<Vec<ExternalRecord>>,
    queries: AtomicUsize,
    failure: Mutex<Option<String>>,
    delay: Mutex<Option<Duration>>,
}

impl FakeStore {
    pub fn insert(&self, record: ExternalRecord) {
        self.rows.lock().push(record);
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn fail_queries(&self, reason: &str) {
        *self.failure.lock() = Some(reason.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }
}

impl RecordStore for FakeStore {
    fn find_by_info_hash(&self, info_hash: &str) -> Result<Vec<ExternalRecord>> {
        self.queries.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        if let Some(reason) = self.failure.lock().clone() {
            return Err(LookupError::Store(reason));
        }

        Ok(self
            .rows
            .lock()
            .iter()
            .filter(|r| r.info_hash.as_deref() == Some(info_hash))
            .cloned()
            .collect())
    }

    fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Connector handing out a [`FakeStore`], or failing on demand
#[derive(Clone)]
pub struct FakeConnector {
    store: Arc<FakeStore>,
    failure: Arc<Mutex<Option<String>>>,
    attempts: Arc<AtomicUsize>,
}

impl FakeConnector {
    pub fn healthy(store: Arc<FakeStore>) -> Self {
        Self {
            store,
            failure: Arc::new(Mutex::new(None)),
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(reason: &str) -> Self {
        let connector = Self::healthy(Arc::new(FakeStore::default()));
        connector.set_failure(Some(reason));
        connector
    }

    pub fn set_failure(&self, reason: Option<&str>) {
        *self.failure.lock() = reason.map(str::to_string);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl StoreConnector for FakeConnector {
    fn connect(&self, _config: &Config) -> Result<Arc<dyn RecordStore>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        match self.failure.lock().clone() {
            Some(reason) => Err(LookupError::Store(reason)),
            None => Ok(self.store.clone()),
        }
    }
}

/// Builds bencoded torrent metainfo
#[derive(Debug, Clone)]
pub struct TorrentFixture {
    name: String,
    files: Vec<(String, u64)>,
    multi: bool,
    piece_length: u64,
    pieces: Option<u64>,
    announce: Option<String>,
    tiers: Vec<Vec<String>>,
}

impl TorrentFixture {
    pub fn single(name: &str, length: u64, piece_length: u64) -> Self {
        Self {
            name: name.to_string(),
            files: vec![(name.to_string(), length)],
            multi: false,
            piece_length,
            pieces: None,
            announce: None,
            tiers: Vec::new(),
        }
    }

    pub fn multi(name: &str, files: &[(&str, u64)], piece_length: u64) -> Self {
        Self {
            name: name.to_string(),
            files: files.iter().map(|(p, l)| (p.to_string(), *l)).collect(),
            multi: true,
            piece_length,
            pieces: None,
            announce: None,
            tiers: Vec::new(),
        }
    }

    /// Override the number of piece hashes
    pub fn pieces(mut self, count: u64) -> Self {
        self.pieces = Some(count);
        self
    }

    pub fn announce(mut self, url: &str) -> Self {
        self.announce = Some(url.to_string());
        self
    }

    pub fn tiers(mut self, tiers: &[&[&str]]) -> Self {
        self.tiers = tiers
            .iter()
            .map(|tier| tier.iter().map(|s| s.to_string()).collect())
            .collect();
        self
    }

    pub fn encode_info(&self) -> Vec<u8> {
        let total: u64 = self.files.iter().map(|(_, l)| l).sum();
        let count = self.pieces.unwrap_or_else(|| total.div_ceil(self.piece_length));

        let mut out = vec![b'd'];
        if self.multi {
            put_str(&mut out, "files");
            out.push(b'l');
            for (path, length) in &self.files {
                out.push(b'd');
                put_str(&mut out, "length");
                put_int(&mut out, *length as i64);
                put_str(&mut out, "path");
                out.push(b'l');
                for segment in path.split('/') {
                    put_str(&mut out, segment);
                }
                out.push(b'e');
                out.push(b'e');
            }
            out.push(b'e');
        } else {
            put_str(&mut out, "length");
            put_int(&mut out, self.files[0].1 as i64);
        }
        put_str(&mut out, "name");
        put_str(&mut out, &self.name);
        put_str(&mut out, "piece length");
        put_int(&mut out, self.piece_length as i64);
        put_str(&mut out, "pieces");
        let pieces: Vec<u8> = (0..count).flat_map(|i| [i as u8; 20]).collect();
        put_bytes(&mut out, &pieces);
        out.push(b'e');
        out
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![b'd'];
        if let Some(url) = &self.announce {
            put_str(&mut out, "announce");
            put_str(&mut out, url);
        }
        if !self.tiers.is_empty() {
            put_str(&mut out, "announce-list");
            out.push(b'l');
            for tier in &self.tiers {
                out.push(b'l');
                for url in tier {
                    put_str(&mut out, url);
                }
                out.push(b'e');
            }
            out.push(b'e');
        }
        put_str(&mut out, "info");
        out.extend(self.encode_info());
        out.push(b'e');
        out
    }

    pub fn info_hash(&self) -> ContentId {
        let digest: [u8; 20] = Sha1::digest(self.encode_info()).into();
        ContentId::from_bytes(digest)
    }
}

fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend(format!("{}:", bytes.len()).into_bytes());
    out.extend_from_slice(bytes);
}

fn put_str(out: &mut Vec<u8>, s: &str) {
    put_bytes(out, s.as_bytes());
}

fn put_int(out: &mut Vec<u8>, i: i64) {
    out.extend(format!("i{}e", i).into_bytes());
}
