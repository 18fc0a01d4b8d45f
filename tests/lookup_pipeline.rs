//! End-to-end registry miss handling through the public API

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tempfile::TempDir;

use seedbank_lookup::db::{ConnectionState, ExternalRecord, RecordStore, StoreConnector};
use seedbank_lookup::descriptor::DescriptorLayout;
use seedbank_lookup::{
    Config, ContentId, EventCode, LookupError, MemoryRegistry, MemorySink, Registry, SeedbankPlugin,
};

#[derive(Default)]
struct TableStore {
    rows: Mutex<Vec<ExternalRecord>>,
    queries: AtomicUsize,
}

impl RecordStore for TableStore {
    fn find_by_info_hash(&self, info_hash: &str) -> seedbank_lookup::Result<Vec<ExternalRecord>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .rows
            .lock()
            .iter()
            .filter(|r| r.info_hash.as_deref() == Some(info_hash))
            .cloned()
            .collect())
    }

    fn ping(&self) -> seedbank_lookup::Result<()> {
        Ok(())
    }
}

struct TableConnector {
    store: Option<Arc<TableStore>>,
}

impl StoreConnector for TableConnector {
    fn connect(&self, _config: &Config) -> seedbank_lookup::Result<Arc<dyn RecordStore>> {
        match &self.store {
            Some(store) => Ok(store.clone()),
            None => Err(LookupError::Store("connection refused".into())),
        }
    }
}

/// Minimal single-file torrent: `d4:infod6:lengthi..e4:name..12:piece lengthi..e6:pieces..ee`
fn torrent_bytes(name: &str, length: u64, piece_length: u64) -> Vec<u8> {
    let pieces = length.div_ceil(piece_length) as usize;
    let mut out = Vec::new();
    let announce = "http://tracker.test/announce";
    out.extend_from_slice(format!("d8:announce{}:{}4:infod", announce.len(), announce).as_bytes());
    out.extend_from_slice(format!("6:lengthi{}e", length).as_bytes());
    out.extend_from_slice(format!("4:name{}:{}", name.len(), name).as_bytes());
    out.extend_from_slice(format!("12:piece lengthi{}e", piece_length).as_bytes());
    out.extend_from_slice(format!("6:pieces{}:", pieces * 20).as_bytes());
    out.extend(std::iter::repeat(0xabu8).take(pieces * 20));
    out.extend_from_slice(b"ee");
    out
}

struct Harness {
    _dir: TempDir,
    plugin: SeedbankPlugin<MemoryRegistry>,
    registry: Arc<MemoryRegistry>,
    store: Arc<TableStore>,
    sink: Arc<MemorySink>,
}

fn harness(healthy: bool) -> Harness {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(TableStore::default());
    let sink = Arc::new(MemorySink::default());
    let config = Config {
        descriptor_root: dir.path().to_path_buf(),
        ..Config::default()
    };
    let connector = TableConnector {
        store: healthy.then(|| store.clone()),
    };
    let plugin = SeedbankPlugin::new(config, Arc::new(connector), sink.clone()).unwrap();
    let registry = Arc::new(MemoryRegistry::new());
    plugin.on_plugin_attached(registry.clone());

    Harness {
        _dir: dir,
        plugin,
        registry,
        store,
        sink,
    }
}

fn stored(h: &Harness, name: &str) -> ContentId {
    h.plugin
        .layout()
        .store(&torrent_bytes(name, 5000, 1024))
        .unwrap()
        .info_hash
}

#[test]
fn activates_a_known_torrent_as_trackerless_seed() {
    let h = harness(true);
    let id = stored(&h, "album.flac");
    h.store
        .rows
        .lock()
        .push(ExternalRecord::new(id.to_hex(), "/srv/seedbank/album"));

    let entry = h.plugin.on_registry_miss(&id, Weak::new(), true).upgrade().unwrap();

    assert_eq!(entry.info_hash, id);
    assert_eq!(entry.descriptor.name, "album.flac");
    assert_eq!(entry.save_path.to_str(), Some("/srv/seedbank/album"));
    let state = entry.state();
    assert!(state.trackers.is_empty());
    assert!(state.complete);
    assert!(state.allow_peers);
    assert!(!state.graceful_pause);
    assert!(h.registry.contains(&id));
    assert_eq!(h.sink.codes(), vec![201, 202]);
    assert_eq!(
        h.sink.events()[1].message,
        format!("Activated new torrent: {}", id)
    );
}

#[test]
fn second_miss_with_live_reference_does_no_io() {
    let h = harness(true);
    let id = stored(&h, "a.bin");
    h.store.rows.lock().push(ExternalRecord::new(id.to_hex(), "/data"));

    let first = h.plugin.on_registry_miss(&id, Weak::new(), true);
    assert!(first.upgrade().is_some());
    let queries = h.store.queries.load(Ordering::SeqCst);

    let second = h.plugin.on_registry_miss(&id, first.clone(), true);
    assert!(Weak::ptr_eq(&first, &second));
    assert_eq!(h.store.queries.load(Ordering::SeqCst), queries);
}

#[test]
fn unknown_hash_reports_not_found() {
    let h = harness(true);
    let id: ContentId = "311edf6121b1f365201520f914219b5cec9890ae".parse().unwrap();

    assert!(h.plugin.on_registry_miss(&id, Weak::new(), true).upgrade().is_none());
    let last = h.sink.events().pop().unwrap();
    assert_eq!(last.code, EventCode::TorrentNotFound);
    assert_eq!(last.to_string(), format!("(401) Torrent not found: {}", id));
    assert!(h.registry.is_empty());
}

#[test]
fn record_without_descriptor_reports_invalid_file() {
    let h = harness(true);
    let id: ContentId = "0123456789abcdef0123456789abcdef01234567".parse().unwrap();
    h.store.rows.lock().push(ExternalRecord::new(id.to_hex(), "/data"));

    assert!(h.plugin.on_registry_miss(&id, Weak::new(), true).upgrade().is_none());
    assert_eq!(h.sink.codes(), vec![201, 503]);
}

#[test]
fn opt_out_never_touches_the_store() {
    let h = harness(true);
    let id = stored(&h, "a.bin");
    h.store.rows.lock().push(ExternalRecord::new(id.to_hex(), "/data"));

    assert!(h.plugin.on_registry_miss(&id, Weak::new(), false).upgrade().is_none());
    assert_eq!(h.store.queries.load(Ordering::SeqCst), 0);
    assert_eq!(h.sink.codes(), vec![201]);
}

#[test]
fn failed_connection_short_circuits_every_lookup() {
    let h = harness(false);
    assert_eq!(h.plugin.gate().state(), ConnectionState::Failed);
    let id = stored(&h, "a.bin");

    for _ in 0..3 {
        assert!(h.plugin.on_registry_miss(&id, Weak::new(), true).upgrade().is_none());
    }
    assert_eq!(h.sink.codes(), vec![501, 502, 502, 502]);
    assert_eq!(h.store.queries.load(Ordering::SeqCst), 0);
}

#[test]
fn stored_descriptor_lands_in_sharded_path_and_is_removable() {
    let dir = TempDir::new().unwrap();
    let layout = DescriptorLayout::new(dir.path(), 4, "torrent").unwrap();

    let stored = layout.store(&torrent_bytes("x.iso", 2048, 1024)).unwrap();
    let hex = stored.info_hash.to_hex();
    let expected = dir
        .path()
        .join(&hex[0..1])
        .join(&hex[1..2])
        .join(&hex[2..3])
        .join(&hex[3..4])
        .join(format!("{}.torrent", hex));
    assert_eq!(stored.path, expected);
    assert!(layout.exists(&stored.info_hash));

    layout.remove(&stored.info_hash).unwrap();
    assert!(!layout.exists(&stored.info_hash));
    assert!(!dir.path().join(&hex[0..1]).exists());
    assert!(dir.path().exists());
}
