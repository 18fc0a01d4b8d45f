//! Record store access
//!
//! The resolver only needs one query: all rows whose `info_hash` equals a hex
//! string. [`RecordStore`] is that seam; [`MongoRecordStore`] implements it on
//! the blocking MongoDB client, which keeps its own connection pool so
//! concurrent lookups never queue behind a single socket.

use bson::{doc, Document};
use mongodb::sync::{Client, Collection};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Config;
use crate::db::record::ExternalRecord;
use crate::error::{LookupError, Result};

/// Queryable torrent record store
pub trait RecordStore: Send + Sync {
    /// All rows keyed by `info_hash`, in store iteration order
    fn find_by_info_hash(&self, info_hash: &str) -> Result<Vec<ExternalRecord>>;

    /// Round-trip to the store
    fn ping(&self) -> Result<()>;
}

/// Opens a [`RecordStore`] from configuration
pub trait StoreConnector: Send + Sync {
    fn connect(&self, config: &Config) -> Result<Arc<dyn RecordStore>>;
}

/// Connects to MongoDB
#[derive(Debug, Clone, Copy, Default)]
pub struct MongoConnector;

impl StoreConnector for MongoConnector {
    fn connect(&self, config: &Config) -> Result<Arc<dyn RecordStore>> {
        Ok(Arc::new(MongoRecordStore::connect(config)?))
    }
}

/// Torrent collection in MongoDB
#[derive(Debug, Clone)]
pub struct MongoRecordStore {
    client: Client,
    db_name: String,
    collection: Collection<Document>,
}

impl MongoRecordStore {
    pub fn connect(config: &Config) -> Result<Self> {
        let (db_name, coll_name) = config.namespace()?;
        let uri = connection_uri(&config.connection_string);
        info!(uri = %uri, namespace = %config.record_namespace, "Connecting to MongoDB");

        let client = Client::with_uri_str(&uri)
            .map_err(|e| LookupError::Store(format!("Failed to connect to MongoDB: {}", e)))?;
        let collection = client.database(db_name).collection::<Document>(coll_name);

        let store = Self {
            client,
            db_name: db_name.to_string(),
            collection,
        };
        store.ping()?;

        info!("Connected to MongoDB database '{}'", db_name);
        Ok(store)
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }
}

impl RecordStore for MongoRecordStore {
    fn find_by_info_hash(&self, info_hash: &str) -> Result<Vec<ExternalRecord>> {
        // Ascending _id puts the most recently inserted record last.
        let cursor = self
            .collection
            .find(doc! { "info_hash": info_hash })
            .sort(doc! { "_id": 1 })
            .run()
            .map_err(|e| LookupError::Store(format!("Find failed: {}", e)))?;

        let mut records = Vec::new();
        for doc in cursor {
            let doc = doc.map_err(|e| LookupError::Store(format!("Cursor failed: {}", e)))?;
            records.push(ExternalRecord::from_document(&doc));
        }

        debug!(info_hash = %info_hash, rows = records.len(), "Queried torrent records");
        Ok(records)
    }

    fn ping(&self) -> Result<()> {
        self.client
            .database(&self.db_name)
            .run_command(doc! { "ping": 1 })
            .run()
            .map_err(|e| LookupError::Store(format!("MongoDB ping failed: {}", e)))?;
        Ok(())
    }
}

/// Turn `host:port` into a `mongodb://` URI with short selection timeouts so
/// an unreachable server fails the connect instead of hanging the host.
pub fn connection_uri(connection_string: &str) -> String {
    let trimmed = connection_string.trim();
    let uri = if trimmed.starts_with("mongodb://") || trimmed.starts_with("mongodb+srv://") {
        trimmed.to_string()
    } else {
        format!("mongodb://{}", trimmed)
    };

    if uri.contains("serverSelectionTimeoutMS") {
        return uri;
    }

    let params = "serverSelectionTimeoutMS=3000&connectTimeoutMS=3000";
    if uri.contains('?') {
        format!("{}&{}", uri, params)
    } else if uri.matches('/').count() > 2 {
        format!("{}?{}", uri, params)
    } else {
        format!("{}/?{}", uri, params)
    }
}
