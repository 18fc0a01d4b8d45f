//! Record store client and connection gate

pub mod gate;
pub mod record;
pub mod store;

pub use gate::{ConnectionGate, ConnectionState, GateStatus};
pub use record::ExternalRecord;
pub use store::{connection_uri, MongoConnector, MongoRecordStore, RecordStore, StoreConnector};
