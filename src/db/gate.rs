//! Connection health gate
//!
//! Owns the record store handle and its connection state. State moves
//! `disconnected -> connected`, `disconnected -> failed` or
//! `connected -> failed`; leaving `failed` takes an explicit
//! [`ConnectionGate::reconnect`]. No reconnect happens on its own.
//!
//! Connection attempts are serialized on their own lock. The state lock is
//! only held to read or publish state, so lookups see `disconnected` while a
//! slow connect is still running instead of blocking behind it.

use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::Config;
use crate::db::store::{RecordStore, StoreConnector};
use crate::events::{EventCode, EventEmitter};

/// Record store connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Failed,
}

/// Snapshot reported to operators
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateStatus {
    pub state: ConnectionState,
    pub last_error: Option<String>,
}

struct GateInner {
    state: ConnectionState,
    store: Option<Arc<dyn RecordStore>>,
    last_error: Option<String>,
}

pub struct ConnectionGate {
    config: Config,
    connector: Arc<dyn StoreConnector>,
    events: EventEmitter,
    inner: RwLock<GateInner>,
    attempt: Mutex<()>,
}

impl ConnectionGate {
    pub fn new(config: Config, connector: Arc<dyn StoreConnector>, events: EventEmitter) -> Self {
        Self {
            config,
            connector,
            events,
            inner: RwLock::new(GateInner {
                state: ConnectionState::Disconnected,
                store: None,
                last_error: None,
            }),
            attempt: Mutex::new(()),
        }
    }

    /// Attempt the connection. Only acts from `disconnected`; otherwise the
    /// current state is returned unchanged.
    pub fn connect(&self) -> ConnectionState {
        let attempt = self.attempt.lock();
        let state = self.state();
        if state != ConnectionState::Disconnected {
            debug!(state = ?state, "Connect skipped, gate is not disconnected");
            return state;
        }
        self.attempt_connect(attempt)
    }

    /// Drop any existing handle and connect again
    pub fn reconnect(&self) -> ConnectionState {
        let attempt = self.attempt.lock();
        {
            let mut inner = self.inner.write();
            inner.state = ConnectionState::Disconnected;
            inner.store = None;
        }
        self.attempt_connect(attempt)
    }

    fn attempt_connect(&self, attempt: MutexGuard<'_, ()>) -> ConnectionState {
        let result = self.connector.connect(&self.config).map_err(|e| e.to_string());

        {
            let mut inner = self.inner.write();
            match &result {
                Ok(store) => {
                    inner.state = ConnectionState::Connected;
                    inner.store = Some(Arc::clone(store));
                    inner.last_error = None;
                }
                Err(reason) => {
                    inner.state = ConnectionState::Failed;
                    inner.store = None;
                    inner.last_error = Some(reason.clone());
                }
            }
        }
        drop(attempt);

        // Events go out after both locks are released so a sink may query the gate.
        match result {
            Ok(_) => {
                self.events
                    .post(EventCode::DbConnectOk, || "mongodb connection okay".to_string());
                ConnectionState::Connected
            }
            Err(reason) => {
                warn!(error = %reason, "Record store connection failed");
                self.events.post(EventCode::DbConnectError, || reason);
                ConnectionState::Failed
            }
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.inner.read().state == ConnectionState::Connected
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.read().state
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.read().last_error.clone()
    }

    pub fn status(&self) -> GateStatus {
        let inner = self.inner.read();
        GateStatus {
            state: inner.state,
            last_error: inner.last_error.clone(),
        }
    }

    /// The store handle, only while connected
    pub fn healthy_store(&self) -> Option<Arc<dyn RecordStore>> {
        let inner = self.inner.read();
        match inner.state {
            ConnectionState::Connected => inner.store.clone(),
            _ => None,
        }
    }

    /// Record a failure seen while using a connected store
    pub fn mark_failed(&self, reason: &str) {
        let mut inner = self.inner.write();
        if inner.state == ConnectionState::Connected {
            warn!(error = %reason, "Record store connection marked failed");
            inner.state = ConnectionState::Failed;
            inner.store = None;
            inner.last_error = Some(reason.to_string());
        }
    }
}
