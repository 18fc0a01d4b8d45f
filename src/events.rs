//! Lookup events delivered to the host
//!
//! The pipeline reports every outcome as one of a fixed set of coded events.
//! Delivery goes through an [`EventSink`] supplied by the host. The sink is
//! asked whether it wants an event code before the message is formatted, so
//! suppressed classes cost nothing.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Closed taxonomy of lookup outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCode {
    /// Record store connection established
    DbConnectOk,
    /// Torrent activated into the registry
    TorrentActivated,
    /// No record matched the info hash
    TorrentNotFound,
    /// Anything not covered by a more specific code
    UnclassifiedError,
    /// Initial connection attempt failed
    DbConnectError,
    /// Query attempted while the connection is unhealthy
    DbConnectionFailed,
    /// Descriptor file missing or failed to parse
    InvalidTorrentFile,
}

impl EventCode {
    pub const ALL: [EventCode; 7] = [
        EventCode::DbConnectOk,
        EventCode::TorrentActivated,
        EventCode::TorrentNotFound,
        EventCode::UnclassifiedError,
        EventCode::DbConnectError,
        EventCode::DbConnectionFailed,
        EventCode::InvalidTorrentFile,
    ];

    /// Numeric wire code
    pub fn code(self) -> u16 {
        match self {
            EventCode::DbConnectOk => 201,
            EventCode::TorrentActivated => 202,
            EventCode::TorrentNotFound => 401,
            EventCode::UnclassifiedError => 500,
            EventCode::DbConnectError => 501,
            EventCode::DbConnectionFailed => 502,
            EventCode::InvalidTorrentFile => 503,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }

    pub fn severity(self) -> Severity {
        match self {
            EventCode::DbConnectOk | EventCode::TorrentActivated => Severity::Info,
            EventCode::TorrentNotFound => Severity::Warning,
            EventCode::UnclassifiedError
            | EventCode::DbConnectError
            | EventCode::DbConnectionFailed
            | EventCode::InvalidTorrentFile => Severity::Error,
        }
    }
}

/// A delivered lookup event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupEvent {
    pub timestamp: DateTime<Utc>,
    pub code: EventCode,
    pub severity: Severity,
    pub message: String,
}

impl LookupEvent {
    pub fn new(code: EventCode, message: String) -> Self {
        Self {
            timestamp: Utc::now(),
            code,
            severity: code.severity(),
            message,
        }
    }
}

impl fmt::Display for LookupEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) {}", self.code.code(), self.message)
    }
}

/// Host event channel
pub trait EventSink: Send + Sync {
    /// Whether events with this code would be delivered at all
    fn would_deliver(&self, code: EventCode) -> bool;

    fn emit(&self, event: LookupEvent);
}

/// Sink that writes events into the tracing log
#[derive(Debug, Clone)]
pub struct TracingSink {
    min_severity: Severity,
}

impl TracingSink {
    pub fn new(min_severity: Severity) -> Self {
        Self { min_severity }
    }
}

impl Default for TracingSink {
    fn default() -> Self {
        Self::new(Severity::Info)
    }
}

impl EventSink for TracingSink {
    fn would_deliver(&self, code: EventCode) -> bool {
        code.severity() >= self.min_severity
    }

    fn emit(&self, event: LookupEvent) {
        let code = event.code.code();
        match event.severity {
            Severity::Info => info!(code, "{}", event.message),
            Severity::Warning => warn!(code, "{}", event.message),
            Severity::Error => error!(code, "{}", event.message),
        }
    }
}

/// Sink that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn would_deliver(&self, _code: EventCode) -> bool {
        false
    }

    fn emit(&self, _event: LookupEvent) {}
}

/// Sink that keeps delivered events in memory for later inspection
#[derive(Debug, Default)]
pub struct MemorySink {
    rejected: Vec<EventCode>,
    events: Mutex<Vec<LookupEvent>>,
}

impl MemorySink {
    /// A sink that declines the given codes
    pub fn rejecting(codes: &[EventCode]) -> Self {
        Self {
            rejected: codes.to_vec(),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<LookupEvent> {
        self.events.lock().clone()
    }

    pub fn codes(&self) -> Vec<u16> {
        self.events.lock().iter().map(|e| e.code.code()).collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Take every event delivered so far
    pub fn drain(&self) -> Vec<LookupEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl EventSink for MemorySink {
    fn would_deliver(&self, code: EventCode) -> bool {
        !self.rejected.contains(&code)
    }

    fn emit(&self, event: LookupEvent) {
        self.events.lock().push(event);
    }
}

/// Shared handle used by every pipeline component to post events
#[derive(Clone)]
pub struct EventEmitter {
    sink: Arc<dyn EventSink>,
}

impl EventEmitter {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    /// Post an event. `message` runs only if the sink accepts the code.
    pub fn post<F>(&self, code: EventCode, message: F)
    where
        F: FnOnce() -> String,
    {
        if !self.sink.would_deliver(code) {
            debug!(code = code.code(), "Event suppressed by sink");
            return;
        }
        self.sink.emit(LookupEvent::new(code, message()));
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter").finish_non_exhaustive()
    }
}
