//! Host-facing plugin
//!
//! Wires the pipeline together from a parameter map and exposes the two hooks
//! a host drives: attachment, which makes the initial record store
//! connection, and registry misses.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};
use tracing::{info, warn};

use crate::config::Config;
use crate::db::{ConnectionGate, ConnectionState, MongoConnector, StoreConnector};
use crate::descriptor::{DescriptorLayout, DescriptorLoader};
use crate::error::Result;
use crate::events::{EventEmitter, EventSink};
use crate::identifier::ContentId;
use crate::orchestrator::{ActivationStats, Activator};
use crate::registry::Registry;
use crate::resolver::RecordResolver;

pub struct SeedbankPlugin<R: Registry> {
    config: Config,
    layout: DescriptorLayout,
    gate: Arc<ConnectionGate>,
    events: EventEmitter,
    activator: OnceLock<Activator<R>>,
}

impl<R: Registry> SeedbankPlugin<R> {
    pub fn new(
        config: Config,
        connector: Arc<dyn StoreConnector>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        config.validate()?;
        let layout = DescriptorLayout::from_config(&config)?;
        let events = EventEmitter::new(sink);
        let gate = Arc::new(ConnectionGate::new(config.clone(), connector, events.clone()));

        Ok(Self {
            config,
            layout,
            gate,
            events,
            activator: OnceLock::new(),
        })
    }

    /// Build from a host parameter map, backed by MongoDB
    pub fn from_params(params: &HashMap<String, String>, sink: Arc<dyn EventSink>) -> Result<Self> {
        Self::new(Config::from_params(params)?, Arc::new(MongoConnector), sink)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn gate(&self) -> &ConnectionGate {
        &self.gate
    }

    pub fn layout(&self) -> &DescriptorLayout {
        &self.layout
    }

    /// Attach to the host registry and make the initial connection attempt
    pub fn on_plugin_attached(&self, registry: Arc<R>) -> ConnectionState {
        let activator = Activator::new(
            registry,
            RecordResolver::new(Arc::clone(&self.gate), self.events.clone()),
            DescriptorLoader::new(self.layout.clone(), self.events.clone()),
            self.events.clone(),
        )
        .with_coalesce_timeout(self.config.coalesce_timeout());

        if self.activator.set(activator).is_err() {
            warn!("Plugin already attached, ignoring");
            return self.gate.state();
        }

        info!(
            namespace = %self.config.record_namespace,
            descriptor_root = %self.config.descriptor_root.display(),
            "Seedbank lookup plugin attached"
        );
        self.gate.connect()
    }

    /// Host registry-miss hook. Before attachment the input is returned as is.
    pub fn on_registry_miss(
        &self,
        id: &ContentId,
        existing: Weak<R::Entry>,
        allow_external_lookup: bool,
    ) -> Weak<R::Entry> {
        match self.activator.get() {
            Some(activator) => activator.find_or_activate(id, existing, allow_external_lookup),
            None => existing,
        }
    }

    pub fn stats(&self) -> Option<ActivationStats> {
        self.activator.get().map(Activator::stats)
    }
}
