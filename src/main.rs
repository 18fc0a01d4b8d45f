//! seedbank-lookup - operator tool for the seedbank descriptor store

use anyhow::{bail, Context};
use clap::Parser;
use serde_json::json;
use std::sync::{Arc, Weak};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use seedbank_lookup::{
    cli::{Args, Command},
    db::{ConnectionGate, ConnectionState, MongoConnector},
    descriptor::DescriptorLayout,
    events::{EventEmitter, MemorySink},
    ContentId, MemoryRegistry, Registry, SeedbankPlugin, TracingSink,
};

fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Logs go to stderr; stdout carries command output
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("seedbank_lookup={},info", args.log_level).into());
    let json_layer = args
        .log_json
        .then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr));
    let text_layer = (!args.log_json)
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));
    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();

    let config = match args.resolve_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    match args.command {
        Command::Resolve { info_hash } => {
            let id: ContentId = info_hash.parse()?;
            let sink = Arc::new(MemorySink::default());
            let plugin = SeedbankPlugin::<MemoryRegistry>::new(config, Arc::new(MongoConnector), sink.clone())?;
            let registry = Arc::new(MemoryRegistry::new());

            plugin.on_plugin_attached(Arc::clone(&registry));
            let entry = plugin.on_registry_miss(&id, Weak::new(), true).upgrade();

            for event in sink.drain() {
                println!("{}", serde_json::to_string(&event)?);
            }

            let Some(entry) = entry else {
                bail!("torrent {} was not activated", id);
            };
            println!(
                "{}",
                json!({
                    "info_hash": entry.info_hash,
                    "name": entry.descriptor.name,
                    "save_path": entry.save_path,
                    "total_size": entry.descriptor.total_size,
                    "state": entry.state(),
                    "in_registry": registry.contains(&id),
                })
            );
        }

        Command::Path { info_hash } => {
            let id: ContentId = info_hash.parse()?;
            let layout = DescriptorLayout::from_config(&config)?;
            println!("{}", layout.path_for(&id).display());
        }

        Command::Store { file } => {
            let layout = DescriptorLayout::from_config(&config)?;
            let stored = layout
                .store_file(&file)
                .with_context(|| format!("storing {}", file.display()))?;
            if stored.already_existed {
                info!(info_hash = %stored.info_hash, "Descriptor was already stored");
            }
            println!("{} {}", stored.info_hash, stored.path.display());
        }

        Command::Remove { info_hash } => {
            let id: ContentId = info_hash.parse()?;
            let layout = DescriptorLayout::from_config(&config)?;
            let path = layout.remove(&id)?;
            println!("removed {}", path.display());
        }

        Command::Ping => {
            // Same gate the plugin uses, so 201/501 land in the log
            let events = EventEmitter::new(Arc::new(TracingSink::default()));
            let gate = ConnectionGate::new(config, Arc::new(MongoConnector), events);
            gate.connect();

            let status = gate.status();
            println!("{}", serde_json::to_string(&status)?);
            if status.state != ConnectionState::Connected {
                bail!("record store is not reachable");
            }
        }
    }

    Ok(())
}
