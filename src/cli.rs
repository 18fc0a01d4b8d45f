//! Command-line arguments for the operator binary
//!
//! Every config key can come from a flag, an environment variable or a TOML
//! file given with `--config`. Flags and environment win over the file,
//! which wins over built-in defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;
use crate::error::LookupError;

/// Seedbank lookup - activate offline torrents from the record store
#[derive(Parser, Debug, Clone)]
#[command(name = "seedbank-lookup")]
#[command(about = "Resolve, store and remove seedbank torrent descriptors")]
pub struct Args {
    /// TOML config file
    #[arg(long, env = "SEEDBANK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Record store address (host:port or mongodb:// URI)
    #[arg(long, env = "SEEDBANK_CONNECTION_STRING")]
    pub connection_string: Option<String>,

    /// Record namespace as <database>.<collection>
    #[arg(long, env = "SEEDBANK_RECORD_NAMESPACE")]
    pub record_namespace: Option<String>,

    /// Root of the sharded descriptor tree
    #[arg(long, env = "SEEDBANK_DESCRIPTOR_ROOT")]
    pub descriptor_root: Option<PathBuf>,

    /// Directory levels below the descriptor root
    #[arg(long, env = "SEEDBANK_SHARD_DEPTH")]
    pub shard_depth: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run a registry miss for an info hash against an empty registry
    Resolve {
        /// 40-character hex info hash
        info_hash: String,
    },

    /// Print the sharded descriptor path for an info hash
    Path {
        /// 40-character hex info hash
        info_hash: String,
    },

    /// Copy a .torrent file into its sharded location
    Store {
        /// Descriptor file to store
        file: PathBuf,
    },

    /// Delete a stored descriptor and prune empty shard directories
    Remove {
        /// 40-character hex info hash
        info_hash: String,
    },

    /// Connect to the record store and print the gate state
    Ping,
}

impl Args {
    /// Resolve the effective configuration
    pub fn resolve_config(&self) -> Result<Config, LookupError> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if let Some(v) = &self.connection_string {
            config.connection_string = v.clone();
        }
        if let Some(v) = &self.record_namespace {
            config.record_namespace = v.clone();
        }
        if let Some(v) = &self.descriptor_root {
            config.descriptor_root = v.clone();
        }
        if let Some(v) = self.shard_depth {
            config.shard_depth = v;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_subcommands() {
        let args = Args::try_parse_from(["seedbank-lookup", "path", "311edf6121b1f365201520f914219b5cec9890ae"])
            .unwrap();
        assert!(matches!(args.command, Command::Path { ref info_hash } if info_hash.starts_with("311e")));

        let args = Args::try_parse_from(["seedbank-lookup", "--shard-depth", "2", "ping"]).unwrap();
        assert!(matches!(args.command, Command::Ping));
        assert_eq!(args.shard_depth, Some(2));

        assert!(Args::try_parse_from(["seedbank-lookup"]).is_err());
    }

    #[test]
    fn test_flags_override_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("seedbank.toml");
        std::fs::write(&path, "descriptor_root = \"/from/file\"\nshard_depth = 3\n").unwrap();

        let args = Args::try_parse_from([
            "seedbank-lookup",
            "--config",
            path.to_str().unwrap(),
            "--shard-depth",
            "5",
            "ping",
        ])
        .unwrap();

        let config = args.resolve_config().unwrap();
        assert_eq!(config.descriptor_root, PathBuf::from("/from/file"));
        assert_eq!(config.shard_depth, 5);
        assert_eq!(config.record_namespace, "seedbank.torrent");
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let args = Args::try_parse_from(["seedbank-lookup", "--record-namespace", "nodot", "ping"]).unwrap();
        assert!(args.resolve_config().is_err());
    }
}
