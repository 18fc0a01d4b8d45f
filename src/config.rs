//! Configuration for seedbank-lookup
//!
//! The host hands the plugin a flat string map. Every key has a default and
//! the map is resolved exactly once, when the plugin is constructed. The
//! operator binary can also load the same keys from a TOML file.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::LookupError;
use crate::identifier::HEX_LEN;
use crate::sharding::DEFAULT_SHARD_DEPTH;

pub const KEY_CONNECTION_STRING: &str = "connection_string";
pub const KEY_RECORD_NAMESPACE: &str = "record_namespace";
pub const KEY_DESCRIPTOR_ROOT: &str = "descriptor_root";
pub const KEY_SHARD_DEPTH: &str = "shard_depth";
pub const KEY_DESCRIPTOR_EXTENSION: &str = "descriptor_extension";
pub const KEY_COALESCE_TIMEOUT_MS: &str = "coalesce_timeout_ms";

/// Resolved plugin configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Record store address, `host:port` or a full `mongodb://` URI
    #[serde(default = "default_connection_string")]
    pub connection_string: String,

    /// `<database>.<collection>` holding torrent records
    #[serde(default = "default_record_namespace")]
    pub record_namespace: String,

    /// Root of the sharded descriptor layout
    #[serde(default = "default_descriptor_root")]
    pub descriptor_root: PathBuf,

    /// Number of one-character directory levels below the root
    #[serde(default = "default_shard_depth")]
    pub shard_depth: usize,

    /// Descriptor file extension, without the dot
    #[serde(default = "default_descriptor_extension")]
    pub descriptor_extension: String,

    /// How long a miss waits on another caller's resolution of the same id
    /// before giving up and returning its input
    #[serde(default = "default_coalesce_timeout_ms")]
    pub coalesce_timeout_ms: u64,
}

fn default_connection_string() -> String {
    "localhost:27017".to_string()
}

fn default_record_namespace() -> String {
    "seedbank.torrent".to_string()
}

fn default_descriptor_root() -> PathBuf {
    PathBuf::from("/var/lib/seedbank/torrents")
}

fn default_shard_depth() -> usize {
    DEFAULT_SHARD_DEPTH
}

fn default_descriptor_extension() -> String {
    "torrent".to_string()
}

fn default_coalesce_timeout_ms() -> u64 {
    5000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connection_string: default_connection_string(),
            record_namespace: default_record_namespace(),
            descriptor_root: default_descriptor_root(),
            shard_depth: default_shard_depth(),
            descriptor_extension: default_descriptor_extension(),
            coalesce_timeout_ms: default_coalesce_timeout_ms(),
        }
    }
}

impl Config {
    /// Resolve a host parameter map, falling back to defaults per key
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, LookupError> {
        let mut config = Self::default();

        for (key, value) in params {
            match key.as_str() {
                KEY_CONNECTION_STRING => config.connection_string = value.clone(),
                KEY_RECORD_NAMESPACE => config.record_namespace = value.clone(),
                KEY_DESCRIPTOR_ROOT => config.descriptor_root = PathBuf::from(value),
                KEY_SHARD_DEPTH => {
                    config.shard_depth = value.trim().parse().map_err(|_| {
                        LookupError::Config(format!("{} must be an integer, got {:?}", key, value))
                    })?;
                }
                KEY_COALESCE_TIMEOUT_MS => {
                    config.coalesce_timeout_ms = value.trim().parse().map_err(|_| {
                        LookupError::Config(format!("{} must be an integer, got {:?}", key, value))
                    })?;
                }
                KEY_DESCRIPTOR_EXTENSION => {
                    config.descriptor_extension = value.trim_start_matches('.').to_string()
                }
                other => debug!(key = %other, "Ignoring unknown plugin parameter"),
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Load config from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LookupError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            LookupError::Config(format!("{}: {}", path.as_ref().display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), LookupError> {
        if self.shard_depth == 0 || self.shard_depth > HEX_LEN {
            return Err(LookupError::Config(format!(
                "shard_depth must be between 1 and {}",
                HEX_LEN
            )));
        }

        if self.descriptor_root.as_os_str().is_empty() {
            return Err(LookupError::Config("descriptor_root must not be empty".into()));
        }

        if self.connection_string.trim().is_empty() {
            return Err(LookupError::Config("connection_string must not be empty".into()));
        }

        if self.coalesce_timeout_ms == 0 {
            return Err(LookupError::Config("coalesce_timeout_ms must be positive".into()));
        }

        self.namespace()?;
        Ok(())
    }

    pub fn coalesce_timeout(&self) -> Duration {
        Duration::from_millis(self.coalesce_timeout_ms)
    }

    /// Split `record_namespace` into (database, collection)
    pub fn namespace(&self) -> Result<(&str, &str), LookupError> {
        match self.record_namespace.split_once('.') {
            Some((db, coll)) if !db.is_empty() && !coll.is_empty() => Ok((db, coll)),
            _ => Err(LookupError::Config(format!(
                "record_namespace must look like <database>.<collection>, got {:?}",
                self.record_namespace
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_params(&HashMap::new()).unwrap();
        assert_eq!(config.connection_string, "localhost:27017");
        assert_eq!(config.record_namespace, "seedbank.torrent");
        assert_eq!(config.descriptor_root, PathBuf::from("/var/lib/seedbank/torrents"));
        assert_eq!(config.shard_depth, 4);
        assert_eq!(config.descriptor_extension, "torrent");
        assert_eq!(config.coalesce_timeout(), Duration::from_secs(5));
        assert_eq!(config.namespace().unwrap(), ("seedbank", "torrent"));
    }

    #[test]
    fn test_params_override_defaults() {
        let config = Config::from_params(&params(&[
            ("connection_string", "mongodb://db:27018"),
            ("record_namespace", "archive.items"),
            ("descriptor_root", "/srv/torrents"),
            ("shard_depth", "2"),
            ("coalesce_timeout_ms", "250"),
            ("something_else", "ignored"),
        ]))
        .unwrap();

        assert_eq!(config.connection_string, "mongodb://db:27018");
        assert_eq!(config.namespace().unwrap(), ("archive", "items"));
        assert_eq!(config.descriptor_root, PathBuf::from("/srv/torrents"));
        assert_eq!(config.shard_depth, 2);
        assert_eq!(config.coalesce_timeout_ms, 250);
    }

    #[test]
    fn test_namespace_with_dotted_collection() {
        let config = Config {
            record_namespace: "seedbank.torrent.v2".into(),
            ..Config::default()
        };
        assert_eq!(config.namespace().unwrap(), ("seedbank", "torrent.v2"));
    }

    #[test]
    fn test_invalid_params() {
        assert!(Config::from_params(&params(&[("shard_depth", "four")])).is_err());
        assert!(Config::from_params(&params(&[("shard_depth", "0")])).is_err());
        assert!(Config::from_params(&params(&[("shard_depth", "41")])).is_err());
        assert!(Config::from_params(&params(&[("record_namespace", "seedbank")])).is_err());
        assert!(Config::from_params(&params(&[("record_namespace", ".torrent")])).is_err());
        assert!(Config::from_params(&params(&[("descriptor_root", "")])).is_err());
        assert!(Config::from_params(&params(&[("coalesce_timeout_ms", "0")])).is_err());
    }

    #[test]
    fn test_load_toml_with_partial_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("seedbank.toml");
        std::fs::write(&path, "descriptor_root = \"/tmp/torrents\"\nshard_depth = 3\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.descriptor_root, PathBuf::from("/tmp/torrents"));
        assert_eq!(config.shard_depth, 3);
        assert_eq!(config.connection_string, "localhost:27017");
    }
}
