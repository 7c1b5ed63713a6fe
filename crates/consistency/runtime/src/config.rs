//! Node configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use flowsync_adapters::Ed25519Signer;
use flowsync_crdt::{CrdtConfig, ResolutionStrategy};
use flowsync_ledger::LedgerConfig;
use flowsync_types::{Digest, NodeId};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment variable overriding [`ConsistencyConfig::node_id`].
pub const NODE_ID_ENV: &str = "FLOWSYNC_NODE_ID";

/// Configuration of one consistency core node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyConfig {
    /// Identifier stamped on records and operations
    #[serde(default = "default_node_id")]
    pub node_id: String,

    /// Deadline for each signer and content store call
    #[serde(default = "default_adapter_timeout_ms")]
    pub adapter_timeout_ms: u64,

    /// Per-subscriber event channel capacity
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Directory of the file content store; in-memory when unset
    #[serde(default)]
    pub store_dir: Option<PathBuf>,

    #[serde(default)]
    pub ledger: LedgerSection,

    #[serde(default)]
    pub crdt: CrdtSection,
}

/// `[ledger]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerSection {
    /// Hex-encoded 32-byte Ed25519 seed; a random key is generated when unset
    #[serde(default)]
    pub signing_seed: Option<String>,

    /// Hex-encoded public keys of peers whose records are accepted
    #[serde(default)]
    pub trusted_peers: Vec<String>,
}

/// `[crdt]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrdtSection {
    #[serde(default)]
    pub strategy: ResolutionStrategy,

    /// Paths whose appends are set unions
    #[serde(default)]
    pub set_paths: Vec<String>,

    /// Compact once an execution holds more operations than this
    #[serde(default)]
    pub auto_compact_threshold: Option<usize>,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            adapter_timeout_ms: default_adapter_timeout_ms(),
            event_channel_capacity: default_event_channel_capacity(),
            store_dir: None,
            ledger: LedgerSection::default(),
            crdt: CrdtSection::default(),
        }
    }
}

fn default_node_id() -> String {
    "node-1".to_string()
}

fn default_adapter_timeout_ms() -> u64 {
    5_000
}

fn default_event_channel_capacity() -> usize {
    flowsync_events::DEFAULT_CHANNEL_CAPACITY
}

impl ConsistencyConfig {
    /// Load from a TOML file, apply the environment override and validate.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml_str(&contents)?
            }
            _ => Self::default(),
        };
        config.override_node_id(std::env::var(NODE_ID_ENV).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Replace the node id with a non-blank override.
    pub fn override_node_id(&mut self, node_id: Option<String>) {
        if let Some(node_id) = node_id.filter(|n| !n.trim().is_empty()) {
            self.node_id = node_id;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_id.trim().is_empty() {
            return Err(ConfigError::Invalid("node_id must not be empty".into()));
        }
        if self.adapter_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "adapter_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event_channel_capacity must be greater than zero".into(),
            ));
        }
        if let Some(path) = self.crdt.set_paths.iter().find(|p| p.is_empty()) {
            return Err(ConfigError::Invalid(format!("invalid set path '{}'", path)));
        }
        Ok(())
    }

    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_millis(self.adapter_timeout_ms)
    }

    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            node_id: NodeId::new(self.node_id.clone()),
            adapter_timeout: self.adapter_timeout(),
        }
    }

    pub fn crdt_config(&self) -> CrdtConfig {
        CrdtConfig {
            node_id: NodeId::new(self.node_id.clone()),
            strategy: self.crdt.strategy,
            set_paths: self.crdt.set_paths.clone(),
            auto_compact_threshold: self.crdt.auto_compact_threshold,
            adapter_timeout: self.adapter_timeout(),
        }
    }

    /// Ed25519 signer from the `[ledger]` section.
    pub fn signer(&self) -> Result<Ed25519Signer, ConfigError> {
        let mut signer = match &self.ledger.signing_seed {
            Some(seed) => {
                let seed = Digest::from_hex(seed)
                    .map_err(|e| ConfigError::Invalid(format!("signing_seed: {}", e)))?;
                Ed25519Signer::from_seed(seed.0)
            }
            None => Ed25519Signer::generate(),
        };
        for peer in &self.ledger.trusted_peers {
            signer
                .trust_hex(peer)
                .map_err(|e| ConfigError::Invalid(format!("trusted peer {}: {}", peer, e)))?;
        }
        Ok(signer)
    }
}
