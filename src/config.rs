use crate::ring::NodeSpec;
use crate::types::DynamoError;
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_NODE_COUNT: usize = 5;
pub const DEFAULT_REPLICATION_FACTOR: usize = 3;
pub const DEFAULT_QUORUM: usize = 2;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_MAX_MESSAGE_BYTES: u64 = 8 * 1024 * 1024;

/// Per-process settings. Everything except `listen` must be identical on
/// every node of the cluster.
#[derive(Debug, Clone, Deserialize)]
pub struct DynamoConfig {
    /// This node's endpoint; must appear in `nodes`.
    pub listen: SocketAddr,
    pub nodes: Vec<NodeSpec>,
    #[serde(default = "default_replication_factor")]
    pub replication_factor: usize,
    #[serde(default = "default_quorum")]
    pub read_quorum: usize,
    #[serde(default = "default_quorum")]
    pub write_quorum: usize,
    /// Bound on connect + request + reply for a single peer exchange.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Longest wire line accepted from a peer, newline included.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: u64,
    /// Clear the local store before anti-entropy runs at startup.
    #[serde(default = "default_wipe_on_start")]
    pub wipe_on_start: bool,
}

fn default_replication_factor() -> usize {
    DEFAULT_REPLICATION_FACTOR
}

fn default_quorum() -> usize {
    DEFAULT_QUORUM
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_max_message_bytes() -> u64 {
    DEFAULT_MAX_MESSAGE_BYTES
}

fn default_wipe_on_start() -> bool {
    true
}

impl DynamoConfig {
    pub fn new(listen: SocketAddr, nodes: Vec<NodeSpec>) -> Self {
        DynamoConfig {
            listen,
            nodes,
            replication_factor: DEFAULT_REPLICATION_FACTOR,
            read_quorum: DEFAULT_QUORUM,
            write_quorum: DEFAULT_QUORUM,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            wipe_on_start: true,
        }
    }

    /// Ring of `count` nodes on `host` at `base_port + i * stride`, with this
    /// node listening on `port`.
    pub fn sequential(
        host: IpAddr,
        base_port: u16,
        count: usize,
        stride: u16,
        port: u16,
    ) -> Result<Self, DynamoError> {
        Ok(Self::new(
            SocketAddr::new(host, port),
            NodeSpec::sequential(host, base_port, count, stride)?,
        ))
    }

    pub fn from_toml_str(input: &str) -> Result<Self, DynamoError> {
        let config: DynamoConfig =
            toml::from_str(input).map_err(|e| DynamoError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DynamoError> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)
            .map_err(|e| DynamoError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&input)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), DynamoError> {
        if self.nodes.is_empty() {
            return Err(DynamoError::Config("no ring nodes configured".to_string()));
        }
        if !self.nodes.iter().any(|n| n.endpoint == self.listen) {
            return Err(DynamoError::Config(format!(
                "listen endpoint {} is not a ring member",
                self.listen
            )));
        }
        if self.replication_factor == 0 || self.replication_factor > self.nodes.len() {
            return Err(DynamoError::Config(format!(
                "replication factor {} must be between 1 and ring size {}",
                self.replication_factor,
                self.nodes.len()
            )));
        }
        for (name, quorum) in [("read", self.read_quorum), ("write", self.write_quorum)] {
            if quorum == 0 || quorum > self.replication_factor {
                return Err(DynamoError::Config(format!(
                    "{name} quorum {quorum} must be between 1 and replication factor {}",
                    self.replication_factor
                )));
            }
        }
        if self.request_timeout_ms == 0 {
            return Err(DynamoError::Config("request timeout must be positive".to_string()));
        }
        if self.max_message_bytes == 0 {
            return Err(DynamoError::Config("message size limit must be positive".to_string()));
        }
        Ok(())
    }
}
