use std::collections::HashMap;
use std::net::SocketAddr;

/// Key that asks a replica for every record it holds locally.
pub const LOCAL_ALL: &str = "@";

/// Coordinator-side key meaning "every node in the ring". Never sent on the wire.
pub const GLOBAL_ALL: &str = "*";

pub fn is_reserved_key(key: &str) -> bool {
    key == LOCAL_ALL || key == GLOBAL_ALL
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Record {
    pub key: String,
    pub value: String,
    pub version: u64,
}

impl Record {
    pub fn new(key: impl Into<String>, value: impl Into<String>, version: u64) -> Self {
        Record {
            key: key.into(),
            value: value.into(),
            version,
        }
    }
}

/// Messages exchanged between nodes, one per connection in each direction.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    ReadReq { key: String },
    ReadAck { records: Vec<Record> },
    WriteReq { key: String, value: String },
    WriteAck,
    DeleteReq { key: String },
    DeleteAck { result: usize },
}

impl Message {
    /// Encodes the message as a single line, without the trailing newline.
    pub fn encode(&self) -> Result<String, DynamoError> {
        serde_json::to_string(self).map_err(|e| DynamoError::MalformedMessage(e.to_string()))
    }

    pub fn decode(line: &str) -> Result<Self, DynamoError> {
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed.is_empty() {
            return Err(DynamoError::MalformedMessage("empty line".to_string()));
        }
        serde_json::from_str(trimmed).map_err(|e| DynamoError::MalformedMessage(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DynamoError {
    #[error("peer {addr} unreachable: {reason}")]
    PeerUnreachable { addr: SocketAddr, reason: String },
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    #[error("quorum not met: needed {needed}, got {got}")]
    QuorumNotMet { needed: usize, got: usize },
    #[error("local store failure: {0}")]
    LocalStore(String),
    #[error("key {0:?} is reserved and cannot be written")]
    ReservedKey(String),
    #[error("node not in ring: {0}")]
    UnknownNode(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Folds `records` into `merged`, keeping the strictly higher version per key.
/// On equal versions the entry already present wins.
pub fn merge_latest(merged: &mut HashMap<String, Record>, records: impl IntoIterator<Item = Record>) {
    for record in records {
        match merged.get(&record.key) {
            Some(existing) if existing.version >= record.version => {}
            _ => {
                merged.insert(record.key.clone(), record);
            }
        }
    }
}
