use crate::config::DynamoConfig;
use crate::network::NetworkClient;
use crate::ring::{Ring, RingNode};
use crate::store::{LocalStore, MemStore};
use crate::types::{is_reserved_key, merge_latest, DynamoError, Message, Record, GLOBAL_ALL, LOCAL_ALL};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// One member of the ring: coordinates replicated operations for callers and
/// serves local operations for peers.
pub struct DynamoNode {
    config: DynamoConfig,
    ring: Ring,
    /// This node's own ring entry
    me: RingNode,
    store: Arc<dyn LocalStore>,
    client: NetworkClient,
    /// Serializes the version read-modify-write in `local_write`
    write_lock: Mutex<()>,
}

impl DynamoNode {
    pub fn new(config: DynamoConfig) -> Result<Self, DynamoError> {
        Self::with_store(config, Arc::new(MemStore::new()))
    }

    pub fn with_store(config: DynamoConfig, store: Arc<dyn LocalStore>) -> Result<Self, DynamoError> {
        config.validate()?;
        let ring = Ring::new(&config.nodes)?;
        let me = ring
            .node_by_endpoint(config.listen)
            .cloned()
            .ok_or_else(|| DynamoError::UnknownNode(config.listen.to_string()))?;
        let client = NetworkClient::new(config.request_timeout())
            .with_max_message_bytes(config.max_message_bytes);

        Ok(DynamoNode {
            config,
            ring,
            me,
            store,
            client,
            write_lock: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &DynamoConfig {
        &self.config
    }

    pub fn ring(&self) -> &Ring {
        &self.ring
    }

    pub fn me(&self) -> &RingNode {
        &self.me
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.me.endpoint
    }

    pub fn store(&self) -> &dyn LocalStore {
        self.store.as_ref()
    }

    // -----------------------------------------------------------------------
    // Local operations
    // -----------------------------------------------------------------------

    /// Exact match, or every local record for `"@"`.
    pub fn local_read(&self, key: &str) -> Result<Vec<Record>, DynamoError> {
        if key == LOCAL_ALL {
            return self.store.get_all();
        }
        Ok(self.store.get(key)?.into_iter().collect())
    }

    /// Stores `value` at one past the current local version of `key`.
    pub fn local_write(&self, key: &str, value: &str) -> Result<Record, DynamoError> {
        if is_reserved_key(key) {
            return Err(DynamoError::ReservedKey(key.to_string()));
        }
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| DynamoError::LocalStore("write lock poisoned".to_string()))?;
        let version = self.store.get(key)?.map_or(1, |r| r.version + 1);
        let record = Record::new(key, value, version);
        self.store.upsert(record.clone())?;
        debug!(key, version, "local write");
        Ok(record)
    }

    /// Installs a record with its version unchanged.
    pub fn local_write_versioned(&self, record: Record) -> Result<(), DynamoError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| DynamoError::LocalStore("write lock poisoned".to_string()))?;
        self.store.upsert(record)
    }

    /// Exact match delete, or every local record for `"@"`.
    pub fn local_delete(&self, key: &str) -> Result<usize, DynamoError> {
        if key == LOCAL_ALL {
            return self.store.delete_all();
        }
        self.store.delete_by_key(key)
    }

    /// Executes an inbound request against the local store. Returns `None`
    /// for messages that are not requests.
    pub fn handle_message(&self, message: Message) -> Result<Option<Message>, DynamoError> {
        let reply = match message {
            Message::ReadReq { key } => Message::ReadAck {
                records: self.local_read(&key)?,
            },
            Message::WriteReq { key, value } => {
                self.local_write(&key, &value)?;
                Message::WriteAck
            }
            Message::DeleteReq { key } => Message::DeleteAck {
                result: self.local_delete(&key)?,
            },
            other => {
                warn!(?other, "ignoring non-request message");
                return Ok(None);
            }
        };
        Ok(Some(reply))
    }

    // -----------------------------------------------------------------------
    // Replicated operations
    // -----------------------------------------------------------------------

    /// Reads `key` from every replica, merging by highest version.
    pub async fn replicated_read(&self, key: &str) -> Result<Vec<Record>, DynamoError> {
        let replies = self
            .fan_out(key, &Message::ReadReq { key: key.to_string() })
            .await;

        let mut merged = HashMap::new();
        let mut answered = 0;
        for (addr, reply) in replies {
            match reply {
                Message::ReadAck { records } => {
                    answered += 1;
                    merge_latest(&mut merged, records);
                }
                other => warn!(%addr, ?other, "unexpected reply to read"),
            }
        }

        check_quorum(self.config.read_quorum, answered)?;
        Ok(merged.into_values().collect())
    }

    /// Sends the write to every replica. Each replica assigns its own next
    /// version. Returns the number of replicas that acknowledged.
    pub async fn replicated_write(&self, key: &str, value: &str) -> Result<usize, DynamoError> {
        if is_reserved_key(key) {
            return Err(DynamoError::ReservedKey(key.to_string()));
        }
        let replies = self
            .fan_out(
                key,
                &Message::WriteReq {
                    key: key.to_string(),
                    value: value.to_string(),
                },
            )
            .await;

        let mut acked = 0;
        for (addr, reply) in replies {
            match reply {
                Message::WriteAck => acked += 1,
                other => warn!(%addr, ?other, "unexpected reply to write"),
            }
        }

        check_quorum(self.config.write_quorum, acked)?;
        Ok(acked)
    }

    /// Deletes `key` on every replica. Returns the largest affected-row count
    /// any replica reported.
    pub async fn replicated_delete(&self, key: &str) -> Result<usize, DynamoError> {
        let replies = self
            .fan_out(key, &Message::DeleteReq { key: key.to_string() })
            .await;

        let mut result = 0;
        let mut acked = 0;
        for (addr, reply) in replies {
            match reply {
                Message::DeleteAck { result: affected } => {
                    acked += 1;
                    result = result.max(affected);
                }
                other => warn!(%addr, ?other, "unexpected reply to delete"),
            }
        }

        check_quorum(self.config.write_quorum, acked)?;
        Ok(result)
    }

    /// Every record held by this node, fetched through its own endpoint.
    pub async fn read_all_local(&self) -> Result<Vec<Record>, DynamoError> {
        let me = self.me.clone();
        self.fetch_all_from(&me).await
    }

    /// Every record in the ring, merged by highest version. Unreachable
    /// nodes are skipped.
    pub async fn read_all_global(&self) -> Result<Vec<Record>, DynamoError> {
        let mut merged = HashMap::new();
        for node in self.ring.all_nodes() {
            match self.fetch_all_from(node).await {
                Ok(records) => merge_latest(&mut merged, records),
                Err(e) => warn!(addr = %node.endpoint, error = %e, "skipping node in global read"),
            }
        }
        Ok(merged.into_values().collect())
    }

    pub(crate) async fn fetch_all_from(&self, node: &RingNode) -> Result<Vec<Record>, DynamoError> {
        let reply = self
            .client
            .send(
                node.endpoint,
                &Message::ReadReq {
                    key: LOCAL_ALL.to_string(),
                },
            )
            .await?;
        match reply {
            Message::ReadAck { records } => Ok(records),
            other => Err(DynamoError::MalformedMessage(format!(
                "expected read_ack from {}, got {other:?}",
                node.endpoint
            ))),
        }
    }

    /// Sends `request` to each replica of `key` in ring order and collects
    /// the replies of those that answered. Failed replicas are skipped.
    async fn fan_out(&self, key: &str, request: &Message) -> Vec<(SocketAddr, Message)> {
        let replicas: Vec<SocketAddr> = self
            .ring
            .replica_set(key, self.config.replication_factor)
            .into_iter()
            .map(|n| n.endpoint)
            .collect();

        let mut replies = Vec::with_capacity(replicas.len());
        for addr in replicas {
            match self.client.send(addr, request).await {
                Ok(reply) => replies.push((addr, reply)),
                Err(e) => warn!(%addr, error = %e, "replica failed, continuing"),
            }
        }
        replies
    }

    // -----------------------------------------------------------------------
    // Host-facing surface
    // -----------------------------------------------------------------------

    /// `"*"` reads the whole ring, `"@"` this node only, anything else the
    /// key's replica set.
    pub async fn read(&self, key: &str) -> Result<Vec<Record>, DynamoError> {
        match key {
            GLOBAL_ALL => self.read_all_global().await,
            LOCAL_ALL => self.read_all_local().await,
            _ => self.replicated_read(key).await,
        }
    }

    pub async fn insert(&self, key: &str, value: &str) -> Result<(), DynamoError> {
        self.replicated_write(key, value).await.map(|_| ())
    }

    /// `"*"` clears every node, `"@"` this node only, anything else the
    /// key's replica set. Returns the largest count any node reported.
    pub async fn delete(&self, key: &str) -> Result<usize, DynamoError> {
        match key {
            GLOBAL_ALL => {
                let mut result = 0;
                for node in self.ring.all_nodes() {
                    match self.delete_all_on(node).await {
                        Ok(affected) => result = result.max(affected),
                        Err(e) => warn!(addr = %node.endpoint, error = %e, "skipping node in global delete"),
                    }
                }
                Ok(result)
            }
            LOCAL_ALL => {
                let me = self.me.clone();
                self.delete_all_on(&me).await
            }
            _ => self.replicated_delete(key).await,
        }
    }

    async fn delete_all_on(&self, node: &RingNode) -> Result<usize, DynamoError> {
        let reply = self
            .client
            .send(
                node.endpoint,
                &Message::DeleteReq {
                    key: LOCAL_ALL.to_string(),
                },
            )
            .await?;
        match reply {
            Message::DeleteAck { result } => Ok(result),
            other => Err(DynamoError::MalformedMessage(format!(
                "expected delete_ack from {}, got {other:?}",
                node.endpoint
            ))),
        }
    }
}

fn check_quorum(needed: usize, got: usize) -> Result<(), DynamoError> {
    if got < needed {
        return Err(DynamoError::QuorumNotMet { needed, got });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn node() -> DynamoNode {
        let config = DynamoConfig::sequential(IpAddr::V4(Ipv4Addr::LOCALHOST), 11108, 5, 4, 11108).unwrap();
        DynamoNode::new(config).unwrap()
    }

    #[test]
    fn test_node_creation() {
        let node = node();
        assert_eq!(node.ring().len(), 5);
        assert_eq!(node.endpoint().port(), 11108);
        assert_eq!(node.me().id, crate::hash::digest("5554"));
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = DynamoConfig::sequential(IpAddr::V4(Ipv4Addr::LOCALHOST), 11108, 5, 4, 1).unwrap();
        assert!(matches!(DynamoNode::new(config), Err(DynamoError::Config(_))));
    }

    #[test]
    fn test_version_increments_per_local_write() {
        let node = node();
        for n in 1..=4 {
            let record = node.local_write("key1", &format!("v{n}")).unwrap();
            assert_eq!(record.version, n);
        }
        let stored = node.local_read("key1").unwrap();
        assert_eq!(stored, vec![Record::new("key1", "v4", 4)]);
        assert_eq!(node.local_write("key2", "x").unwrap().version, 1);
    }

    #[test]
    fn test_local_wildcards() {
        let node = node();
        node.local_write("a", "1").unwrap();
        node.local_write("b", "2").unwrap();
        node.local_write_versioned(Record::new("c", "3", 7)).unwrap();

        assert_eq!(node.local_read(LOCAL_ALL).unwrap().len(), 3);
        assert_eq!(node.local_read("c").unwrap()[0].version, 7);
        assert!(node.local_read("missing").unwrap().is_empty());

        assert_eq!(node.local_delete("a").unwrap(), 1);
        assert_eq!(node.local_delete(LOCAL_ALL).unwrap(), 2);
        assert!(node.local_read(LOCAL_ALL).unwrap().is_empty());
    }

    #[test]
    fn test_handle_message_dispatch() {
        let node = node();
        let reply = node
            .handle_message(Message::WriteReq {
                key: "k".to_string(),
                value: "v".to_string(),
            })
            .unwrap();
        assert_eq!(reply, Some(Message::WriteAck));

        let reply = node
            .handle_message(Message::ReadReq { key: "k".to_string() })
            .unwrap();
        assert_eq!(
            reply,
            Some(Message::ReadAck {
                records: vec![Record::new("k", "v", 1)]
            })
        );

        let reply = node
            .handle_message(Message::DeleteReq { key: "k".to_string() })
            .unwrap();
        assert_eq!(reply, Some(Message::DeleteAck { result: 1 }));

        assert_eq!(node.handle_message(Message::WriteAck).unwrap(), None);
    }

    #[tokio::test]
    async fn test_reserved_keys_cannot_be_written() {
        let node = node();
        for key in [LOCAL_ALL, GLOBAL_ALL] {
            assert!(matches!(
                node.insert(key, "v").await,
                Err(DynamoError::ReservedKey(_))
            ));
            assert!(matches!(
                node.local_write(key, "v"),
                Err(DynamoError::ReservedKey(_))
            ));
            let reply = node.handle_message(Message::WriteReq {
                key: key.to_string(),
                value: "v".to_string(),
            });
            assert!(reply.is_err());
        }
        assert!(node.store().get_all().unwrap().is_empty());
    }

    #[test]
    fn test_quorum_check() {
        assert!(check_quorum(2, 3).is_ok());
        assert!(check_quorum(2, 2).is_ok());
        assert!(matches!(
            check_quorum(2, 1),
            Err(DynamoError::QuorumNotMet { needed: 2, got: 1 })
        ));
    }
}
