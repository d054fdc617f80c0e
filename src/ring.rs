use crate::hash::{digest, Digest};
use crate::types::DynamoError;
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};

/// Static description of a ring member. Every node in the cluster must be
/// given the same list so that placement agrees without coordination.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NodeSpec {
    pub seed: String,
    pub endpoint: SocketAddr,
}

impl NodeSpec {
    /// Ports `base_port + i * stride`; each node's seed is half its port.
    /// Fails if any port would not fit in a `u16`.
    pub fn sequential(
        host: IpAddr,
        base_port: u16,
        count: usize,
        stride: u16,
    ) -> Result<Vec<NodeSpec>, DynamoError> {
        (0..count)
            .map(|i| {
                let port = u16::try_from(i)
                    .ok()
                    .and_then(|i| i.checked_mul(stride))
                    .and_then(|offset| base_port.checked_add(offset))
                    .ok_or_else(|| {
                        DynamoError::Config(format!(
                            "node {i} of {count} overflows the port range (base {base_port}, stride {stride})"
                        ))
                    })?;
                Ok(NodeSpec {
                    seed: (port / 2).to_string(),
                    endpoint: SocketAddr::new(host, port),
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingNode {
    pub id: Digest,
    pub endpoint: SocketAddr,
}

/// Consistent-hashing ring, sorted ascending by node identity. Immutable once built.
#[derive(Debug, Clone)]
pub struct Ring {
    nodes: Vec<RingNode>,
}

impl Ring {
    pub fn new(specs: &[NodeSpec]) -> Result<Self, DynamoError> {
        if specs.is_empty() {
            return Err(DynamoError::Config("ring requires at least one node".to_string()));
        }

        let mut endpoints = HashSet::new();
        let mut nodes = Vec::with_capacity(specs.len());
        for spec in specs {
            if !endpoints.insert(spec.endpoint) {
                return Err(DynamoError::Config(format!(
                    "duplicate endpoint {}",
                    spec.endpoint
                )));
            }
            nodes.push(RingNode {
                id: digest(&spec.seed),
                endpoint: spec.endpoint,
            });
        }
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        if nodes.windows(2).any(|w| w[0].id == w[1].id) {
            return Err(DynamoError::Config("duplicate node seed".to_string()));
        }

        Ok(Ring { nodes })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn all_nodes(&self) -> &[RingNode] {
        &self.nodes
    }

    pub fn node_by_endpoint(&self, endpoint: SocketAddr) -> Option<&RingNode> {
        self.nodes.iter().find(|n| n.endpoint == endpoint)
    }

    pub fn position(&self, node: &RingNode) -> Option<usize> {
        self.nodes.iter().position(|n| n.id == node.id)
    }

    /// First node whose identity is strictly greater than the key's digest,
    /// wrapping to the first node.
    pub fn responsible_node(&self, key: &str) -> &RingNode {
        &self.nodes[self.responsible_index(key)]
    }

    /// The `count` nodes after `node`, in ring order. Wraps around and does
    /// not skip repeats when `count` reaches the ring size.
    pub fn successors(&self, node: &RingNode, count: usize) -> Result<Vec<&RingNode>, DynamoError> {
        Ok(self.walk_forward(self.index_of(node)?, count))
    }

    pub fn predecessors(&self, node: &RingNode, count: usize) -> Result<Vec<&RingNode>, DynamoError> {
        let start = self.index_of(node)?;
        let n = self.nodes.len();
        Ok((1..=count)
            .map(|step| &self.nodes[(start + n - step % n) % n])
            .collect())
    }

    /// Responsible node followed by its `replicas - 1` successors.
    pub fn replica_set(&self, key: &str, replicas: usize) -> Vec<&RingNode> {
        let start = self.responsible_index(key);
        let mut set = vec![&self.nodes[start]];
        set.extend(self.walk_forward(start, replicas.saturating_sub(1)));
        set
    }

    /// `node` plus its `replicas - 1` predecessors: the nodes whose keys
    /// `node` holds a copy of.
    pub fn dependents(&self, node: &RingNode, replicas: usize) -> Result<Vec<&RingNode>, DynamoError> {
        let mut set = self.predecessors(node, replicas.saturating_sub(1))?;
        set.insert(0, &self.nodes[self.index_of(node)?]);
        Ok(set)
    }

    fn responsible_index(&self, key: &str) -> usize {
        let hash = digest(key);
        self.nodes.partition_point(|n| n.id <= hash) % self.nodes.len()
    }

    fn walk_forward(&self, start: usize, count: usize) -> Vec<&RingNode> {
        let n = self.nodes.len();
        (1..=count).map(|step| &self.nodes[(start + step) % n]).collect()
    }

    fn index_of(&self, node: &RingNode) -> Result<usize, DynamoError> {
        self.position(node)
            .ok_or_else(|| DynamoError::UnknownNode(node.endpoint.to_string()))
    }
}
