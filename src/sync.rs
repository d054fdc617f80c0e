//! Startup anti-entropy.
//!
//! A restarted node comes back with an empty store. Before it serves
//! anything it pulls every peer's local records, keeps the ones whose
//! responsible node is itself or one of its `R - 1` predecessors, and
//! installs the highest version of each with that version unchanged.

use crate::hash::Digest;
use crate::protocol::DynamoNode;
use crate::ring::RingNode;
use crate::types::{merge_latest, DynamoError};
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub peers_contacted: usize,
    pub peers_failed: usize,
    pub installed: usize,
}

impl DynamoNode {
    pub async fn sync(&self) -> Result<SyncReport, DynamoError> {
        let dependents: HashSet<&Digest> = self
            .ring()
            .dependents(self.me(), self.config().replication_factor)?
            .into_iter()
            .map(|n| &n.id)
            .collect();

        let peers: Vec<&RingNode> = self
            .ring()
            .all_nodes()
            .iter()
            .filter(|n| n.id != self.me().id)
            .collect();

        // fetched concurrently, merged in ring order
        let snapshots = join_all(peers.iter().map(|peer| self.fetch_all_from(peer))).await;

        let mut report = SyncReport::default();
        let mut merged = HashMap::new();
        for (peer, snapshot) in peers.iter().zip(snapshots) {
            match snapshot {
                Ok(records) => {
                    report.peers_contacted += 1;
                    let owned = records.into_iter().filter(|r| {
                        dependents.contains(&self.ring().responsible_node(&r.key).id)
                    });
                    merge_latest(&mut merged, owned);
                }
                Err(e) => {
                    report.peers_failed += 1;
                    warn!(addr = %peer.endpoint, error = %e, "peer skipped during sync");
                }
            }
        }

        for record in merged.into_values() {
            // never move a key backwards
            if let Some(local) = self.store().get(&record.key)? {
                if local.version >= record.version {
                    continue;
                }
            }
            self.local_write_versioned(record)?;
            report.installed += 1;
        }

        info!(
            node = %self.endpoint(),
            contacted = report.peers_contacted,
            failed = report.peers_failed,
            installed = report.installed,
            "anti-entropy sync finished"
        );
        Ok(report)
    }
}
