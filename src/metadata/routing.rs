//! Shard routing table.
//!
//! Each index has `number_of_shards` shards, and each shard has one primary
//! plus `number_of_replicas` replica copies. A copy counts as active once it
//! reaches [`ShardState::Started`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle of a single shard copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShardState {
    /// Not assigned to any node.
    Unassigned,
    /// Assigned and recovering.
    Initializing,
    /// Active and serving.
    Started,
}

/// A single shard copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardRouting {
    /// Shard number within the index.
    pub shard_id: u32,
    /// Whether this copy is the primary.
    pub primary: bool,
    /// Node holding the copy, if assigned.
    pub node: Option<String>,
    /// Current state.
    pub state: ShardState,
}

impl ShardRouting {
    /// Create an unassigned copy.
    pub fn unassigned(shard_id: u32, primary: bool) -> Self {
        Self {
            shard_id,
            primary,
            node: None,
            state: ShardState::Unassigned,
        }
    }

    /// Check if the copy is active.
    pub fn active(&self) -> bool {
        self.state == ShardState::Started
    }
}

/// Routing for all shards of one index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRoutingTable {
    /// Copies, grouped by shard id with the primary first.
    pub shards: Vec<ShardRouting>,
}

impl IndexRoutingTable {
    /// Create routing for a new index with every copy unassigned.
    pub fn new_unassigned(number_of_shards: u32, number_of_replicas: u32) -> Self {
        let mut shards = Vec::with_capacity((number_of_shards * (number_of_replicas + 1)) as usize);
        for shard_id in 0..number_of_shards {
            shards.push(ShardRouting::unassigned(shard_id, true));
            for _ in 0..number_of_replicas {
                shards.push(ShardRouting::unassigned(shard_id, false));
            }
        }
        Self { shards }
    }

    /// Distinct shard ids in this index.
    pub fn shard_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.shards.iter().map(|s| s.shard_id).collect();
        ids.dedup();
        ids
    }

    /// Number of active copies of a shard.
    pub fn active_copies(&self, shard_id: u32) -> u32 {
        self.shards
            .iter()
            .filter(|s| s.shard_id == shard_id && s.active())
            .count() as u32
    }

    /// Check whether every shard has at least `required` active copies.
    pub fn all_shards_have_active_copies(&self, required: u32) -> bool {
        self.shard_ids()
            .into_iter()
            .all(|id| self.active_copies(id) >= required)
    }

    /// Check whether any copy is initializing.
    pub fn has_initializing(&self) -> bool {
        self.shards
            .iter()
            .any(|s| s.state == ShardState::Initializing)
    }
}

/// Routing for every index in the cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingTable {
    pub indices: BTreeMap<String, IndexRoutingTable>,
}

impl RoutingTable {
    /// Routing for an index.
    pub fn index(&self, name: &str) -> Option<&IndexRoutingTable> {
        self.indices.get(name)
    }

    /// Check whether any copy in the cluster is initializing.
    pub fn has_initializing(&self) -> bool {
        self.indices.values().any(IndexRoutingTable::has_initializing)
    }

    /// Check whether any copy in the cluster is unassigned.
    pub fn has_unassigned(&self) -> bool {
        self.indices
            .values()
            .flat_map(|t| t.shards.iter())
            .any(|s| s.state == ShardState::Unassigned)
    }
}
