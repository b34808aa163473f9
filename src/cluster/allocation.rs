//! Shard allocation.
//!
//! Places unassigned shard copies on nodes and moves them through
//! `Unassigned -> Initializing -> Started`. A primary goes to the node at
//! `shard_id % nodes`; the remaining copies of the shard take the following
//! nodes in order, never two copies on one node. Replicas are only placed once
//! their primary has started.
//!
//! [`AllocationService`] stands in for shard recovery: it watches installed
//! states and, after a delay, submits a task that starts every initializing
//! copy.

use crate::cluster::task_queue::{ClusterStateTaskQueue, Priority};
use crate::core::error::StreamResult;
use crate::metadata::routing::{IndexRoutingTable, RoutingTable, ShardState};
use crate::metadata::state::ClusterState;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::sync::watch;

/// Assign unassigned copies of one index to nodes.
pub fn assign_shards(routing: &IndexRoutingTable, nodes: &[String]) -> IndexRoutingTable {
    let mut routing = routing.clone();
    if nodes.is_empty() {
        return routing;
    }

    for shard_id in routing.shard_ids() {
        let mut holders: BTreeSet<String> = routing
            .shards
            .iter()
            .filter(|s| s.shard_id == shard_id)
            .filter_map(|s| s.node.clone())
            .collect();
        let primary_started = routing
            .shards
            .iter()
            .any(|s| s.shard_id == shard_id && s.primary && s.active());

        for copy in routing.shards.iter_mut().filter(|s| s.shard_id == shard_id) {
            if copy.state != ShardState::Unassigned || (!copy.primary && !primary_started) {
                continue;
            }
            let start = shard_id as usize % nodes.len();
            let target = (0..nodes.len())
                .map(|offset| &nodes[(start + offset) % nodes.len()])
                .find(|node| !holders.contains(*node));
            if let Some(node) = target {
                holders.insert(node.clone());
                copy.node = Some(node.clone());
                copy.state = ShardState::Initializing;
            }
        }
    }
    routing
}

/// Assign unassigned copies across every index.
pub fn reroute(state: &ClusterState) -> ClusterState {
    let routing_table = RoutingTable {
        indices: state
            .routing_table()
            .indices
            .iter()
            .map(|(name, routing)| (name.clone(), assign_shards(routing, state.nodes())))
            .collect(),
    };
    state.builder().routing_table(routing_table).build()
}

/// Mark every initializing copy as started, then place replicas that can
/// now follow their primaries.
pub fn start_initializing_shards(state: &ClusterState) -> ClusterState {
    let mut routing_table = state.routing_table().clone();
    for routing in routing_table.indices.values_mut() {
        for copy in routing
            .shards
            .iter_mut()
            .filter(|s| s.state == ShardState::Initializing)
        {
            copy.state = ShardState::Started;
        }
    }
    reroute(&state.builder().routing_table(routing_table).build())
}

/// Background loop that starts initializing shards.
#[derive(Debug, Clone)]
pub struct AllocationService {
    queue: ClusterStateTaskQueue,
    start_delay: Duration,
}

impl AllocationService {
    pub fn new(queue: ClusterStateTaskQueue, start_delay: Duration) -> Self {
        Self { queue, start_delay }
    }

    /// Run until `shutdown` flips to true or the queue closes.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> StreamResult<()> {
        let mut states = self.queue.subscribe();
        tracing::info!(
            start_delay_ms = self.start_delay.as_millis() as u64,
            "shard allocation service started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            let initializing = states.borrow_and_update().routing_table().has_initializing();

            if initializing {
                tokio::select! {
                    _ = tokio::time::sleep(self.start_delay) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        continue;
                    }
                }
                let completion = self
                    .queue
                    .submit("shard-started", Priority::Urgent, |current| {
                        Ok((start_initializing_shards(current), ()))
                    })
                    .wait()
                    .await?;
                tracing::debug!(
                    version = completion.state.version(),
                    acknowledged = completion.acknowledged,
                    "started initializing shards"
                );
                continue;
            }

            tokio::select! {
                changed = states.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!("shard allocation service stopped");
        Ok(())
    }
}
