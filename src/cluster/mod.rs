//! Cluster state coordination.
//!
//! - [`task_queue`] - Serialized, prioritized state update queue
//! - [`publication`] - Commit step for new states
//! - [`allocation`] - Shard placement and start-up

pub mod allocation;
pub mod publication;
pub mod task_queue;

pub use allocation::AllocationService;
pub use publication::{LocalPublisher, PublishOutcome, Publisher};
pub use task_queue::{ClusterStateTaskQueue, Priority, QueueStats, TaskCompletion, TaskHandle};
