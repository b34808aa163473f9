//! Publication of new cluster states.
//!
//! A new state only becomes visible once the publisher reports it committed.
//! In a multi-node deployment this is the quorum acknowledgment step; the
//! in-process [`LocalPublisher`] commits every state.

use crate::metadata::state::ClusterState;

/// Result of publishing a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The state was accepted and may be installed.
    Committed,
    /// The state was not accepted; the previous state stays current.
    NotCommitted,
}

/// Publishes a new state derived from `previous`.
pub trait Publisher: Send + Sync {
    fn publish(&self, previous: &ClusterState, next: &ClusterState) -> PublishOutcome;
}

/// Single-process publisher that commits every state.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalPublisher;

impl Publisher for LocalPublisher {
    fn publish(&self, previous: &ClusterState, next: &ClusterState) -> PublishOutcome {
        tracing::trace!(
            from_version = previous.version(),
            to_version = next.version(),
            "publishing cluster state"
        );
        PublishOutcome::Committed
    }
}
