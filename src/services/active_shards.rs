//! Waiting for shard copies to become active.
//!
//! After a new index is committed, its shards still have to start before it
//! can take writes. [`ActiveShardsObserver`] waits for that, bounded by a
//! timeout, without ever undoing the commit.

use crate::core::error::{StreamError, StreamResult};
use crate::metadata::index::{settings, IndexMetadata};
use crate::metadata::state::ClusterState;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// How many copies of each shard must be active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActiveShardCount {
    /// Do not wait.
    None,
    /// The primary only.
    One,
    /// The primary and every replica.
    All,
    /// An explicit number of copies.
    Count(u32),
    /// The index's `index.write.wait_for_active_shards` setting, else one.
    #[default]
    Default,
}

impl ActiveShardCount {
    /// Parse a value of the `wait_for_active_shards` setting.
    pub fn parse(value: &str) -> StreamResult<Self> {
        match value {
            "all" => Ok(Self::All),
            "0" => Ok(Self::None),
            "1" => Ok(Self::One),
            other => other.parse::<u32>().map(Self::Count).map_err(|_| {
                StreamError::invalid_request(format!(
                    "cannot parse [{other}] as an active shard count"
                ))
            }),
        }
    }

    /// Required copies per shard for `index`.
    pub fn resolve(&self, index: &IndexMetadata) -> StreamResult<u32> {
        match self {
            Self::None => Ok(0),
            Self::One => Ok(1),
            Self::All => Ok(index.total_copies_per_shard()),
            Self::Count(n) => Ok(*n),
            Self::Default => match index.settings.get(settings::WAIT_FOR_ACTIVE_SHARDS) {
                Some(raw) => match Self::parse(raw)? {
                    Self::Default => Ok(1),
                    parsed => parsed.resolve(index),
                },
                None => Ok(1),
            },
        }
    }

    /// Check whether every shard of every named index has enough active copies.
    ///
    /// A missing index, or one without routing, is never active.
    pub fn enough_shards_active(&self, state: &ClusterState, indices: &[String]) -> bool {
        indices.iter().all(|name| {
            let Some(index) = state.metadata().index(name) else {
                return false;
            };
            let required = match self.resolve(index) {
                Ok(required) => required,
                Err(err) => {
                    tracing::warn!(index = %name, error = %err, "invalid active shard count");
                    return false;
                }
            };
            if required == 0 {
                return true;
            }
            state
                .routing_table()
                .index(name)
                .is_some_and(|routing| routing.all_shards_have_active_copies(required))
        })
    }
}

/// Result of waiting for active shards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardsReadiness {
    Ready,
    TimedOut,
}

/// Boxed future returned by [`ActiveShardsObserver`].
pub type ReadinessFuture<'a> = Pin<Box<dyn Future<Output = ShardsReadiness> + Send + 'a>>;

/// Waits until indices have enough active shard copies.
pub trait ActiveShardsObserver: Send + Sync {
    /// Resolve to `Ready` once `count` is met for every index, or `TimedOut`
    /// after `timeout`. A zero timeout checks once.
    fn wait_for_active_shards(
        &self,
        indices: Vec<String>,
        count: ActiveShardCount,
        timeout: Duration,
    ) -> ReadinessFuture<'_>;
}

/// Observer driven by installed cluster states.
#[derive(Debug, Clone)]
pub struct ClusterActiveShardsObserver {
    states: watch::Receiver<Arc<ClusterState>>,
}

impl ClusterActiveShardsObserver {
    pub fn new(states: watch::Receiver<Arc<ClusterState>>) -> Self {
        Self { states }
    }
}

impl ActiveShardsObserver for ClusterActiveShardsObserver {
    fn wait_for_active_shards(
        &self,
        indices: Vec<String>,
        count: ActiveShardCount,
        timeout: Duration,
    ) -> ReadinessFuture<'_> {
        let mut states = self.states.clone();
        Box::pin(async move {
            if count == ActiveShardCount::None {
                return ShardsReadiness::Ready;
            }
            let deadline = tokio::time::Instant::now() + timeout;

            loop {
                let ready = {
                    let state = states.borrow_and_update();
                    count.enough_shards_active(&state, &indices)
                };
                if ready {
                    return ShardsReadiness::Ready;
                }
                if timeout.is_zero() {
                    return ShardsReadiness::TimedOut;
                }

                tokio::select! {
                    changed = states.changed() => {
                        if changed.is_err() {
                            return ShardsReadiness::TimedOut;
                        }
                    }
                    _ = tokio::time::sleep_until(deadline) => {
                        tracing::debug!(
                            indices = ?indices,
                            timeout_ms = timeout.as_millis() as u64,
                            "timed out waiting for active shards"
                        );
                        return ShardsReadiness::TimedOut;
                    }
                }
            }
        })
    }
}
