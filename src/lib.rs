//! Tributary - data stream creation over versioned cluster metadata.
//!
//! A data stream is a named, append-only resource backed by an ordered list
//! of backing indices. Creating one is a cluster state transition: a single
//! writer validates the request against the current state, derives a new
//! state with the data stream and its first backing index, and publishes it.
//! The caller is acknowledged only after the write index's shards are active.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 CreateDataStreamService                         │
//! │        submit → wait for commit → wait for active shards        │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  ClusterStateTaskQueue                          │
//! │   priority order │ one task at a time │ publish │ version + 1   │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     ClusterState                                │
//! │  indices │ data streams │ aliases │ templates │ routing table   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! ## Core
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::runtime`] - Main runtime orchestration
//! - [`core::time`] - Clocks and date formatting
//! - [`core::error`] - Error types and status mapping
//!
//! ## Metadata
//! - [`metadata::state`] - Immutable cluster state and builders
//! - [`metadata::data_stream`] - Data streams and data stream aliases
//! - [`metadata::index`] - Index metadata, settings and mappings
//! - [`metadata::template`] - Composable templates
//! - [`metadata::system`] - System data stream registry
//!
//! ## Cluster
//! - [`cluster::task_queue`] - Serialized state update queue
//! - [`cluster::publication`] - Commit step for new states
//! - [`cluster::allocation`] - Shard placement and start-up
//!
//! ## Services
//! - [`services::create_index`] - Index creation
//! - [`services::active_shards`] - Active shard waits
//! - [`services::create_data_stream`] - Data stream creation
//!
//! ## Operations
//! - [`ops::observability`] - Metrics and health
//!
//! ## CLI
//! - [`cli::commands`] - CLI command implementations
//!
//! # Key Invariants
//!
//! - Installed state versions increase by exactly one per applied task
//! - Indices, data streams and aliases share one namespace
//! - A data stream always has at least one backing index; the last one is
//!   the write index
//! - A readiness timeout never undoes a committed creation

// Core infrastructure
pub mod core;

// Cluster metadata model
pub mod metadata;

// State update coordination
pub mod cluster;

// Metadata services
pub mod services;

// Operations and observability
pub mod ops;

// CLI
pub mod cli;

// Re-exports for convenience
pub use self::core::{config, error, runtime, time};
pub use cluster::{allocation, publication, task_queue};
pub use ops::observability;
pub use services::{active_shards, create_data_stream, create_index};
