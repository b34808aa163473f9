//! Core runtime infrastructure.
//!
//! - [`config`] - Configuration parsing and validation
//! - [`runtime`] - Main runtime orchestration
//! - [`time`] - Clocks and date formatting
//! - [`error`] - Error types and status mapping

pub mod config;
pub mod error;
pub mod runtime;
pub mod time;
