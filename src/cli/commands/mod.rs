//! CLI command implementations.

mod config;
mod create;
mod start;

pub use config::{run_config, ConfigArgs};
pub use create::{run_create, CreateArgs};
pub use start::{load_config, run_start_with_config, StartArgs};
