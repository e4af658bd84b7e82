//! CLI command implementations.

pub mod actors;
pub mod run;

pub use actors::list_actors;
pub use run::{run_deployment, RunOptions};

use anyhow::{Context, Result};
use calvin_core::{Runtime, RuntimeConfig};
use std::path::Path;

/// Runtime with the standard actor library, configured from `config` if given
fn standard_runtime(config: Option<&Path>) -> Result<Runtime> {
    let config = match config {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration {:?}", path))?,
        None => RuntimeConfig::default(),
    };
    calvin_actors::standard_runtime(config).context("Failed to set up runtime")
}
