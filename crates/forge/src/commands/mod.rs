//! Command implementations for the forge CLI.
//!
//! Each submodule implements the logic for a command group.

pub mod config;
pub mod curriculum;
pub mod report;
pub mod simulate;

use anyhow::{Context, Result};
use async_trait::async_trait;
use forge_sdk::{Forge, ForgeConfig, ForgeError, ForgeResult, GenerationInput, GenerationOutput, GenerationService};
use std::sync::Arc;

/// Generator for commands that only read state
struct Offline;

#[async_trait]
impl GenerationService for Offline {
    async fn generate(&self, _input: &GenerationInput) -> ForgeResult<GenerationOutput> {
        Err(ForgeError::generation("no generation service in read-only commands"))
    }
}

/// Open the persisted state without a generation service
pub(crate) fn open_read_only(config: &ForgeConfig) -> Result<Forge> {
    let mut config = config.clone();
    config.memory.auto_consolidate = false;
    Forge::builder(config)
        .generator(Arc::new(Offline))
        .build()
        .context("Failed to open forge state")
}

/// Percent with no decimals
pub(crate) fn pct(rate: f64) -> String {
    format!("{:.0}%", rate * 100.0)
}
