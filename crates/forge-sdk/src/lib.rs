//! Forge SDK - Self-Improving Generation Orchestrator
//!
//! Turns natural-language requests into generated artifacts through
//! external generation and review services, and learns from every attempt.
//!
//! # Modules
//!
//! - **orchestrator** - Request state machine, post-response jobs, fixtures
//! - **memory** - Four-tier memory (short, mid, long, reflective) with consolidation
//! - **reflection** - Tactical, strategic and meta insights over the attempt history
//! - **meta_learning** - Per-request strategy selection from strategy statistics
//! - **report** - On-demand performance report
//!
//! Leaf aggregates (curriculum, strategy stats, document store) live in
//! `forge-core` and are re-exported here.
//!
//! # Example
//!
//! ```rust,no_run
//! use forge_sdk::{Forge, ForgeConfig, GenerationRequest};
//! use forge_sdk::orchestrator::fixtures::SimulatedGenerator;
//! use std::sync::Arc;
//!
//! async fn example() -> forge_sdk::ForgeResult<()> {
//!     let forge = Forge::builder(ForgeConfig::new("forge.db"))
//!         .generator(Arc::new(SimulatedGenerator::new(7)))
//!         .build()?;
//!
//!     let response = forge.handle(GenerationRequest::new("sortable table", "data_visualization")).await;
//!     forge.wait_idle().await;
//!
//!     let report = forge.report()?;
//!     println!("{} attempts, {:.0}% recent success", report.performance.total_attempts,
//!         report.performance.recent_success_rate * 100.0);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod memory;
pub mod meta_learning;
pub mod orchestrator;
pub mod reflection;
pub mod report;
pub mod sdk;
pub mod utils;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports from forge-core
// ─────────────────────────────────────────────────────────────────────────────

/// Curriculum graph and mastery tracking
pub use forge_core::curriculum;

/// Document store
pub use forge_core::db;

/// Shared record types (Attempt, Pattern, Insight, StrategyStat, ...)
pub use forge_core::types;

pub use forge_core::{Clock, ManualClock, SystemClock};

// ─────────────────────────────────────────────────────────────────────────────
// SDK exports
// ─────────────────────────────────────────────────────────────────────────────

pub use config::{
    ConfigValidationError, CurriculumConfig, ForgeConfig, JobsConfig, MemoryConfig,
    OrchestratorConfig, ReflectionConfig, SelectorConfig,
};
pub use error::{ForgeError, ForgeResult};
pub use orchestrator::{
    GenerationInput, GenerationOutput, GenerationRequest, GenerationResponse, GenerationService,
    RequestState, ReviewInput, ReviewOutput, ReviewService,
};
pub use report::ForgeReport;
pub use sdk::{Forge, ForgeBuilder};
