//! forge-core - Core library for Forge
//!
//! Leaf aggregates shared by the SDK and the CLI:
//!
//! - **types**: Attempt, Pattern, Insight, StrategyStat and their enums
//! - **db**: Document store (in-memory and SQLite) with tag-overlap queries
//! - **curriculum**: Prerequisite graph and mastery tracking
//! - **stats**: Per (strategy, domain) running statistics
//! - **clock**: Injectable time source
//! - **tags**: Keyword extraction and set similarity

pub mod clock;
pub mod curriculum;
pub mod db;
pub mod error;
pub mod stats;
pub mod tags;
pub mod types;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use curriculum::{CurriculumTracker, MasteryCriteria, TaskDefinition};
pub use db::{DocumentStore, InMemoryStore};
#[cfg(feature = "db")]
pub use db::SqliteStore;
pub use error::{Error, Result};
pub use stats::StrategyStatsStore;
