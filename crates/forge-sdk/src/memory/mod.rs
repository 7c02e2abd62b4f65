//! Tiered Memory System
//!
//! Implements a four-tier memory architecture:
//! - Short-term: the last N attempts (FIFO)
//! - Mid-term: successful or notable attempts, ranked by decaying importance
//! - Long-term: patterns consolidated from clusters of similar attempts
//! - Reflective: insights written by the reflection cycle
//!
//! # Architecture
//!
//! Memory flows upward:
//! 1. Every attempt is recorded into short-term memory
//! 2. Attempts evicted from short-term move to mid-term if worth keeping
//! 3. Consolidation folds clusters of similar mid-term attempts into patterns
//!
//! Recall searches across all tiers by tag overlap.

mod consolidation;
mod tiers;
mod types;

pub use tiers::MemoryTiers;
pub use types::{
    ArtifactFeatures, ConsolidationResult, MemoryEntry, MemoryPayload, MemorySnapshot,
    MemoryStats, MemoryTier, Observation, RecallQuery, RecallResult, RecordOutcome, SNIPPET_CHARS, SnapshotEntry,
};
