//! Memory Type Definitions
//!
//! Defines the entries held by the memory tiers and the views they return.

use chrono::{DateTime, Utc};
use forge_core::tags::extract_tags;
use forge_core::types::{Attempt, Insight, Pattern};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Memory tier (short-term, mid-term, long-term, reflective)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryTier {
    ShortTerm,
    MidTerm,
    LongTerm,
    Reflective,
}

impl MemoryTier {
    pub const ALL: [MemoryTier; 4] = [
        Self::ShortTerm,
        Self::MidTerm,
        Self::LongTerm,
        Self::Reflective,
    ];

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ShortTerm => "short_term",
            Self::MidTerm => "mid_term",
            Self::LongTerm => "long_term",
            Self::Reflective => "reflective",
        }
    }
}

impl std::fmt::Display for MemoryTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MemoryTier {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "short_term" => Ok(Self::ShortTerm),
            "mid_term" => Ok(Self::MidTerm),
            "long_term" => Ok(Self::LongTerm),
            "reflective" => Ok(Self::Reflective),
            _ => Err(format!("Invalid memory tier: {}", s)),
        }
    }
}

/// What a memory entry holds. Attempts are shared, never copied.
#[derive(Debug, Clone, PartialEq)]
pub enum MemoryPayload {
    Attempt(Arc<Attempt>),
    Pattern(Pattern),
    Insight(Insight),
}

impl MemoryPayload {
    pub fn id(&self) -> &str {
        match self {
            Self::Attempt(a) => &a.id,
            Self::Pattern(p) => &p.id,
            Self::Insight(i) => &i.id,
        }
    }

    /// Tags the payload carries on its own (artifact features excluded)
    pub fn tags(&self) -> BTreeSet<String> {
        match self {
            Self::Attempt(a) => a.tags.clone(),
            Self::Pattern(p) => p.tags.clone(),
            Self::Insight(i) => {
                let mut tags = extract_tags(&i.statement);
                tags.extend(i.tags.iter().cloned());
                if let Some(domain) = &i.domain {
                    tags.insert(domain.to_lowercase());
                }
                tags
            }
        }
    }

    pub fn as_attempt(&self) -> Option<&Arc<Attempt>> {
        match self {
            Self::Attempt(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_pattern(&self) -> Option<&Pattern> {
        match self {
            Self::Pattern(p) => Some(p),
            _ => None,
        }
    }
}

/// One entry in a memory tier
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryEntry {
    pub tier: MemoryTier,
    pub payload: MemoryPayload,
    /// Value decay is computed from
    pub base_importance: f64,
    /// Decayed importance as of the last consolidation
    pub importance: f64,
    pub created_at: DateTime<Utc>,
    pub last_reinforced_at: DateTime<Utc>,
}

impl MemoryEntry {
    pub fn new(tier: MemoryTier, payload: MemoryPayload, importance: f64, at: DateTime<Utc>) -> Self {
        Self {
            tier,
            payload,
            base_importance: importance,
            importance,
            created_at: at,
            last_reinforced_at: at,
        }
    }

    pub fn id(&self) -> &str {
        self.payload.id()
    }
}

/// Characters of an artifact kept as a pattern snippet
pub const SNIPPET_CHARS: usize = 500;

/// Features extracted from an attempt's artifacts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactFeatures {
    pub features: BTreeSet<String>,
    pub tech_stack: BTreeSet<String>,
    pub snippet: Option<String>,
}

/// An attempt from the history together with its extracted features
#[derive(Debug, Clone)]
pub struct Observation {
    pub attempt: Arc<Attempt>,
    pub features: BTreeSet<String>,
}

/// Query for recall
#[derive(Debug, Clone, Default)]
pub struct RecallQuery {
    pub tags: BTreeSet<String>,
    /// Restrict to these tiers; all tiers when `None`
    pub tiers: Option<Vec<MemoryTier>>,
}

impl RecallQuery {
    pub fn new(tags: BTreeSet<String>) -> Self {
        Self { tags, tiers: None }
    }

    /// Query tags taken from free text
    pub fn from_text(text: &str) -> Self {
        Self::new(extract_tags(text))
    }

    pub fn with_tiers(mut self, tiers: Vec<MemoryTier>) -> Self {
        self.tiers = Some(tiers);
        self
    }
}

/// A recalled entry with its overlap score
#[derive(Debug, Clone)]
pub struct RecallResult {
    pub entry: MemoryEntry,
    /// Fraction of the query tags the entry carries
    pub score: f64,
}

/// What happened to the short tier when an attempt was recorded
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordOutcome {
    /// Attempt pushed out of short-term
    pub evicted: Option<String>,
    /// True if the evicted attempt moved to mid-term rather than vanishing
    pub promoted_to_mid: bool,
    /// Mid-term entry dropped to make room
    pub mid_evicted: Option<String>,
}

/// Result of a consolidation pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConsolidationResult {
    pub decayed: usize,
    pub created_patterns: Vec<String>,
    pub updated_patterns: Vec<String>,
    pub evicted: usize,
    pub reuse_applied: usize,
    pub persisted: usize,
    /// Records whose write failed; retried on the next pass
    pub persist_failures: Vec<String>,
    pub duration_ms: u64,
}

/// Memory statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MemoryStats {
    pub short_term: usize,
    pub mid_term: usize,
    pub long_term: usize,
    pub reflective: usize,
    pub history: usize,
    pub pending_reuse: usize,
    pub dirty: usize,
    /// Attempts still tracked as folded into a pattern
    pub consolidated: usize,
    pub consolidation_passes: u64,
    pub last_consolidation_at: Option<DateTime<Utc>>,
}

impl MemoryStats {
    pub fn count(&self, tier: MemoryTier) -> usize {
        match tier {
            MemoryTier::ShortTerm => self.short_term,
            MemoryTier::MidTerm => self.mid_term,
            MemoryTier::LongTerm => self.long_term,
            MemoryTier::Reflective => self.reflective,
        }
    }
}

/// Comparable view of every tier
#[derive(Debug, Clone, PartialEq)]
pub struct MemorySnapshot {
    pub entries: Vec<SnapshotEntry>,
    pub patterns: Vec<Pattern>,
    pub pending_reuse: usize,
    pub dirty: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEntry {
    pub tier: MemoryTier,
    pub id: String,
    pub base_importance: f64,
    pub importance: f64,
    pub last_reinforced_at: DateTime<Utc>,
}
