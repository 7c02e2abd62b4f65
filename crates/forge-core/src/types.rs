//! Shared types for Forge.
//!
//! Attempts, patterns, insights and strategy statistics are the records that
//! flow between the orchestrator, memory tiers, reflection and the stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::tags::extract_tags;

// ─────────────────────────────────────────────────────────────────────────────
// Enumerations
// ─────────────────────────────────────────────────────────────────────────────

/// Task difficulty, ordered from easiest to hardest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
    Research,
}

impl Difficulty {
    pub const ALL: [Difficulty; 5] = [
        Self::Beginner,
        Self::Intermediate,
        Self::Advanced,
        Self::Expert,
        Self::Research,
    ];

    /// Numeric level (1-5)
    pub fn level(&self) -> u8 {
        match self {
            Self::Beginner => 1,
            Self::Intermediate => 2,
            Self::Advanced => 3,
            Self::Expert => 4,
            Self::Research => 5,
        }
    }

    /// Next harder tier, if any
    pub fn next(&self) -> Option<Self> {
        Self::ALL.get(self.level() as usize).copied()
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
            Self::Expert => "expert",
            Self::Research => "research",
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Difficulty {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "beginner" => Ok(Self::Beginner),
            "intermediate" => Ok(Self::Intermediate),
            "advanced" => Ok(Self::Advanced),
            "expert" => Ok(Self::Expert),
            "research" => Ok(Self::Research),
            _ => Err(format!("Invalid difficulty: {}", s)),
        }
    }
}

/// Learning strategy applied to a request.
///
/// Declaration order is the deterministic tie-break used by the selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Reuse known patterns closely
    Imitation,
    /// Try novel approaches
    Exploration,
    /// Improve the best previous solution
    Refinement,
    /// Carry knowledge over from similar domains
    Transfer,
    /// Combine several successful patterns
    Composition,
}

impl Strategy {
    pub const ALL: [Strategy; 5] = [
        Self::Imitation,
        Self::Exploration,
        Self::Refinement,
        Self::Transfer,
        Self::Composition,
    ];

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Imitation => "imitation",
            Self::Exploration => "exploration",
            Self::Refinement => "refinement",
            Self::Transfer => "transfer",
            Self::Composition => "composition",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Strategy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "imitation" => Ok(Self::Imitation),
            "exploration" => Ok(Self::Exploration),
            "refinement" => Ok(Self::Refinement),
            "transfer" => Ok(Self::Transfer),
            "composition" => Ok(Self::Composition),
            _ => Err(format!("Invalid strategy: {}", s)),
        }
    }
}

/// Where an attempt's quality score came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualitySource {
    Review,
    Generation,
    Default,
}

impl QualitySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Review => "review",
            Self::Generation => "generation",
            Self::Default => "default",
        }
    }
}

impl std::fmt::Display for QualitySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Attempts
// ─────────────────────────────────────────────────────────────────────────────

/// Summary of the artifacts a generation produced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// Artifact name -> size in bytes
    pub files: BTreeMap<String, usize>,
    /// Free-form metadata reported by the generator
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ArtifactMetadata {
    pub fn total_bytes(&self) -> usize {
        self.files.values().sum()
    }
}

/// One completed generation's outcome. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub domain: String,
    pub difficulty: Difficulty,
    pub strategy: Strategy,
    pub success: bool,
    /// Always within [0, 100]
    pub quality_score: f64,
    pub quality_source: QualitySource,
    pub reviewed: bool,
    /// Wall-clock seconds spent generating (and reviewing)
    pub elapsed_secs: f64,
    pub artifact_metadata: ArtifactMetadata,
    pub task_id: Option<String>,
    pub tags: BTreeSet<String>,
    /// Patterns handed to the generator for this attempt
    #[serde(default)]
    pub used_patterns: Vec<String>,
}

/// Input for creating an attempt
#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub description: String,
    pub domain: String,
    pub difficulty: Difficulty,
    pub strategy: Strategy,
    pub success: bool,
    pub quality_score: f64,
    pub quality_source: QualitySource,
    pub reviewed: bool,
    pub elapsed_secs: f64,
    pub artifact_metadata: ArtifactMetadata,
    pub task_id: Option<String>,
    pub extra_tags: Vec<String>,
    pub used_patterns: Vec<String>,
}

impl Attempt {
    /// Create an attempt stamped at `timestamp`.
    ///
    /// Quality is clamped into [0, 100]; tags come from the description,
    /// the domain and any extra tags.
    pub fn new(input: NewAttempt, timestamp: DateTime<Utc>) -> Self {
        let mut tags = extract_tags(&input.description);
        tags.insert(input.domain.to_lowercase());
        tags.extend(input.extra_tags.iter().map(|t| t.to_lowercase()));

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            description: input.description,
            domain: input.domain,
            difficulty: input.difficulty,
            strategy: input.strategy,
            success: input.success,
            quality_score: clamp_quality(input.quality_score),
            quality_source: input.quality_source,
            reviewed: input.reviewed,
            elapsed_secs: input.elapsed_secs.max(0.0),
            artifact_metadata: input.artifact_metadata,
            task_id: input.task_id,
            tags,
            used_patterns: input.used_patterns,
        }
    }
}

/// Clamp a quality score into [0, 100]; NaN becomes 0.
pub fn clamp_quality(q: f64) -> f64 {
    if q.is_nan() { 0.0 } else { q.clamp(0.0, 100.0) }
}

/// Clamp a rate into [0, 1]; NaN becomes 0.
pub fn clamp_rate(r: f64) -> f64 {
    if r.is_nan() { 0.0 } else { r.clamp(0.0, 1.0) }
}

// ─────────────────────────────────────────────────────────────────────────────
// Patterns
// ─────────────────────────────────────────────────────────────────────────────

/// A consolidated, reusable fragment with tracked success statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub domain: String,
    pub tags: BTreeSet<String>,
    pub code_snippet: String,
    pub tech_stack: BTreeSet<String>,
    /// Running weighted average in [0, 1]
    pub success_rate: f64,
    pub usage_count: u64,
    /// Number of outcomes folded into `success_rate`
    pub evidence_count: u64,
    pub source_attempts: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pattern {
    /// Fold `successes` out of `total` new outcomes into the running rate.
    pub fn absorb_outcomes(&mut self, successes: u64, total: u64) {
        if total == 0 {
            return;
        }
        let weight = self.evidence_count as f64;
        let rate = (self.success_rate * weight + successes as f64) / (weight + total as f64);
        self.success_rate = clamp_rate(rate);
        self.evidence_count += total;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Insights
// ─────────────────────────────────────────────────────────────────────────────

/// Reflection level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightLevel {
    Tactical,
    Strategic,
    Meta,
}

impl InsightLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tactical => "tactical",
            Self::Strategic => "strategic",
            Self::Meta => "meta",
        }
    }
}

impl std::fmt::Display for InsightLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Direction of a quality trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Declining,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Improving => "improving",
            Self::Declining => "declining",
        }
    }
}

/// A binary factor used for single-factor attribution
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Factor {
    Strategy(Strategy),
    Domain(String),
    Feature(String),
}

impl std::fmt::Display for Factor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strategy(s) => write!(f, "strategy={s}"),
            Self::Domain(d) => write!(f, "domain={d}"),
            Self::Feature(feat) => write!(f, "feature={feat}"),
        }
    }
}

/// Attribution of a quality delta to the most correlated factor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalAttribution {
    pub factor: Factor,
    /// Point-biserial correlation with quality, in [-1, 1]
    pub correlation: f64,
    pub mean_with: f64,
    pub mean_without: f64,
}

/// Expected quality had the alternative factor value been used
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Counterfactual {
    /// Human-readable alternative, e.g. "without feature=responsive"
    pub alternative: String,
    /// Always within [observed_min, observed_max]
    pub expected_quality: f64,
    pub observed_min: f64,
    pub observed_max: f64,
    pub sample_size: usize,
}

/// Direction in which the reflection confidence threshold should move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdAdjustment {
    Raise,
    Lower,
}

/// Recommendation emitted by a meta insight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRecommendation {
    pub adjustment: ThresholdAdjustment,
    pub current: f64,
    pub suggested: f64,
}

/// A confidence- and impact-scored lesson produced by reflection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub id: String,
    pub level: InsightLevel,
    pub statement: String,
    /// In [0, 1]
    pub confidence: f64,
    /// In [0, 1]
    pub impact: f64,
    pub evidence_refs: BTreeSet<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub trend: Option<Trend>,
    pub delta: Option<f64>,
    pub domain: Option<String>,
    pub attribution: Option<CausalAttribution>,
    pub counterfactual: Option<Counterfactual>,
    pub recommendation: Option<ThresholdRecommendation>,
    pub created_at: DateTime<Utc>,
}

impl Insight {
    pub fn new(level: InsightLevel, statement: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            level,
            statement: statement.into(),
            confidence: 0.0,
            impact: 0.0,
            evidence_refs: BTreeSet::new(),
            tags: BTreeSet::new(),
            trend: None,
            delta: None,
            domain: None,
            attribution: None,
            counterfactual: None,
            recommendation: None,
            created_at,
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Strategy statistics
// ─────────────────────────────────────────────────────────────────────────────

/// Running statistics for one (strategy, domain) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyStat {
    pub strategy: Strategy,
    pub domain: String,
    pub usage_count: u64,
    /// In [0, 1]
    pub success_rate: f64,
    /// In [0, 100]
    pub avg_quality: f64,
    /// Quality points per second of generation time
    pub avg_quality_per_time: f64,
    /// Mean seconds per attempt
    pub avg_elapsed_secs: f64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl StrategyStat {
    pub fn empty(strategy: Strategy, domain: impl Into<String>) -> Self {
        Self {
            strategy,
            domain: domain.into(),
            usage_count: 0,
            success_rate: 0.0,
            avg_quality: 0.0,
            avg_quality_per_time: 0.0,
            avg_elapsed_secs: 0.0,
            updated_at: None,
        }
    }

    /// Storage key for this row
    pub fn key(&self) -> String {
        stat_key(self.strategy, &self.domain)
    }
}

/// Storage key for a (strategy, domain) row
pub fn stat_key(strategy: Strategy, domain: &str) -> String {
    format!("{}:{}", strategy.as_str(), domain)
}
