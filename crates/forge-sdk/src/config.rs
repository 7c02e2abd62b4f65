//! SDK Configuration
//!
//! Every threshold the orchestrator uses is tunable here; the defaults are
//! starting points, not fixed requirements. Sections may be omitted from a
//! TOML file and fall back to their defaults.

use forge_core::curriculum::{MasteryCriteria, TaskDefinition, builtin_tasks};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::ForgeResult;

/// SDK configuration options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    /// SQLite database file; in-memory store when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,

    /// Memory tier configuration
    pub memory: MemoryConfig,

    /// Reflection configuration
    pub reflection: ReflectionConfig,

    /// Curriculum configuration
    pub curriculum: CurriculumConfig,

    /// Strategy selector configuration
    pub selector: SelectorConfig,

    /// Orchestrator configuration
    pub orchestrator: OrchestratorConfig,

    /// Background job configuration
    pub jobs: JobsConfig,
}

/// Memory tier configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Short-term capacity (default: 10)
    pub short_term_capacity: usize,

    /// Mid-term capacity (default: 50)
    pub mid_term_capacity: usize,

    /// Quality above which a failed attempt is still worth keeping (default: 70)
    pub notable_quality: f64,

    /// Importance multiplier per decay interval (default: 0.95)
    pub decay_rate: f64,

    /// Length of one decay interval in seconds (default: 3600)
    pub decay_interval_secs: u64,

    /// Similar attempts needed before promotion to a pattern (default: 3)
    pub promotion_min_evidence: usize,

    /// Combined success rate a cluster needs for promotion (default: 0.7)
    pub promotion_success_rate: f64,

    /// Successful attempts a cluster needs for promotion (default: 2)
    pub promotion_min_successes: usize,

    /// Jaccard similarity for two tag sets to count as overlapping (default: 0.25)
    pub similarity_threshold: f64,

    /// Attempts retained for reflection and reporting (default: 200)
    pub history_capacity: usize,

    /// Seconds between background consolidation passes (default: 300)
    pub consolidation_interval_secs: u64,

    /// Run the background consolidation loop (default: true)
    pub auto_consolidate: bool,

    /// Base importance added on reinforcement (default: 0.1)
    pub reinforcement_boost: f64,

    /// Upper bound for base importance (default: 2.0)
    pub max_importance: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            short_term_capacity: 10,
            mid_term_capacity: 50,
            notable_quality: 70.0,
            decay_rate: 0.95,
            decay_interval_secs: 3600, // 1 hour
            promotion_min_evidence: 3,
            promotion_success_rate: 0.7,
            promotion_min_successes: 2,
            similarity_threshold: 0.25,
            history_capacity: 200,
            consolidation_interval_secs: 300, // 5 minutes
            auto_consolidate: true,
            reinforcement_boost: 0.1,
            max_importance: 2.0,
        }
    }
}

/// Reflection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflectionConfig {
    /// Attempts in the recent window (default: 10)
    pub recent_window: usize,

    /// Attempts in the earlier window (default: 20)
    pub earlier_window: usize,

    /// Insights below this confidence are discarded (default: 0.7)
    pub confidence_threshold: f64,

    /// Latest quality below this triggers a tactical insight (default: 70)
    pub tactical_threshold: f64,

    /// Minimum |delta| for a strategic trend (default: 5)
    pub noise_threshold: f64,

    /// Attempts before/after an insight used to judge it (default: 5)
    pub followup_window: usize,

    /// Evaluated insights needed for a meta insight (default: 4)
    pub meta_min_samples: usize,

    /// Minimum hit-rate change for a meta insight (default: 0.25)
    pub meta_trend_threshold: f64,

    /// Threshold change recommended by a meta insight (default: 0.05)
    pub threshold_step: f64,

    /// Apply meta recommendations to the live threshold (default: false)
    pub adaptive_threshold: bool,

    /// Lowest threshold adaptation may reach (default: 0.5)
    pub min_threshold: f64,

    /// Highest threshold adaptation may reach (default: 0.95)
    pub max_threshold: f64,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            recent_window: 10,
            earlier_window: 20,
            confidence_threshold: 0.7,
            tactical_threshold: 70.0,
            noise_threshold: 5.0,
            followup_window: 5,
            meta_min_samples: 4,
            meta_trend_threshold: 0.25,
            threshold_step: 0.05,
            adaptive_threshold: false,
            min_threshold: 0.5,
            max_threshold: 0.95,
        }
    }
}

/// Curriculum configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurriculumConfig {
    /// Mastery thresholds
    pub mastery: MasteryCriteria,

    /// Share of a tier that must be mastered before the next opens (default: 0.6)
    pub tier_advance_ratio: f64,

    /// Replacement task set; builtin curriculum when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Vec<TaskDefinition>>,
}

impl Default for CurriculumConfig {
    fn default() -> Self {
        Self {
            mastery: MasteryCriteria::default(),
            tier_advance_ratio: forge_core::curriculum::DEFAULT_TIER_ADVANCE_RATIO,
            tasks: None,
        }
    }
}

impl CurriculumConfig {
    /// Configured tasks, or the builtin curriculum
    pub fn task_definitions(&self) -> Vec<TaskDefinition> {
        self.tasks.clone().unwrap_or_else(builtin_tasks)
    }
}

/// Strategy selector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Weight of the success rate (default: 0.4)
    pub success_weight: f64,

    /// Weight of average quality / 100 (default: 0.3)
    pub quality_weight: f64,

    /// Weight of normalized quality per second (default: 0.1)
    pub efficiency_weight: f64,

    /// Weight of the UCB exploration bonus (default: 0.5)
    pub exploration_weight: f64,

    /// Assumed seconds per attempt with no history (default: 60)
    pub default_attempt_secs: f64,

    /// Upper bound for the iteration budget (default: 10)
    pub max_iterations: u32,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            success_weight: 0.4,
            quality_weight: 0.3,
            efficiency_weight: 0.1,
            exploration_weight: 0.5,
            default_attempt_secs: 60.0,
            max_iterations: 10,
        }
    }
}

/// Orchestrator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Run the review step unless a request overrides it (default: true)
    pub review_enabled: bool,

    /// Generation timeout in milliseconds (default: 120000)
    pub generation_timeout_ms: u64,

    /// Review timeout in milliseconds (default: 30000)
    pub review_timeout_ms: u64,

    /// Quality recorded when neither review nor generation scored (default: 50)
    pub unscored_quality: f64,

    /// Tags a pattern must share with a request to be offered (default: 1)
    pub pattern_min_overlap: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            review_enabled: true,
            generation_timeout_ms: 120_000,
            review_timeout_ms: 30_000,
            unscored_quality: 50.0,
            pattern_min_overlap: 1,
        }
    }
}

/// Background job configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Retries after the first failed run (default: 2)
    pub max_retries: u32,

    /// Backoff per retry in milliseconds, multiplied by the retry number (default: 50)
    pub retry_backoff_ms: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_backoff_ms: 50,
        }
    }
}

impl ForgeConfig {
    /// Create a config backed by a SQLite database
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: Some(database_path.into()),
            ..Default::default()
        }
    }

    /// Parse a TOML document
    pub fn from_toml_str(s: &str) -> ForgeResult<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> ForgeResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> ForgeResult<String> {
        toml::to_string_pretty(self).map_err(|e| anyhow::anyhow!(e).into())
    }

    /// Set memory configuration
    pub fn with_memory(mut self, memory: MemoryConfig) -> Self {
        self.memory = memory;
        self
    }

    /// Set reflection configuration
    pub fn with_reflection(mut self, reflection: ReflectionConfig) -> Self {
        self.reflection = reflection;
        self
    }

    /// Set curriculum configuration
    pub fn with_curriculum(mut self, curriculum: CurriculumConfig) -> Self {
        self.curriculum = curriculum;
        self
    }

    /// Set selector configuration
    pub fn with_selector(mut self, selector: SelectorConfig) -> Self {
        self.selector = selector;
        self
    }

    /// Set orchestrator configuration
    pub fn with_orchestrator(mut self, orchestrator: OrchestratorConfig) -> Self {
        self.orchestrator = orchestrator;
        self
    }

    /// Set job configuration
    pub fn with_jobs(mut self, jobs: JobsConfig) -> Self {
        self.jobs = jobs;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        let m = &self.memory;
        positive("memory.short_term_capacity", m.short_term_capacity as f64)?;
        positive("memory.mid_term_capacity", m.mid_term_capacity as f64)?;
        positive("memory.promotion_min_evidence", m.promotion_min_evidence as f64)?;
        positive("memory.decay_interval_secs", m.decay_interval_secs as f64)?;
        positive("memory.consolidation_interval_secs", m.consolidation_interval_secs as f64)?;
        positive("memory.history_capacity", m.history_capacity as f64)?;
        if m.decay_rate <= 0.0 || m.decay_rate > 1.0 {
            return Err(invalid("memory.decay_rate", "must be in (0, 1]"));
        }
        unit("memory.promotion_success_rate", m.promotion_success_rate)?;
        unit("memory.similarity_threshold", m.similarity_threshold)?;
        quality("memory.notable_quality", m.notable_quality)?;
        if m.max_importance <= 0.0 {
            return Err(invalid("memory.max_importance", "must be greater than 0"));
        }

        let r = &self.reflection;
        positive("reflection.recent_window", r.recent_window as f64)?;
        positive("reflection.followup_window", r.followup_window as f64)?;
        unit("reflection.confidence_threshold", r.confidence_threshold)?;
        unit("reflection.min_threshold", r.min_threshold)?;
        unit("reflection.max_threshold", r.max_threshold)?;
        if r.min_threshold > r.max_threshold {
            return Err(invalid(
                "reflection.min_threshold",
                "must not exceed reflection.max_threshold",
            ));
        }
        quality("reflection.tactical_threshold", r.tactical_threshold)?;
        if r.noise_threshold < 0.0 {
            return Err(invalid("reflection.noise_threshold", "must not be negative"));
        }

        let c = &self.curriculum;
        unit("curriculum.tier_advance_ratio", c.tier_advance_ratio)?;
        unit("curriculum.mastery.min_success_rate", c.mastery.min_success_rate)?;
        quality("curriculum.mastery.min_avg_quality", c.mastery.min_avg_quality)?;

        let s = &self.selector;
        for (field, w) in [
            ("selector.success_weight", s.success_weight),
            ("selector.quality_weight", s.quality_weight),
            ("selector.efficiency_weight", s.efficiency_weight),
            ("selector.exploration_weight", s.exploration_weight),
        ] {
            if w < 0.0 {
                return Err(invalid(field, "must not be negative"));
            }
        }
        positive("selector.default_attempt_secs", s.default_attempt_secs)?;
        positive("selector.max_iterations", s.max_iterations as f64)?;

        let o = &self.orchestrator;
        positive("orchestrator.generation_timeout_ms", o.generation_timeout_ms as f64)?;
        positive("orchestrator.review_timeout_ms", o.review_timeout_ms as f64)?;
        quality("orchestrator.unscored_quality", o.unscored_quality)?;

        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> ConfigValidationError {
    ConfigValidationError::InvalidValue {
        field: field.into(),
        message: message.into(),
    }
}

fn positive(field: &str, value: f64) -> Result<(), ConfigValidationError> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, "must be greater than 0"))
    }
}

fn unit(field: &str, value: f64) -> Result<(), ConfigValidationError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(field, "must be between 0 and 1"))
    }
}

fn quality(field: &str, value: f64) -> Result<(), ConfigValidationError> {
    if (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(field, "must be between 0 and 100"))
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
