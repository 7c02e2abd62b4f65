//! Curriculum tracking.
//!
//! A curriculum is a prerequisite graph of tasks grouped into difficulty
//! tiers. Each task carries attempt counters; mastery is derived from them
//! and never set directly.
//!
//! ```text
//! simple_button ─▶ basic_form ─▶ todo_list ─▶ data_table ─▶ chart_dashboard
//!                                                               │
//!        ai_code_assistant ◀── game_engine ◀── real_time_chat ◀─┘
//! ```

mod builtin;
mod graph;
mod tracker;

pub use builtin::builtin_tasks;
pub use graph::validate_graph;
pub use tracker::{CurriculumAnalytics, CurriculumTracker, DEFAULT_TIER_ADVANCE_RATIO, DomainPerformance};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{Collection, Record};
use crate::types::{Difficulty, clamp_quality};

/// Static description of a curriculum task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub domain: String,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default = "default_estimated_minutes")]
    pub estimated_minutes: u32,
}

fn default_estimated_minutes() -> u32 {
    15
}

impl TaskDefinition {
    pub fn new(id: impl Into<String>, domain: impl Into<String>, difficulty: Difficulty) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            domain: domain.into(),
            difficulty,
            prerequisites: Vec::new(),
            estimated_minutes: default_estimated_minutes(),
        }
    }

    pub fn with_prerequisites(mut self, prerequisites: &[&str]) -> Self {
        self.prerequisites = prerequisites.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_estimated_minutes(mut self, minutes: u32) -> Self {
        self.estimated_minutes = minutes;
        self
    }
}

/// Thresholds a task must cross to count as mastered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MasteryCriteria {
    pub min_attempts: u64,
    pub min_success_rate: f64,
    /// Average quality must be strictly greater than this
    pub min_avg_quality: f64,
}

impl Default for MasteryCriteria {
    fn default() -> Self {
        Self {
            min_attempts: 3,
            min_success_rate: 0.8,
            min_avg_quality: 75.0,
        }
    }
}

impl MasteryCriteria {
    /// The mastery formula. The only place mastery is decided.
    pub fn is_mastered(&self, attempts: u64, successes: u64, avg_quality: f64) -> bool {
        attempts >= self.min_attempts
            && attempts > 0
            && (successes as f64 / attempts as f64) >= self.min_success_rate
            && avg_quality > self.min_avg_quality
    }
}

/// A task definition plus its attempt counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurriculumTask {
    #[serde(flatten)]
    pub definition: TaskDefinition,
    attempts: u64,
    successes: u64,
    avg_quality: f64,
    mastered: bool,
    first_attempt_at: Option<DateTime<Utc>>,
    last_attempt_at: Option<DateTime<Utc>>,
}

impl CurriculumTask {
    pub(crate) fn new(definition: TaskDefinition) -> Self {
        Self {
            definition,
            attempts: 0,
            successes: 0,
            avg_quality: 0.0,
            mastered: false,
            first_attempt_at: None,
            last_attempt_at: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.definition.id
    }

    pub fn difficulty(&self) -> Difficulty {
        self.definition.difficulty
    }

    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub fn successes(&self) -> u64 {
        self.successes
    }

    pub fn avg_quality(&self) -> f64 {
        self.avg_quality
    }

    pub fn mastered(&self) -> bool {
        self.mastered
    }

    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.successes as f64 / self.attempts as f64
        }
    }

    pub fn first_attempt_at(&self) -> Option<DateTime<Utc>> {
        self.first_attempt_at
    }

    pub fn last_attempt_at(&self) -> Option<DateTime<Utc>> {
        self.last_attempt_at
    }

    /// Fold one attempt into the counters and re-derive mastery
    pub(crate) fn record(
        &mut self,
        success: bool,
        quality: f64,
        at: DateTime<Utc>,
        criteria: &MasteryCriteria,
    ) {
        self.attempts += 1;
        if success {
            self.successes += 1;
        }
        self.avg_quality += (clamp_quality(quality) - self.avg_quality) / self.attempts as f64;
        self.first_attempt_at.get_or_insert(at);
        self.last_attempt_at = Some(at);
        self.mastered = criteria.is_mastered(self.attempts, self.successes, self.avg_quality);
    }

    /// Replace counters from a persisted snapshot and re-derive mastery
    pub(crate) fn restore(&mut self, progress: &TaskProgress, criteria: &MasteryCriteria) {
        self.attempts = progress.attempts;
        self.successes = progress.successes.min(progress.attempts);
        self.avg_quality = clamp_quality(progress.avg_quality);
        self.first_attempt_at = progress.first_attempt_at;
        self.last_attempt_at = progress.last_attempt_at;
        self.mastered = criteria.is_mastered(self.attempts, self.successes, self.avg_quality);
    }

    pub fn progress(&self) -> TaskProgress {
        TaskProgress {
            task_id: self.definition.id.clone(),
            attempts: self.attempts,
            successes: self.successes,
            avg_quality: self.avg_quality,
            mastered: self.mastered,
            first_attempt_at: self.first_attempt_at,
            last_attempt_at: self.last_attempt_at,
        }
    }
}

/// Persisted counters for one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub task_id: String,
    pub attempts: u64,
    pub successes: u64,
    pub avg_quality: f64,
    /// Informational; recomputed on restore
    pub mastered: bool,
    pub first_attempt_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl Record for TaskProgress {
    const COLLECTION: Collection = Collection::CurriculumProgress;

    fn record_id(&self) -> String {
        self.task_id.clone()
    }

    fn rank(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.successes as f64 / self.attempts as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mastery_formula_boundaries() {
        let c = MasteryCriteria::default();
        assert!(c.is_mastered(3, 3, 82.3));
        assert!(!c.is_mastered(2, 2, 99.0)); // too few attempts
        assert!(!c.is_mastered(3, 3, 75.0)); // quality must be strictly greater
        assert!(c.is_mastered(5, 4, 76.0)); // 0.8 exactly is enough
        assert!(!c.is_mastered(5, 3, 90.0));
        assert!(!c.is_mastered(0, 0, 0.0));
    }

    #[test]
    fn test_record_incremental_mean() {
        let c = MasteryCriteria::default();
        let mut task = CurriculumTask::new(TaskDefinition::new("t1", "ui", Difficulty::Beginner));
        let now = Utc::now();
        for q in [80.0, 82.0, 85.0] {
            task.record(true, q, now, &c);
        }
        assert_eq!(task.attempts(), 3);
        assert!((task.avg_quality() - 82.333_333).abs() < 1e-4);
        assert!(task.mastered());
    }

    #[test]
    fn test_restore_recomputes_mastery() {
        let c = MasteryCriteria::default();
        let mut task = CurriculumTask::new(TaskDefinition::new("t1", "ui", Difficulty::Beginner));
        let forged = TaskProgress {
            task_id: "t1".into(),
            attempts: 1,
            successes: 1,
            avg_quality: 99.0,
            mastered: true,
            first_attempt_at: None,
            last_attempt_at: None,
        };
        task.restore(&forged, &c);
        assert!(!task.mastered());
    }
}
