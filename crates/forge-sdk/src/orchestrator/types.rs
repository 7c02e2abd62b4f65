//! Request and response types for the orchestrator.

use forge_core::types::{ArtifactMetadata, Difficulty, QualitySource, Strategy};
use serde::{Deserialize, Serialize};

/// Default time budget for a request, in seconds
pub const DEFAULT_TIME_BUDGET_SECS: f64 = 300.0;

/// A natural-language generation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub description: String,
    pub domain: String,
    pub difficulty: Difficulty,
    pub time_budget_secs: f64,
    /// Curriculum task this request exercises
    pub task_id: Option<String>,
    /// Extra tags used for pattern lookup
    #[serde(default)]
    pub tags: Vec<String>,
    /// Overrides `orchestrator.review_enabled`
    pub review: Option<bool>,
}

impl GenerationRequest {
    pub fn new(description: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            domain: domain.into(),
            difficulty: Difficulty::Beginner,
            time_budget_secs: DEFAULT_TIME_BUDGET_SECS,
            task_id: None,
            tags: Vec::new(),
            review: None,
        }
    }

    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_time_budget(mut self, secs: f64) -> Self {
        self.time_budget_secs = secs;
        self
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_review(mut self, review: bool) -> Self {
        self.review = Some(review);
        self
    }
}

/// Request lifecycle
///
/// ```text
/// SELECTING → GENERATING → REVIEWING (optional) → DONE
///                 │
///                 ├──────────────────────────────▶ FAILED
///                 └──────────────────────────────▶ CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Selecting,
    Generating,
    Reviewing,
    Done,
    Failed,
    Cancelled,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Selecting => "selecting",
            Self::Generating => "generating",
            Self::Reviewing => "reviewing",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the caller gets back
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub request_id: String,
    pub state: RequestState,
    pub success: bool,
    pub artifact_metadata: ArtifactMetadata,
    /// Review score, else generation score, else none
    pub quality_score: Option<f64>,
    pub quality_source: Option<QualitySource>,
    pub strategy: Option<Strategy>,
    pub reviewed: bool,
    #[serde(default)]
    pub review_issues: Vec<String>,
    pub error: Option<String>,
    /// Set when an attempt was recorded
    pub attempt_id: Option<String>,
    /// States visited, in order
    pub trace: Vec<RequestState>,
}

impl GenerationResponse {
    pub(crate) fn new(request_id: String) -> Self {
        Self {
            request_id,
            state: RequestState::Selecting,
            success: false,
            artifact_metadata: ArtifactMetadata::default(),
            quality_score: None,
            quality_source: None,
            strategy: None,
            reviewed: false,
            review_issues: Vec::new(),
            error: None,
            attempt_id: None,
            trace: vec![RequestState::Selecting],
        }
    }

    pub(crate) fn enter(&mut self, state: RequestState) {
        self.state = state;
        self.trace.push(state);
    }
}
