//! External collaborator traits.
//!
//! Generation and review are the only calls a request suspends on. Both are
//! mockable; see [`super::fixtures`] for deterministic implementations.

use async_trait::async_trait;
use forge_core::types::{Pattern, Strategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::meta_learning::StrategyParams;
use crate::ForgeResult;

/// What the generator is asked to produce
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationInput {
    pub description: String,
    pub domain_hint: String,
    pub strategy: Strategy,
    pub strategy_params: StrategyParams,
    /// Best patterns for the request's tags, at most `strategy_params.pattern_limit`
    pub relevant_patterns: Vec<Pattern>,
}

/// What the generator produced
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationOutput {
    pub success: bool,
    /// Artifact name -> content
    pub artifacts: BTreeMap<String, String>,
    pub quality_score: Option<f64>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub error: Option<String>,
}

impl GenerationOutput {
    pub fn success(artifacts: BTreeMap<String, String>) -> Self {
        Self {
            success: true,
            artifacts,
            ..Default::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_quality(mut self, quality: f64) -> Self {
        self.quality_score = Some(quality);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewInput {
    pub artifacts: BTreeMap<String, String>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewOutput {
    /// In [0, 100]
    pub quality_score: f64,
    pub approved: bool,
    #[serde(default)]
    pub issues: Vec<String>,
}

/// Produces artifacts from a description.
///
/// # Errors
///
/// An `Err` and an output with `success == false` both end the request as
/// FAILED; the message reaches the caller verbatim.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, input: &GenerationInput) -> ForgeResult<GenerationOutput>;
}

/// Scores generated artifacts.
///
/// Review is advisory: an error or timeout leaves the attempt unreviewed
/// and never fails the request.
#[async_trait]
pub trait ReviewService: Send + Sync {
    async fn review(&self, input: &ReviewInput) -> ForgeResult<ReviewOutput>;
}
