//! Orchestrator
//!
//! Routes each request through strategy selection, generation and optional
//! review, returns the response, then hands the attempt to the background
//! jobs.
//!
//! ```text
//!   request ─▶ SELECTING ─▶ GENERATING ─▶ REVIEWING? ─▶ DONE ─▶ response
//!                              │                          │
//!                              ├─▶ FAILED                 └─▶ jobs (async)
//!                              └─▶ CANCELLED
//! ```
//!
//! Only a generation failure reaches the caller as an error. A review error
//! or timeout leaves the attempt unreviewed.

pub mod extraction;
pub mod fixtures;
mod jobs;
mod traits;
mod types;

pub use jobs::{Aggregates, JobKind, JobStats};
pub use traits::{
    GenerationInput, GenerationOutput, GenerationService, ReviewInput, ReviewOutput, ReviewService,
};
pub use types::{DEFAULT_TIME_BUDGET_SECS, GenerationRequest, GenerationResponse, RequestState};

use forge_core::Clock;
use forge_core::tags::extract_tags;
use forge_core::types::{ArtifactMetadata, Attempt, NewAttempt, Pattern, QualitySource, clamp_quality};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{JobsConfig, OrchestratorConfig};
use crate::ForgeError;
use jobs::{JobContext, Jobs};

pub struct Orchestrator {
    config: OrchestratorConfig,
    generator: Arc<dyn GenerationService>,
    reviewer: Option<Arc<dyn ReviewService>>,
    clock: Arc<dyn Clock>,
    aggregates: Aggregates,
    jobs: Jobs,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        jobs_config: JobsConfig,
        generator: Arc<dyn GenerationService>,
        reviewer: Option<Arc<dyn ReviewService>>,
        clock: Arc<dyn Clock>,
        aggregates: Aggregates,
    ) -> Self {
        let jobs = Jobs::new(jobs_config, aggregates.clone());
        Self {
            config,
            generator,
            reviewer,
            clock,
            aggregates,
            jobs,
        }
    }

    /// Handle a request to completion
    pub async fn handle(&self, request: GenerationRequest) -> GenerationResponse {
        self.handle_with_cancel(request, CancellationToken::new()).await
    }

    /// Handle a request; cancelling `cancel` during generation ends it as
    /// CANCELLED and records nothing.
    pub async fn handle_with_cancel(&self, request: GenerationRequest, cancel: CancellationToken) -> GenerationResponse {
        let started = Instant::now();
        let mut response = GenerationResponse::new(uuid::Uuid::new_v4().to_string());

        // SELECTING
        let selection = match self.aggregates.selector.select(
            &request.domain,
            request.difficulty,
            request.time_budget_secs,
        ) {
            Ok(s) => s,
            Err(e) => return fail(response, ForgeError::generation(format!("strategy selection failed: {e}"))),
        };
        response.strategy = Some(selection.strategy);
        let patterns = self.relevant_patterns(&request, selection.params.pattern_limit);
        info!(
            request_id = %response.request_id,
            domain = %request.domain,
            strategy = %selection.strategy,
            patterns = patterns.len(),
            "request started"
        );

        // GENERATING
        response.enter(RequestState::Generating);
        let input = GenerationInput {
            description: request.description.clone(),
            domain_hint: request.domain.clone(),
            strategy: selection.strategy,
            strategy_params: selection.params,
            relevant_patterns: patterns,
        };
        let timeout_ms = self.config.generation_timeout_ms;
        let generated = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            r = tokio::time::timeout(Duration::from_millis(timeout_ms), self.generator.generate(&input)) => Some(r),
        };
        let output = match generated {
            None => {
                response.enter(RequestState::Cancelled);
                response.error = Some(ForgeError::Cancelled.to_string());
                info!(request_id = %response.request_id, "request cancelled during generation");
                return response;
            }
            Some(Err(_)) => {
                return fail(response, ForgeError::generation(format!("generation timed out after {timeout_ms}ms")));
            }
            Some(Ok(Err(e))) => return fail(response, ForgeError::generation(e.to_string())),
            Some(Ok(Ok(out))) if !out.success => {
                let message = out.error.unwrap_or_else(|| "generation failed".to_string());
                return fail(response, ForgeError::generation(message));
            }
            Some(Ok(Ok(out))) => out,
        };

        // REVIEWING
        let generation_quality = output.quality_score.map(clamp_quality);
        let mut review = None;
        if let Some(reviewer) = self.reviewer.as_ref().filter(|_| request.review.unwrap_or(self.config.review_enabled)) {
            response.enter(RequestState::Reviewing);
            let review_input = ReviewInput {
                artifacts: output.artifacts.clone(),
                description: request.description.clone(),
            };
            let timeout_ms = self.config.review_timeout_ms;
            review = match tokio::time::timeout(Duration::from_millis(timeout_ms), reviewer.review(&review_input)).await {
                Ok(Ok(r)) => Some(r),
                Ok(Err(e)) => {
                    let err = match e {
                        e @ ForgeError::ReviewUnavailable { .. } => e,
                        other => ForgeError::review_unavailable(other.to_string()),
                    };
                    warn!(request_id = %response.request_id, error = %err, "proceeding unreviewed");
                    None
                }
                Err(_) => {
                    let err = ForgeError::review_unavailable(ForgeError::timeout(timeout_ms).to_string());
                    warn!(request_id = %response.request_id, error = %err, "proceeding unreviewed");
                    None
                }
            };
        }

        // DONE
        let (quality, source) = match (&review, generation_quality) {
            (Some(r), _) => (clamp_quality(r.quality_score), QualitySource::Review),
            (None, Some(q)) => (q, QualitySource::Generation),
            (None, None) => (clamp_quality(self.config.unscored_quality), QualitySource::Default),
        };
        let success = review.as_ref().map_or(output.success, |r| r.approved);

        let artifact_metadata = ArtifactMetadata {
            files: output.artifacts.iter().map(|(k, v)| (k.clone(), v.len())).collect(),
            extra: output.metadata.clone(),
        };
        let attempt = Arc::new(Attempt::new(
            NewAttempt {
                description: request.description.clone(),
                domain: request.domain.clone(),
                difficulty: request.difficulty,
                strategy: input.strategy,
                success,
                quality_score: quality,
                quality_source: source,
                reviewed: review.is_some(),
                elapsed_secs: started.elapsed().as_secs_f64(),
                artifact_metadata: artifact_metadata.clone(),
                task_id: request.task_id.clone(),
                extra_tags: request.tags.clone(),
                used_patterns: input.relevant_patterns.iter().map(|p| p.id.clone()).collect(),
            },
            self.clock.now(),
        ));

        response.success = true;
        response.artifact_metadata = artifact_metadata;
        response.quality_score = review.as_ref().map(|r| clamp_quality(r.quality_score)).or(generation_quality);
        response.quality_source = response.quality_score.map(|_| source);
        response.reviewed = review.is_some();
        response.review_issues = review.map(|r| r.issues).unwrap_or_default();
        response.attempt_id = Some(attempt.id.clone());
        response.enter(RequestState::Done);

        info!(
            request_id = %response.request_id,
            attempt_id = %attempt.id,
            strategy = %attempt.strategy,
            quality = attempt.quality_score,
            approved = attempt.success,
            reviewed = attempt.reviewed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request completed"
        );

        self.jobs.dispatch(JobContext {
            attempt,
            artifacts: output.artifacts,
            metadata: output.metadata,
        });
        response
    }

    /// Best stored patterns sharing tags with the request
    fn relevant_patterns(&self, request: &GenerationRequest, limit: usize) -> Vec<Pattern> {
        let mut tags: BTreeSet<String> = extract_tags(&request.description);
        tags.insert(request.domain.to_lowercase());
        tags.extend(request.tags.iter().map(|t| t.to_lowercase()));

        match self.aggregates.store.query_patterns(&tags, self.config.pattern_min_overlap) {
            Ok(mut patterns) => {
                patterns.truncate(limit);
                patterns
            }
            Err(e) => {
                warn!(error = %e, "pattern lookup failed, generating without patterns");
                Vec::new()
            }
        }
    }

    /// Wait until every background job dispatched so far has finished
    pub async fn wait_idle(&self) {
        self.jobs.wait_idle().await;
    }

    pub fn job_stats(&self) -> JobStats {
        self.jobs.stats()
    }
}

fn fail(mut response: GenerationResponse, err: ForgeError) -> GenerationResponse {
    debug_assert!(err.is_terminal());
    response.enter(RequestState::Failed);
    response.error = Some(err.to_string());
    warn!(request_id = %response.request_id, error = %err, "request failed");
    response
}
