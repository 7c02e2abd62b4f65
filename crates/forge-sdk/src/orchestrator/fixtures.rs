//! Deterministic generation and review services.
//!
//! Used by tests and by `forge simulate`; none of them call anything external.

use async_trait::async_trait;
use forge_core::types::Strategy;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::traits::{
    GenerationInput, GenerationOutput, GenerationService, ReviewInput, ReviewOutput, ReviewService,
};
use crate::{ForgeError, ForgeResult};

fn lock_err() -> ForgeError {
    forge_core::Error::LockPoisoned.into()
}

// ─────────────────────────────────────────────────────────────────────────────
// Generators
// ─────────────────────────────────────────────────────────────────────────────

/// Replays a fixed script of outputs, then repeats the last one
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<GenerationOutput>>,
    last: Mutex<GenerationOutput>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    inputs: Mutex<Vec<GenerationInput>>,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<GenerationOutput>) -> Self {
        let last = script.last().cloned().unwrap_or_default();
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(last),
            delay: None,
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// Always return `output`
    pub fn always(output: GenerationOutput) -> Self {
        Self::new(vec![output])
    }

    /// Always succeed with a single `index.html`
    pub fn html(content: &str, quality: Option<f64>) -> Self {
        let mut output = GenerationOutput::success([("index.html".to_string(), content.to_string())].into());
        output.quality_score = quality;
        Self::always(output)
    }

    /// Always fail with `error`
    pub fn failing(error: &str) -> Self {
        Self::always(GenerationOutput::failure(error))
    }

    /// Wait before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every input received, in order
    pub fn inputs(&self) -> Vec<GenerationInput> {
        self.inputs.lock().map(|i| i.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl GenerationService for ScriptedGenerator {
    async fn generate(&self, input: &GenerationInput) -> ForgeResult<GenerationOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().map_err(|_| lock_err())?.push(input.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().map_err(|_| lock_err())?.pop_front();
        match next {
            Some(output) => {
                *self.last.lock().map_err(|_| lock_err())? = output.clone();
                Ok(output)
            }
            None => Ok(self.last.lock().map_err(|_| lock_err())?.clone()),
        }
    }
}

/// Features the simulated generator may "implement", with their content marker
const SIMULATED_FEATURES: &[(&str, &str)] = &[
    ("responsive", "@media (max-width: 640px) { main { padding: 0 } }"),
    ("accessibility", "<button aria-label=\"submit\">Go</button>"),
    ("local_storage", "<script>localStorage.setItem('state', '{}')</script>"),
    ("interactivity", "<script>document.body.addEventListener('click', () => {})</script>"),
    ("forms", "<form><input name=\"q\"></form>"),
];

/// Seeded stand-in for a model.
///
/// Quality rises with the number of relevant patterns and with practice;
/// each simulated feature adds to it. Same seed, same sequence.
pub struct SimulatedGenerator {
    rng: Mutex<StdRng>,
    calls: AtomicUsize,
}

impl SimulatedGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            calls: AtomicUsize::new(0),
        }
    }

    fn strategy_bias(strategy: Strategy) -> f64 {
        match strategy {
            Strategy::Imitation => 4.0,
            Strategy::Refinement => 6.0,
            Strategy::Composition => 2.0,
            Strategy::Transfer => 0.0,
            Strategy::Exploration => -4.0,
        }
    }
}

#[async_trait]
impl GenerationService for SimulatedGenerator {
    async fn generate(&self, input: &GenerationInput) -> ForgeResult<GenerationOutput> {
        let practice = self.calls.fetch_add(1, Ordering::SeqCst) as f64;
        let mut rng = self.rng.lock().map_err(|_| lock_err())?;

        let mut body = format!("<!doctype html>\n<title>{}</title>\n", input.description);
        let mut features = Vec::new();
        for (feature, marker) in SIMULATED_FEATURES {
            if rng.gen_bool(0.5) {
                body.push_str(marker);
                body.push('\n');
                features.push(*feature);
            }
        }

        let quality = 45.0
            + (practice * 0.5).min(15.0)
            + 3.0 * input.relevant_patterns.len() as f64
            + 4.0 * features.len() as f64
            + Self::strategy_bias(input.strategy)
            + rng.gen_range(-8.0..8.0);
        let quality = forge_core::types::clamp_quality(quality);

        if quality < 20.0 {
            return Ok(GenerationOutput::failure("generator produced no usable artifact"));
        }

        let mut artifacts = BTreeMap::new();
        artifacts.insert("index.html".to_string(), body);
        artifacts.insert("style.css".to_string(), "main { margin: 0 auto; }".to_string());

        Ok(GenerationOutput::success(artifacts)
            .with_quality(quality)
            .with_metadata("tech_stack", json!(["HTML", "CSS"]))
            .with_metadata("features", json!(features)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reviewers
// ─────────────────────────────────────────────────────────────────────────────

/// Always returns the same verdict
pub struct FixedReviewer {
    output: ReviewOutput,
    calls: AtomicUsize,
}

impl FixedReviewer {
    /// Approves iff `score >= 70`
    pub fn new(score: f64) -> Self {
        Self::with_verdict(score, score >= 70.0, Vec::new())
    }

    pub fn with_verdict(score: f64, approved: bool, issues: Vec<String>) -> Self {
        Self {
            output: ReviewOutput {
                quality_score: score,
                approved,
                issues,
            },
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReviewService for FixedReviewer {
    async fn review(&self, _input: &ReviewInput) -> ForgeResult<ReviewOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.output.clone())
    }
}

/// Always errors
pub struct FailingReviewer {
    message: String,
}

impl FailingReviewer {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl ReviewService for FailingReviewer {
    async fn review(&self, _input: &ReviewInput) -> ForgeResult<ReviewOutput> {
        Err(ForgeError::review_unavailable(self.message.clone()))
    }
}

/// Answers after `delay`; pair with a short review timeout
pub struct SlowReviewer {
    delay: Duration,
    inner: FixedReviewer,
}

impl SlowReviewer {
    pub fn new(delay: Duration, score: f64) -> Self {
        Self {
            delay,
            inner: FixedReviewer::new(score),
        }
    }
}

#[async_trait]
impl ReviewService for SlowReviewer {
    async fn review(&self, input: &ReviewInput) -> ForgeResult<ReviewOutput> {
        tokio::time::sleep(self.delay).await;
        self.inner.review(input).await
    }
}

/// Scores with a seeded RNG around a quality taken from the artifact size
pub struct SimulatedReviewer {
    rng: Mutex<StdRng>,
}

impl SimulatedReviewer {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

#[async_trait]
impl ReviewService for SimulatedReviewer {
    async fn review(&self, input: &ReviewInput) -> ForgeResult<ReviewOutput> {
        let bytes: usize = input.artifacts.values().map(String::len).sum();
        let noise = self.rng.lock().map_err(|_| lock_err())?.gen_range(-5.0..5.0);
        let score = forge_core::types::clamp_quality(40.0 + (bytes as f64 / 12.0).min(50.0) + noise);
        let issues = if score < 70.0 {
            vec!["artifact is thin; add more of the requested features".to_string()]
        } else {
            Vec::new()
        };
        Ok(ReviewOutput {
            quality_score: score,
            approved: score >= 70.0,
            issues,
        })
    }
}
