//! Main SDK Entry Point
//!
//! [`Forge`] wires the store, the aggregates and the orchestrator together,
//! restores persisted state, and owns the background consolidation loop.

use forge_core::curriculum::TaskProgress;
use forge_core::db::DocumentStore;
use forge_core::types::{Insight, Strategy, StrategyStat};
use forge_core::{Clock, CurriculumTracker, InMemoryStore, SqliteStore, StrategyStatsStore, SystemClock};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ConfigValidationError, ForgeConfig};
use crate::memory::{ConsolidationResult, MemoryTiers, RecallQuery, RecallResult};
use crate::meta_learning::MetaLearningSelector;
use crate::orchestrator::{
    Aggregates, GenerationRequest, GenerationResponse, GenerationService, JobStats, Orchestrator,
    ReviewService,
};
use crate::reflection::ReflectionCycle;
use crate::report::{self, ForgeReport};
use crate::{ForgeError, ForgeResult};

/// Forge SDK - Main entry point
///
/// # Example
///
/// ```rust,no_run
/// use forge_sdk::{Forge, ForgeConfig, GenerationRequest};
/// use forge_sdk::orchestrator::fixtures::{FixedReviewer, SimulatedGenerator};
/// use std::sync::Arc;
///
/// async fn example() -> forge_sdk::ForgeResult<()> {
///     let forge = Forge::builder(ForgeConfig::default())
///         .generator(Arc::new(SimulatedGenerator::new(42)))
///         .reviewer(Arc::new(FixedReviewer::new(80.0)))
///         .build()?;
///     forge.initialize();
///
///     let response = forge.handle(GenerationRequest::new("todo list app", "interactive_apps")).await;
///     println!("{} -> {:?}", response.state, response.quality_score);
///
///     forge.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct Forge {
    config: ForgeConfig,
    clock: Arc<dyn Clock>,
    aggregates: Aggregates,
    orchestrator: Orchestrator,
    shutdown_token: CancellationToken,
    consolidation_task: Mutex<Option<JoinHandle<()>>>,
}

/// Builder for [`Forge`]
pub struct ForgeBuilder {
    config: ForgeConfig,
    generator: Option<Arc<dyn GenerationService>>,
    reviewer: Option<Arc<dyn ReviewService>>,
    store: Option<Arc<dyn DocumentStore>>,
    clock: Option<Arc<dyn Clock>>,
}

impl ForgeBuilder {
    /// Generation service (required)
    pub fn generator(mut self, generator: Arc<dyn GenerationService>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Review service; requests go unreviewed without one
    pub fn reviewer(mut self, reviewer: Arc<dyn ReviewService>) -> Self {
        self.reviewer = Some(reviewer);
        self
    }

    /// Use this store instead of the one named by the config
    pub fn store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the SDK and restore persisted state
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration validation fails
    /// - No generation service was given
    /// - The curriculum graph is invalid
    /// - The database cannot be opened or read
    pub fn build(self) -> ForgeResult<Forge> {
        self.config.validate()?;
        let generator = self.generator.ok_or_else(|| {
            ForgeError::Config(ConfigValidationError::InvalidValue {
                field: "generator".into(),
                message: "a generation service is required".into(),
            })
        })?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let store: Arc<dyn DocumentStore> = match (self.store, &self.config.database_path) {
            (Some(store), _) => store,
            (None, Some(path)) => Arc::new(SqliteStore::open(path)?),
            (None, None) => Arc::new(InMemoryStore::new()),
        };

        let curriculum = &self.config.curriculum;
        let tracker = Arc::new(CurriculumTracker::new(
            curriculum.task_definitions(),
            curriculum.mastery.clone(),
            curriculum.tier_advance_ratio,
        )?);
        let memory = Arc::new(MemoryTiers::new(self.config.memory.clone(), clock.clone(), store.clone()));
        let reflection = Arc::new(ReflectionCycle::new(
            self.config.reflection.clone(),
            memory.clone(),
            clock.clone(),
        ));
        let selector = Arc::new(MetaLearningSelector::new(
            self.config.selector.clone(),
            Arc::new(StrategyStatsStore::new()),
        ));

        let aggregates = Aggregates {
            memory,
            reflection,
            curriculum: tracker,
            selector,
            store,
        };
        restore(&aggregates)?;

        let orchestrator = Orchestrator::new(
            self.config.orchestrator.clone(),
            self.config.jobs.clone(),
            generator,
            self.reviewer,
            clock.clone(),
            aggregates.clone(),
        );

        Ok(Forge {
            config: self.config,
            clock,
            aggregates,
            orchestrator,
            shutdown_token: CancellationToken::new(),
            consolidation_task: Mutex::new(None),
        })
    }
}

/// Rehydrate every aggregate from the store
fn restore(aggregates: &Aggregates) -> ForgeResult<()> {
    aggregates.memory.load()?;

    let mut tasks = 0;
    for progress in aggregates.store.load_all::<TaskProgress>()? {
        match aggregates.curriculum.restore(&progress) {
            Ok(()) => tasks += 1,
            Err(e) if e.is_not_found() => {
                warn!(task_id = %progress.task_id, "stored progress for unknown task ignored");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let stats = aggregates.store.load_all::<StrategyStat>()?;
    let rows = stats.len();
    for stat in stats {
        aggregates.selector.stats().restore(stat)?;
    }

    info!(curriculum_tasks = tasks, strategy_rows = rows, "aggregates restored");
    Ok(())
}

impl Forge {
    /// Start building an SDK instance
    pub fn builder(config: ForgeConfig) -> ForgeBuilder {
        ForgeBuilder {
            config,
            generator: None,
            reviewer: None,
            store: None,
            clock: None,
        }
    }

    /// Start background tasks.
    ///
    /// Spawns the consolidation loop when `memory.auto_consolidate` is set.
    /// Must be called from within a tokio runtime; calling it twice is a
    /// no-op.
    pub fn initialize(&self) {
        if !self.config.memory.auto_consolidate || self.shutdown_token.is_cancelled() {
            return;
        }
        let Ok(mut slot) = self.consolidation_task.lock() else {
            warn!("consolidation task slot poisoned, loop not started");
            return;
        };
        if slot.is_some() {
            return;
        }
        *slot = Some(tokio::spawn(consolidation_loop(
            self.aggregates.memory.clone(),
            Duration::from_secs(self.config.memory.consolidation_interval_secs),
            self.shutdown_token.clone(),
        )));
    }

    /// Stop background tasks after in-flight jobs finish
    pub async fn shutdown(&self) {
        self.orchestrator.wait_idle().await;
        self.shutdown_token.cancel();
        let handle = self.consolidation_task.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "consolidation task ended abnormally");
            }
        }
        info!("forge shut down");
    }

    /// Whether the consolidation loop is running
    pub fn is_initialized(&self) -> bool {
        self.consolidation_task
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    /// Handle a request to completion. Learning happens in the background.
    pub async fn handle(&self, request: GenerationRequest) -> GenerationResponse {
        self.orchestrator.handle(request).await
    }

    /// Handle a request that `cancel` may abort during generation
    pub async fn handle_with_cancel(&self, request: GenerationRequest, cancel: CancellationToken) -> GenerationResponse {
        self.orchestrator.handle_with_cancel(request, cancel).await
    }

    /// Wait for every background job dispatched so far
    pub async fn wait_idle(&self) {
        self.orchestrator.wait_idle().await;
    }

    /// Run one consolidation pass now
    pub async fn consolidate(&self) -> ForgeResult<ConsolidationResult> {
        self.aggregates.memory.consolidate().await
    }

    /// Run one reflection pass with the configured windows
    pub async fn reflect(&self) -> ForgeResult<Vec<Insight>> {
        let r = &self.config.reflection;
        self.aggregates.reflection.reflect(r.recent_window, r.earlier_window).await
    }

    /// Search memory across tiers
    pub fn recall(&self, query: &RecallQuery, top_k: usize) -> ForgeResult<Vec<RecallResult>> {
        self.aggregates.memory.recall(query, top_k)
    }

    /// Next unmastered, unlocked curriculum tasks
    pub fn recommend_next(&self, k: usize) -> ForgeResult<Vec<String>> {
        Ok(self.aggregates.curriculum.recommend_next(k)?)
    }

    /// Administrative reset of one strategy row, in memory and in the store
    pub fn reset_strategy_stats(&self, strategy: Strategy, domain: &str) -> ForgeResult<bool> {
        let key = StrategyStat::empty(strategy, domain).key();
        let removed = self.aggregates.selector.stats().reset(strategy, domain)?;
        self.aggregates.store.remove::<StrategyStat>(&key)?;
        Ok(removed)
    }

    /// Build a report over every aggregate
    pub fn report(&self) -> ForgeResult<ForgeReport> {
        let memory = &self.aggregates.memory;
        let history = memory.history(self.config.memory.history_capacity)?;
        let strategies = self.aggregates.selector.stats().all()?;

        Ok(ForgeReport {
            generated_at: self.clock.now(),
            performance: report::performance(&history),
            memory: memory.stats()?,
            curriculum: self.aggregates.curriculum.analytics()?,
            strategy_efficiency: report::strategy_efficiency(&strategies),
            strategies,
            reflection: self.aggregates.reflection.summary()?,
            top_patterns: report::top_patterns(memory.patterns()?),
            jobs: self.orchestrator.job_stats(),
        })
    }

    pub fn job_stats(&self) -> JobStats {
        self.orchestrator.job_stats()
    }

    pub fn config(&self) -> &ForgeConfig {
        &self.config
    }

    pub fn memory(&self) -> &Arc<MemoryTiers> {
        &self.aggregates.memory
    }

    pub fn reflection(&self) -> &Arc<ReflectionCycle> {
        &self.aggregates.reflection
    }

    pub fn curriculum(&self) -> &Arc<CurriculumTracker> {
        &self.aggregates.curriculum
    }

    pub fn selector(&self) -> &Arc<MetaLearningSelector> {
        &self.aggregates.selector
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.aggregates.store
    }
}

impl Drop for Forge {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}

/// Consolidate every `period` until `shutdown` fires
async fn consolidation_loop(memory: Arc<MemoryTiers>, period: Duration, shutdown: CancellationToken) {
    info!(interval_secs = period.as_secs(), "consolidation loop started");
    let mut tick = interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                debug!("running consolidation pass");
                match memory.consolidate().await {
                    Ok(result) => info!(
                        created = result.created_patterns.len(),
                        updated = result.updated_patterns.len(),
                        evicted = result.evicted,
                        duration_ms = result.duration_ms,
                        "consolidation pass completed"
                    ),
                    Err(e) => warn!(error = %e, "consolidation pass failed, retrying next interval"),
                }
            }
            _ = shutdown.cancelled() => {
                info!("shutdown signal received, stopping consolidation loop");
                break;
            }
        }
    }
}
