//! Post-response jobs.
//!
//! After a response is delivered, four named jobs run on a [`TaskTracker`]:
//!
//! ```text
//!   persist_attempt        memory.record → store.save* → reflection pass
//!   update_curriculum      tracker.record_attempt → store.save*      (task_id only)
//!   update_strategy_stats  stats.record → store.save*
//!   extract_patterns       extract_features → memory.attach_features*
//!
//!   * retried with linear backoff
//! ```
//!
//! Jobs share nothing but the aggregates. A failure in one never touches the
//! others, and nothing here can change a response already returned.

use forge_core::db::DocumentStore;
use forge_core::types::Attempt;
use forge_core::CurriculumTracker;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

use super::extraction::extract_features;
use crate::config::JobsConfig;
use crate::memory::MemoryTiers;
use crate::meta_learning::MetaLearningSelector;
use crate::reflection::ReflectionCycle;
use crate::ForgeResult;

/// Named background job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    PersistAttempt,
    UpdateCurriculum,
    UpdateStrategyStats,
    ExtractPatterns,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PersistAttempt => "persist_attempt",
            Self::UpdateCurriculum => "update_curriculum",
            Self::UpdateStrategyStats => "update_strategy_stats",
            Self::ExtractPatterns => "extract_patterns",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Aggregates the jobs write to
#[derive(Clone)]
pub struct Aggregates {
    pub memory: Arc<MemoryTiers>,
    pub reflection: Arc<ReflectionCycle>,
    pub curriculum: Arc<CurriculumTracker>,
    pub selector: Arc<MetaLearningSelector>,
    pub store: Arc<dyn DocumentStore>,
}

/// Everything a job needs about the finished request
#[derive(Debug, Clone)]
pub(crate) struct JobContext {
    pub attempt: Arc<Attempt>,
    pub artifacts: BTreeMap<String, String>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Job outcome counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobStats {
    pub dispatched: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retries: u64,
}

#[derive(Default)]
struct Counters {
    dispatched: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    retries: AtomicU64,
}

#[derive(Clone)]
pub(crate) struct Jobs {
    config: JobsConfig,
    aggregates: Aggregates,
    tracker: TaskTracker,
    /// One `wait_idle` at a time; a reopen must not race another wait
    idle: Arc<tokio::sync::Mutex<()>>,
    counters: Arc<Counters>,
}

impl Jobs {
    pub fn new(config: JobsConfig, aggregates: Aggregates) -> Self {
        Self {
            config,
            aggregates,
            tracker: TaskTracker::new(),
            idle: Arc::new(tokio::sync::Mutex::new(())),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Spawn every job that applies to the attempt
    pub fn dispatch(&self, ctx: JobContext) {
        let ctx = Arc::new(ctx);
        let mut kinds = vec![JobKind::PersistAttempt, JobKind::UpdateStrategyStats, JobKind::ExtractPatterns];
        if ctx.attempt.task_id.is_some() {
            kinds.push(JobKind::UpdateCurriculum);
        }
        for kind in kinds {
            let jobs = self.clone();
            let ctx = Arc::clone(&ctx);
            self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
            self.tracker.spawn(async move {
                let result = jobs.run(kind, &ctx).await;
                match result {
                    Ok(()) => {
                        jobs.counters.succeeded.fetch_add(1, Ordering::Relaxed);
                        debug!(job = %kind, attempt_id = %ctx.attempt.id, "job finished");
                    }
                    Err(e) => {
                        jobs.counters.failed.fetch_add(1, Ordering::Relaxed);
                        error!(job = %kind, attempt_id = %ctx.attempt.id, error = %e, "job failed");
                    }
                }
            });
        }
    }

    /// Wait until every dispatched job has finished.
    ///
    /// Concurrent callers take turns; each returns once the tracker drains.
    pub async fn wait_idle(&self) {
        let _idle = self.idle.lock().await;
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    pub fn stats(&self) -> JobStats {
        JobStats {
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
        }
    }

    async fn run(&self, kind: JobKind, ctx: &JobContext) -> ForgeResult<()> {
        let attempt = &ctx.attempt;
        let agg = &self.aggregates;
        match kind {
            JobKind::PersistAttempt => {
                agg.memory.record(Arc::clone(attempt))?;
                // Reflection reads memory, not the store: a failed write
                // must not hold it back
                let saved = self.retry(kind, &attempt.id, || Ok(agg.store.save(attempt.as_ref())?)).await;
                let reflected = agg.reflection.run_pass().await;
                match &reflected {
                    Ok(None) => debug!(attempt_id = %attempt.id, "reflection pass coalesced"),
                    Ok(Some(_)) => {}
                    Err(e) => warn!(attempt_id = %attempt.id, error = %e, "reflection pass failed"),
                }
                saved.and(reflected.map(|_| ()))
            }
            JobKind::UpdateCurriculum => {
                let Some(task_id) = attempt.task_id.as_deref() else {
                    return Ok(());
                };
                let progress = match agg.curriculum.record_attempt(task_id, attempt.success, attempt.quality_score) {
                    Ok(p) => p,
                    Err(e) if e.is_not_found() => {
                        warn!(task_id, attempt_id = %attempt.id, "attempt for unknown curriculum task dropped");
                        return Ok(());
                    }
                    Err(e) => return Err(e.into()),
                };
                self.retry(kind, &attempt.id, || Ok(agg.store.save(&progress)?)).await
            }
            JobKind::UpdateStrategyStats => {
                let stat = agg.selector.record_outcome(
                    attempt.strategy,
                    &attempt.domain,
                    attempt.success,
                    attempt.quality_score,
                    attempt.elapsed_secs,
                )?;
                self.retry(kind, &attempt.id, || Ok(agg.store.save(&stat)?)).await
            }
            JobKind::ExtractPatterns => {
                let features = extract_features(&ctx.artifacts, &ctx.metadata)?;
                self.retry(kind, &attempt.id, || agg.memory.attach_features(&attempt.id, features.clone()))
                    .await
            }
        }
    }

    /// Run an idempotent step, retrying with linear backoff
    async fn retry<F>(&self, kind: JobKind, attempt_id: &str, mut step: F) -> ForgeResult<()>
    where
        F: FnMut() -> ForgeResult<()> + Send,
    {
        let mut tries = 0;
        loop {
            match step() {
                Ok(()) => return Ok(()),
                Err(e) if tries < self.config.max_retries => {
                    tries += 1;
                    self.counters.retries.fetch_add(1, Ordering::Relaxed);
                    warn!(job = %kind, attempt_id, attempt = tries, error = %e, "job step failed, retrying");
                    let backoff = self.config.retry_backoff_ms.saturating_mul(u64::from(tries));
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
                Err(e) => {
                    if tries > 0 {
                        warn!(job = %kind, attempt_id, retries = tries, "job step retries exhausted");
                    }
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MemoryConfig, ReflectionConfig, SelectorConfig};
    use chrono::Utc;
    use forge_core::db::{Collection, Document};
    use forge_core::types::{ArtifactMetadata, Difficulty, NewAttempt, QualitySource, Strategy};
    use forge_core::{InMemoryStore, StrategyStatsStore, SystemClock};
    use std::sync::atomic::AtomicUsize;

    /// Rejects the first `failures` writes
    struct CountdownStore {
        inner: InMemoryStore,
        failures: AtomicUsize,
    }

    impl DocumentStore for CountdownStore {
        fn put(&self, c: Collection, doc: Document) -> forge_core::Result<()> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(forge_core::Error::Other("busy".into()));
            }
            self.inner.put(c, doc)
        }
        fn get(&self, c: Collection, id: &str) -> forge_core::Result<Option<serde_json::Value>> {
            self.inner.get(c, id)
        }
        fn delete(&self, c: Collection, id: &str) -> forge_core::Result<bool> {
            self.inner.delete(c, id)
        }
        fn list(&self, c: Collection) -> forge_core::Result<Vec<serde_json::Value>> {
            self.inner.list(c)
        }
        fn query_by_tags(&self, c: Collection, tags: &[String], k: usize) -> forge_core::Result<Vec<serde_json::Value>> {
            self.inner.query_by_tags(c, tags, k)
        }
        fn count(&self, c: Collection) -> forge_core::Result<usize> {
            self.inner.count(c)
        }
    }

    fn jobs(store: Arc<dyn DocumentStore>) -> Jobs {
        let clock = Arc::new(SystemClock);
        let memory = Arc::new(MemoryTiers::new(MemoryConfig::default(), clock.clone(), store.clone()));
        let aggregates = Aggregates {
            reflection: Arc::new(ReflectionCycle::new(ReflectionConfig::default(), memory.clone(), clock)),
            memory,
            curriculum: Arc::new(CurriculumTracker::builtin().unwrap()),
            selector: Arc::new(MetaLearningSelector::new(
                SelectorConfig::default(),
                Arc::new(StrategyStatsStore::new()),
            )),
            store,
        };
        Jobs::new(
            JobsConfig {
                max_retries: 2,
                retry_backoff_ms: 1,
            },
            aggregates,
        )
    }

    fn context(task_id: Option<&str>) -> JobContext {
        let attempt = Attempt::new(
            NewAttempt {
                description: "simple button".into(),
                domain: "ui_components".into(),
                difficulty: Difficulty::Beginner,
                strategy: Strategy::Imitation,
                success: true,
                quality_score: 82.0,
                quality_source: QualitySource::Review,
                reviewed: true,
                elapsed_secs: 4.0,
                artifact_metadata: ArtifactMetadata::default(),
                task_id: task_id.map(str::to_string),
                extra_tags: vec![],
                used_patterns: vec![],
            },
            Utc::now(),
        );
        JobContext {
            attempt: Arc::new(attempt),
            artifacts: [("index.html".to_string(), "<button>Go</button>".to_string())].into(),
            metadata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_all_jobs_update_aggregates() {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryStore::new());
        let jobs = jobs(store.clone());
        let ctx = context(Some("simple_button"));
        let id = ctx.attempt.id.clone();
        jobs.dispatch(ctx);
        jobs.wait_idle().await;

        assert_eq!(jobs.stats(), JobStats { dispatched: 4, succeeded: 4, failed: 0, retries: 0 });
        let agg = &jobs.aggregates;
        assert_eq!(agg.memory.stats().unwrap().short_term, 1);
        assert_eq!(agg.curriculum.task("simple_button").unwrap().attempts(), 1);
        assert_eq!(agg.selector.stats().get(Strategy::Imitation, "ui_components").unwrap().usage_count, 1);
        assert!(store.load::<Attempt>(&id).unwrap().is_some());
        assert_eq!(store.count(Collection::CurriculumProgress).unwrap(), 1);
        assert_eq!(store.count(Collection::StrategyStats).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_transient_write_failures_are_retried() {
        let store = Arc::new(CountdownStore {
            inner: InMemoryStore::new(),
            failures: AtomicUsize::new(2),
        });
        let jobs = jobs(store.clone());
        jobs.dispatch(context(None));
        jobs.wait_idle().await;

        let stats = jobs.stats();
        assert_eq!((stats.dispatched, stats.succeeded, stats.failed), (3, 3, 0));
        assert_eq!(stats.retries, 2);
        assert_eq!(store.count(Collection::Attempts).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reflection_runs_when_attempt_write_fails() {
        let store = Arc::new(CountdownStore {
            inner: InMemoryStore::new(),
            failures: AtomicUsize::new(usize::MAX),
        });
        let jobs = jobs(store.clone());
        jobs.dispatch(context(None));
        jobs.wait_idle().await;

        let agg = &jobs.aggregates;
        assert_eq!(agg.memory.stats().unwrap().history, 1);
        assert_eq!(agg.reflection.summary().unwrap().passes, 1);
        assert_eq!(store.count(Collection::Attempts).unwrap(), 0);
        assert!(jobs.stats().failed >= 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_wait_idle_callers_all_return() {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryStore::new());
        let jobs = jobs(store);
        for _ in 0..8 {
            jobs.dispatch(context(Some("simple_button")));
        }
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let jobs = jobs.clone();
                tokio::spawn(async move { jobs.wait_idle().await })
            })
            .collect();
        let all = join_all(waiters);
        tokio::time::timeout(Duration::from_secs(5), all)
            .await
            .expect("every waiter returns");
        assert_eq!(jobs.stats().dispatched, 32);
        assert_eq!(jobs.stats().succeeded, 32);
    }

    async fn join_all(handles: Vec<tokio::task::JoinHandle<()>>) {
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_unknown_task_is_dropped() {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryStore::new());
        let jobs = jobs(store.clone());
        jobs.dispatch(context(Some("no_such_task")));
        jobs.wait_idle().await;
        assert_eq!(jobs.stats().failed, 0);
        assert_eq!(store.count(Collection::CurriculumProgress).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_extraction_failure_is_isolated() {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryStore::new());
        let jobs = jobs(store);
        let mut ctx = context(None);
        ctx.artifacts.clear();
        jobs.dispatch(ctx);
        jobs.wait_idle().await;

        let stats = jobs.stats();
        assert_eq!((stats.succeeded, stats.failed), (2, 1));
        assert_eq!(jobs.aggregates.memory.stats().unwrap().history, 1);
    }
}
