mod common;

use chrono::{TimeZone, Utc};
use common::{forge, html_output, test_config};
use forge_core::db::{Collection, Document, DocumentStore, InMemoryStore};
use forge_sdk::curriculum::TaskDefinition;
use forge_sdk::memory::MemoryTier;
use forge_sdk::orchestrator::fixtures::{FixedReviewer, ScriptedGenerator, SlowReviewer};
use forge_sdk::types::{Difficulty, InsightLevel, QualitySource};
use forge_sdk::{CurriculumConfig, Forge, ForgeConfig, GenerationRequest, ManualClock, RequestState};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn two_task_config() -> ForgeConfig {
    let mut config = test_config();
    config.curriculum = CurriculumConfig {
        tasks: Some(vec![
            TaskDefinition::new("t1", "ui", Difficulty::Beginner),
            TaskDefinition::new("t2", "ui", Difficulty::Beginner).with_prerequisites(&["t1"]),
        ]),
        ..Default::default()
    };
    config
}

// ─────────────────────────────────────────────────────────────────────────────
// Curriculum
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_three_strong_attempts_master_a_task() {
    let generator = ScriptedGenerator::new(vec![html_output(80.0), html_output(82.0), html_output(85.0)]);
    let forge = forge(two_task_config(), Arc::new(generator), None);

    for _ in 0..3 {
        let resp = forge.handle(GenerationRequest::new("login form", "ui").with_task("t1")).await;
        assert!(resp.success);
        forge.wait_idle().await;
    }

    let t1 = forge.curriculum().task("t1").unwrap();
    assert_eq!(t1.attempts(), 3);
    assert!(t1.mastered());
    let next = forge.recommend_next(1).unwrap();
    assert!(!next.contains(&"t1".to_string()));
    assert_eq!(next, vec!["t2".to_string()]);
}

#[tokio::test]
async fn test_locked_task_never_recommended() {
    let forge = forge(two_task_config(), Arc::new(ScriptedGenerator::always(html_output(90.0))), None);

    for k in 1..=4 {
        assert!(!forge.recommend_next(k).unwrap().contains(&"t2".to_string()));
    }

    // Two successes are not yet mastery
    for _ in 0..2 {
        forge.handle(GenerationRequest::new("login form", "ui").with_task("t1")).await;
        forge.wait_idle().await;
    }
    assert!(!forge.curriculum().task("t1").unwrap().mastered());
    for k in 1..=4 {
        assert!(!forge.recommend_next(k).unwrap().contains(&"t2".to_string()));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reflection
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_rising_quality_yields_improving_insight() {
    let script = (0..12).map(|i| html_output(60.0 + 25.0 * i as f64 / 11.0)).collect();
    let forge = forge(test_config(), Arc::new(ScriptedGenerator::new(script)), None);

    for _ in 0..12 {
        forge.handle(GenerationRequest::new("dashboard card", "ui")).await;
        forge.wait_idle().await;
    }

    let insights = forge.memory().insights().unwrap();
    let strategic: Vec<_> = insights.iter().filter(|i| i.level == InsightLevel::Strategic).collect();
    assert_eq!(strategic.len(), 1);
    let insight = strategic[0];
    assert!(insight.has_tag("improving"));
    let delta = insight.delta.unwrap();
    assert!(delta >= forge.config().reflection.noise_threshold);
    assert!((delta - 13.636).abs() < 0.01);
    assert!((insight.confidence - 0.9345).abs() < 0.001);
    assert_eq!(insight.domain.as_deref(), Some("ui"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Failure paths
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_generation_failure_records_nothing() {
    let forge = forge(
        two_task_config(),
        Arc::new(ScriptedGenerator::failing("timeout")),
        Some(Arc::new(FixedReviewer::new(90.0))),
    );

    let resp = forge.handle(GenerationRequest::new("anything", "ui").with_task("t1")).await;
    assert!(!resp.success);
    assert_eq!(resp.state, RequestState::Failed);
    assert_eq!(resp.error.as_deref(), Some("timeout"));

    forge.wait_idle().await;
    let stats = forge.memory().stats().unwrap();
    for tier in MemoryTier::ALL {
        assert_eq!(stats.count(tier), 0, "{tier:?} not empty");
    }
    assert_eq!(stats.history, 0);
    assert_eq!(forge.curriculum().task("t1").unwrap().attempts(), 0);
    assert!(forge.selector().stats().all().unwrap().is_empty());
    assert_eq!(forge.store().count(Collection::Attempts).unwrap(), 0);
}

#[tokio::test]
async fn test_review_timeout_keeps_request_successful() {
    let mut config = test_config();
    config.orchestrator.review_timeout_ms = 20;

    let scored = forge(
        config.clone(),
        Arc::new(ScriptedGenerator::html("<p>x</p>", Some(72.0))),
        Some(Arc::new(SlowReviewer::new(Duration::from_millis(500), 95.0))),
    );
    let resp = scored.handle(GenerationRequest::new("paragraph", "ui")).await;
    assert!(resp.success);
    assert_eq!(resp.state, RequestState::Done);
    assert!(!resp.reviewed);
    assert_eq!(resp.quality_score, Some(72.0));

    let unscored = forge(
        config,
        Arc::new(ScriptedGenerator::html("<p>x</p>", None)),
        Some(Arc::new(SlowReviewer::new(Duration::from_millis(500), 95.0))),
    );
    let resp = unscored.handle(GenerationRequest::new("paragraph", "ui")).await;
    assert!(resp.success);
    assert_eq!(resp.quality_score, None);
    unscored.wait_idle().await;
    let attempt = &unscored.memory().history(1).unwrap()[0];
    assert_eq!(attempt.quality_source, QualitySource::Default);
}

#[tokio::test]
async fn test_cancellation_records_nothing() {
    let generator = ScriptedGenerator::html("<p>x</p>", Some(90.0)).with_delay(Duration::from_millis(500));
    let forge = forge(test_config(), Arc::new(generator), None);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let resp = forge
        .handle_with_cancel(GenerationRequest::new("slow page", "ui"), cancel)
        .await;
    assert_eq!(resp.state, RequestState::Cancelled);
    assert!(!resp.success);
    assert_eq!(resp.error.as_deref(), Some("cancelled"));

    forge.wait_idle().await;
    assert_eq!(forge.job_stats().dispatched, 0);
    assert_eq!(forge.memory().stats().unwrap().history, 0);
    assert!(forge.selector().stats().all().unwrap().is_empty());
}

/// Store that reads normally and refuses every write
struct ReadOnlyStore {
    inner: InMemoryStore,
}

impl DocumentStore for ReadOnlyStore {
    fn put(&self, _collection: Collection, _doc: Document) -> forge_core::Result<()> {
        Err(forge_core::Error::Other("disk full".into()))
    }

    fn get(&self, collection: Collection, id: &str) -> forge_core::Result<Option<serde_json::Value>> {
        self.inner.get(collection, id)
    }

    fn delete(&self, collection: Collection, id: &str) -> forge_core::Result<bool> {
        self.inner.delete(collection, id)
    }

    fn list(&self, collection: Collection) -> forge_core::Result<Vec<serde_json::Value>> {
        self.inner.list(collection)
    }

    fn query_by_tags(
        &self,
        collection: Collection,
        tags: &[String],
        min_overlap: usize,
    ) -> forge_core::Result<Vec<serde_json::Value>> {
        self.inner.query_by_tags(collection, tags, min_overlap)
    }

    fn count(&self, collection: Collection) -> forge_core::Result<usize> {
        self.inner.count(collection)
    }
}

#[tokio::test]
async fn test_failing_store_leaves_other_aggregates_updated() {
    let forge = Forge::builder(two_task_config())
        .generator(Arc::new(ScriptedGenerator::always(html_output(88.0))))
        .store(Arc::new(ReadOnlyStore {
            inner: InMemoryStore::new(),
        }))
        .build()
        .unwrap();

    let resp = forge.handle(GenerationRequest::new("signup form", "ui").with_task("t1")).await;
    assert!(resp.success);
    forge.wait_idle().await;

    // In-memory state moved even though nothing was written
    assert_eq!(forge.memory().stats().unwrap().history, 1);
    assert_eq!(forge.curriculum().task("t1").unwrap().attempts(), 1);
    assert_eq!(forge.selector().stats().all().unwrap().len(), 1);
    // Reflection follows the memory record, not the store write
    assert_eq!(forge.reflection().summary().unwrap().passes, 1);

    let jobs = forge.job_stats();
    assert_eq!(jobs.dispatched, 4);
    assert_eq!(jobs.failed, 3);
    assert_eq!(jobs.succeeded, 1);
}

#[tokio::test]
async fn test_rising_quality_is_reflected_without_a_store() {
    let script = (0..12).map(|i| html_output(60.0 + 25.0 * i as f64 / 11.0)).collect();
    let forge = Forge::builder(test_config())
        .generator(Arc::new(ScriptedGenerator::new(script)))
        .store(Arc::new(ReadOnlyStore {
            inner: InMemoryStore::new(),
        }))
        .build()
        .unwrap();

    for _ in 0..12 {
        forge.handle(GenerationRequest::new("dashboard card", "ui")).await;
        forge.wait_idle().await;
    }

    assert_eq!(forge.memory().stats().unwrap().history, 12);
    assert_eq!(forge.reflection().summary().unwrap().passes, 12);
    let insights = forge.memory().insights().unwrap();
    assert!(
        insights
            .iter()
            .any(|i| i.level == InsightLevel::Strategic && i.has_tag("improving"))
    );
    // Unwritten insights wait for the next consolidation
    assert!(forge.memory().stats().unwrap().dirty >= 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Concurrency
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_requests_update_each_aggregate_once() {
    const REQUESTS: usize = 24;
    let config = two_task_config();
    let capacity = config.memory.short_term_capacity;
    let forge = Arc::new(forge(
        config,
        Arc::new(ScriptedGenerator::always(html_output(88.0))),
        Some(Arc::new(FixedReviewer::new(88.0))),
    ));

    let handles: Vec<_> = (0..REQUESTS)
        .map(|i| {
            let forge = Arc::clone(&forge);
            tokio::spawn(async move {
                forge
                    .handle(GenerationRequest::new(format!("signup form {i}"), "ui").with_task("t1"))
                    .await
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().success);
    }
    forge.wait_idle().await;

    assert_eq!(forge.curriculum().task("t1").unwrap().attempts(), REQUESTS as u64);

    // Every attempt qualifies for mid-term, so nothing is dropped
    let stats = forge.memory().stats().unwrap();
    assert!(stats.short_term <= capacity);
    assert_eq!(stats.short_term, capacity);
    assert_eq!(stats.short_term + stats.mid_term, REQUESTS);
    assert_eq!(stats.history, REQUESTS);

    let usage: u64 = forge.selector().stats().all().unwrap().iter().map(|s| s.usage_count).sum();
    assert_eq!(usage, REQUESTS as u64);

    let jobs = forge.job_stats();
    assert_eq!(jobs.dispatched, 4 * REQUESTS as u64);
    assert_eq!(jobs.succeeded, 4 * REQUESTS as u64);
    assert_eq!(forge.store().count(Collection::Attempts).unwrap(), REQUESTS);
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_short_term_fifo_boundary() {
    let mut config = test_config();
    config.memory.short_term_capacity = 3;

    // Rejected and below the notable quality: the oldest entry vanishes
    let rejected = forge(
        config.clone(),
        Arc::new(ScriptedGenerator::always(html_output(40.0))),
        Some(Arc::new(FixedReviewer::with_verdict(40.0, false, vec![]))),
    );
    let mut ids = Vec::new();
    for _ in 0..4 {
        let resp = rejected.handle(GenerationRequest::new("pricing table", "ui")).await;
        ids.push(resp.attempt_id.unwrap());
        rejected.wait_idle().await;
    }
    let short: Vec<String> = rejected
        .memory()
        .entries(MemoryTier::ShortTerm)
        .unwrap()
        .iter()
        .map(|e| e.id().to_string())
        .collect();
    assert_eq!(short, ids[1..].to_vec());
    assert!(rejected.memory().entries(MemoryTier::MidTerm).unwrap().is_empty());

    // Approved: the oldest entry moves to mid-term instead
    let approved = forge(
        config,
        Arc::new(ScriptedGenerator::always(html_output(90.0))),
        Some(Arc::new(FixedReviewer::new(90.0))),
    );
    let mut ids = Vec::new();
    for _ in 0..4 {
        let resp = approved.handle(GenerationRequest::new("pricing table", "ui")).await;
        ids.push(resp.attempt_id.unwrap());
        approved.wait_idle().await;
    }
    let mid: Vec<String> = approved
        .memory()
        .entries(MemoryTier::MidTerm)
        .unwrap()
        .iter()
        .map(|e| e.id().to_string())
        .collect();
    assert_eq!(mid, vec![ids[0].clone()]);
    assert_eq!(approved.memory().entries(MemoryTier::ShortTerm).unwrap().len(), 3);
}

#[tokio::test]
async fn test_consolidate_twice_is_idempotent() {
    let mut config = test_config();
    config.memory.short_term_capacity = 2;
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()));

    let forge = Forge::builder(config)
        .generator(Arc::new(ScriptedGenerator::always(html_output(86.0))))
        .clock(clock.clone())
        .build()
        .unwrap();
    for _ in 0..6 {
        forge.handle(GenerationRequest::new("kanban board", "ui")).await;
        forge.wait_idle().await;
        clock.advance(chrono::Duration::minutes(1));
    }
    assert_eq!(forge.memory().stats().unwrap().mid_term, 4);

    let first = forge.consolidate().await.unwrap();
    assert_eq!(first.created_patterns.len(), 1);
    let after_first = forge.memory().snapshot().unwrap();

    let second = forge.consolidate().await.unwrap();
    assert!(second.created_patterns.is_empty());
    assert!(second.updated_patterns.is_empty());
    assert_eq!(forge.memory().snapshot().unwrap(), after_first);

    let pattern = &forge.memory().patterns().unwrap()[0];
    assert_eq!(pattern.evidence_count, 4);
    assert_eq!(pattern.success_rate, 1.0);
    assert!(pattern.tags.contains("kanban"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Reporting
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_report_over_a_session() {
    let forge = forge(
        two_task_config(),
        Arc::new(ScriptedGenerator::always(html_output(80.0))),
        Some(Arc::new(FixedReviewer::new(82.0))),
    );
    for _ in 0..6 {
        forge.handle(GenerationRequest::new("contact form", "ui").with_task("t1")).await;
        forge.wait_idle().await;
    }

    let report = forge.report().unwrap();
    assert_eq!(report.performance.total_attempts, 6);
    assert_eq!(report.performance.recent_success_rate, 1.0);
    assert_eq!(report.performance.avg_quality, 82.0);
    assert_eq!(report.performance.quality_progression.len(), 6);
    assert_eq!(report.jobs.dispatched, 24);
    assert_eq!(report.strategies.iter().map(|s| s.usage_count).sum::<u64>(), 6);
    assert!(!report.strategy_efficiency.is_empty());

    let json = serde_json::to_value(&report).unwrap();
    assert!(json["curriculum"].is_object());
    assert!(json["reflection"]["threshold"].is_number());
}
