//! Reflection Cycle
//!
//! Turns the attempt history into confidence-scored insights at three
//! levels, attributes each to a single factor, and keeps only those whose
//! confidence clears the (possibly adaptive) threshold.

use chrono::{DateTime, Utc};
use forge_core::Clock;
use forge_core::types::{
    Insight, InsightLevel, ThresholdAdjustment, ThresholdRecommendation, Trend,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::analysis::{
    attribute, confidence, counterfactual, deficient_feature, impact, mean, pooled_std,
    split_by_factor,
};
use crate::config::ReflectionConfig;
use crate::memory::{MemoryTiers, Observation};
use crate::ForgeResult;

/// Characters of a statement shown in a summary
const SUMMARY_STATEMENT_CHARS: usize = 100;

#[derive(Debug, Default)]
struct Counters {
    passes: u64,
    emitted: u64,
    reinforced: u64,
    discarded: u64,
}

/// Overview of what reflection has produced
#[derive(Debug, Clone, Serialize)]
pub struct ReflectionSummary {
    pub total_insights: usize,
    pub by_level: BTreeMap<String, usize>,
    pub avg_confidence: f64,
    pub avg_impact: f64,
    pub threshold: f64,
    pub passes: u64,
    /// Strategic insights refreshed in place instead of repeated
    pub reinforced: u64,
    pub discarded: u64,
    pub recent: Vec<InsightDigest>,
}

/// Short form of an insight for summaries
#[derive(Debug, Clone, Serialize)]
pub struct InsightDigest {
    pub level: InsightLevel,
    pub statement: String,
    pub confidence: f64,
    pub impact: f64,
    pub created_at: DateTime<Utc>,
}

pub struct ReflectionCycle {
    config: ReflectionConfig,
    memory: Arc<MemoryTiers>,
    clock: Arc<dyn Clock>,
    threshold: Mutex<f64>,
    counters: Mutex<Counters>,
    /// Serializes passes
    pass_lock: tokio::sync::Mutex<()>,
    /// A pass has been requested and has not started yet
    queued: AtomicBool,
}

impl ReflectionCycle {
    pub fn new(config: ReflectionConfig, memory: Arc<MemoryTiers>, clock: Arc<dyn Clock>) -> Self {
        let threshold = config.confidence_threshold;
        Self {
            config,
            memory,
            clock,
            threshold: Mutex::new(threshold),
            counters: Mutex::new(Counters::default()),
            pass_lock: tokio::sync::Mutex::new(()),
            queued: AtomicBool::new(false),
        }
    }

    /// Current confidence threshold
    pub fn threshold(&self) -> ForgeResult<f64> {
        Ok(*self
            .threshold
            .lock()
            .map_err(|_| forge_core::Error::LockPoisoned)?)
    }

    /// Reflect over explicit windows
    pub async fn reflect(&self, recent_window: usize, earlier_window: usize) -> ForgeResult<Vec<Insight>> {
        let _pass = self.pass_lock.lock().await;
        self.reflect_locked(recent_window, earlier_window)
    }

    /// Run a pass with the configured windows.
    ///
    /// Requests coalesce: while one pass is queued and not yet started, further
    /// requests return `None` and are served by that pass.
    pub async fn run_pass(&self) -> ForgeResult<Option<Vec<Insight>>> {
        if self.queued.swap(true, Ordering::SeqCst) {
            debug!("reflection pass already queued");
            return Ok(None);
        }
        let _pass = self.pass_lock.lock().await;
        self.queued.store(false, Ordering::SeqCst);
        self.reflect_locked(self.config.recent_window, self.config.earlier_window)
            .map(Some)
    }

    fn reflect_locked(&self, recent_window: usize, earlier_window: usize) -> ForgeResult<Vec<Insight>> {
        let now = self.clock.now();
        let threshold = self.threshold()?;
        let history = self.memory.observations(self.memory.config().history_capacity)?;

        let mut candidates = Vec::new();
        candidates.extend(self.tactical(&history, recent_window, now));
        candidates.extend(self.strategic(&history, recent_window, earlier_window, now));
        candidates.extend(self.meta(&history, threshold, now)?);

        let mut kept = Vec::new();
        let (mut reinforced, mut discarded) = (0, 0);
        for mut insight in candidates {
            if insight.confidence >= threshold {
                if let Some(previous) = self.restated_by(&insight)? {
                    debug!(insight_id = %previous.id, delta = ?insight.delta, "strategic insight reinforced");
                    insight.id = previous.id;
                    insight.created_at = previous.created_at;
                    self.memory.store_insight(insight)?;
                    reinforced += 1;
                    continue;
                }
                info!(
                    insight_id = %insight.id,
                    level = %insight.level,
                    confidence = insight.confidence,
                    impact = insight.impact,
                    "{}",
                    insight.statement
                );
                self.memory.store_insight(insight.clone())?;
                kept.push(insight);
            } else {
                debug!(
                    level = %insight.level,
                    confidence = insight.confidence,
                    threshold,
                    "insight discarded"
                );
                discarded += 1;
            }
        }

        if self.config.adaptive_threshold {
            if let Some(rec) = kept.iter().find_map(|i| i.recommendation.as_ref()) {
                let mut current = self
                    .threshold
                    .lock()
                    .map_err(|_| forge_core::Error::LockPoisoned)?;
                info!(from = *current, to = rec.suggested, "reflection threshold adapted");
                *current = rec.suggested;
            }
        }

        let mut counters = self
            .counters
            .lock()
            .map_err(|_| forge_core::Error::LockPoisoned)?;
        counters.passes += 1;
        counters.emitted += kept.len() as u64;
        counters.reinforced += reinforced;
        counters.discarded += discarded;
        Ok(kept)
    }

    /// The latest strategic insight if the candidate only restates it: same
    /// trend and domain, delta within the noise threshold.
    fn restated_by(&self, candidate: &Insight) -> ForgeResult<Option<Insight>> {
        if candidate.level != InsightLevel::Strategic {
            return Ok(None);
        }
        let latest = self
            .memory
            .insights()?
            .into_iter()
            .filter(|i| i.level == InsightLevel::Strategic)
            .max_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(latest.filter(|previous| {
            previous.trend == candidate.trend
                && previous.domain == candidate.domain
                && matches!(
                    (previous.delta, candidate.delta),
                    (Some(a), Some(b)) if (a - b).abs() <= self.config.noise_threshold
                )
        }))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Levels
    // ─────────────────────────────────────────────────────────────────────────

    fn tactical(&self, history: &[Observation], recent_window: usize, now: DateTime<Utc>) -> Option<Insight> {
        let latest = history.last()?;
        let quality = latest.attempt.quality_score;
        if quality >= self.config.tactical_threshold {
            return None;
        }
        let recent = tail(history, recent_window);

        let (statement, delta, with, without) =
            if let Some((feature, gap, with, without)) = deficient_feature(latest, recent) {
                (
                    format!(
                        "Latest attempt scored {quality:.1}, below {:.0}; recent artifacts with `{feature}` average {gap:.1} points higher",
                        self.config.tactical_threshold
                    ),
                    gap,
                    with,
                    without,
                )
            } else {
                let attribution = attribute(recent)?;
                let (with, without) = split_by_factor(&attribution.factor, recent);
                (
                    format!(
                        "Latest attempt scored {quality:.1}, below {:.0}; quality tracks {} ({:.1} with vs {:.1} without)",
                        self.config.tactical_threshold,
                        attribution.factor,
                        attribution.mean_with,
                        attribution.mean_without
                    ),
                    attribution.mean_with - attribution.mean_without,
                    with,
                    without,
                )
            };

        let mut insight = Insight::new(InsightLevel::Tactical, statement, now);
        insight.confidence = confidence(recent.len(), pooled_std(&[&with, &without]));
        insight.impact = impact(delta);
        insight.delta = Some(delta);
        insight.domain = Some(latest.attempt.domain.clone());
        insight.evidence_refs = recent.iter().map(|o| o.attempt.id.clone()).collect();
        self.attach_causes(&mut insight, recent, history);
        Some(insight)
    }

    fn strategic(
        &self,
        history: &[Observation],
        recent_window: usize,
        earlier_window: usize,
        now: DateTime<Utc>,
    ) -> Option<Insight> {
        let split = history.len().saturating_sub(recent_window);
        let recent = &history[split..];
        let earlier = tail(&history[..split], earlier_window);
        if recent.len() < 2 || earlier.len() < 2 {
            return None;
        }

        let recent_q: Vec<f64> = recent.iter().map(|o| o.attempt.quality_score).collect();
        let earlier_q: Vec<f64> = earlier.iter().map(|o| o.attempt.quality_score).collect();
        let (recent_mean, earlier_mean) = (mean(&recent_q)?, mean(&earlier_q)?);
        let delta = recent_mean - earlier_mean;
        if delta.abs() <= self.config.noise_threshold {
            return None;
        }

        let trend = if delta > 0.0 { Trend::Improving } else { Trend::Declining };
        let evidence = &history[split - earlier.len()..];
        let mut insight = Insight::new(
            InsightLevel::Strategic,
            format!(
                "Quality {}: {earlier_mean:.1} -> {recent_mean:.1} ({delta:+.1}) over the last {} attempts",
                trend.as_str(),
                recent.len()
            ),
            now,
        );
        insight.confidence = confidence(evidence.len(), pooled_std(&[&recent_q, &earlier_q]));
        insight.impact = impact(delta);
        insight.trend = Some(trend);
        insight.delta = Some(delta);
        insight.tags.insert(trend.as_str().to_string());
        let domain = &evidence[0].attempt.domain;
        if evidence.iter().all(|o| &o.attempt.domain == domain) {
            insight.domain = Some(domain.clone());
        }
        insight.evidence_refs = evidence.iter().map(|o| o.attempt.id.clone()).collect();
        self.attach_causes(&mut insight, evidence, history);
        Some(insight)
    }

    /// Judge past insights by what followed them; if their hit rate is
    /// trending, recommend moving the threshold.
    fn meta(&self, history: &[Observation], threshold: f64, now: DateTime<Utc>) -> ForgeResult<Option<Insight>> {
        let window = self.config.followup_window;
        let mut past: Vec<Insight> = self
            .memory
            .insights()?
            .into_iter()
            .filter(|i| i.level != InsightLevel::Meta && i.confidence >= threshold)
            .collect();
        past.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        // (insight id, hit, improvement)
        let evaluated: Vec<(String, bool, f64)> = past
            .iter()
            .filter_map(|insight| {
                let pivot = history.partition_point(|o| o.attempt.timestamp <= insight.created_at);
                if pivot < window || history.len() - pivot < window {
                    return None;
                }
                let before: Vec<f64> = history[pivot - window..pivot].iter().map(|o| o.attempt.quality_score).collect();
                let after: Vec<f64> = history[pivot..pivot + window].iter().map(|o| o.attempt.quality_score).collect();
                let improvement = mean(&after)? - mean(&before)?;
                Some((insight.id.clone(), improvement > 0.0, improvement))
            })
            .collect();

        if evaluated.len() < self.config.meta_min_samples.max(2) {
            return Ok(None);
        }

        let half = evaluated.len() / 2;
        let (first, second) = evaluated.split_at(half);
        let hit_rate = |group: &[(String, bool, f64)]| {
            group.iter().filter(|(_, hit, _)| *hit).count() as f64 / group.len() as f64
        };
        let trend = hit_rate(second) - hit_rate(first);
        if trend.abs() < self.config.meta_trend_threshold {
            return Ok(None);
        }

        let (adjustment, suggested) = if trend < 0.0 {
            (ThresholdAdjustment::Raise, threshold + self.config.threshold_step)
        } else {
            (ThresholdAdjustment::Lower, threshold - self.config.threshold_step)
        };
        let suggested = suggested.clamp(self.config.min_threshold, self.config.max_threshold);

        let first_gain: Vec<f64> = first.iter().map(|e| e.2).collect();
        let second_gain: Vec<f64> = second.iter().map(|e| e.2).collect();

        let mut insight = Insight::new(
            InsightLevel::Meta,
            format!(
                "Insight hit rate moved {:.0}% -> {:.0}%; {} the confidence threshold {threshold:.2} -> {suggested:.2}",
                hit_rate(first) * 100.0,
                hit_rate(second) * 100.0,
                match adjustment {
                    ThresholdAdjustment::Raise => "raise",
                    ThresholdAdjustment::Lower => "lower",
                }
            ),
            now,
        );
        insight.confidence = confidence(evaluated.len(), pooled_std(&[&first_gain, &second_gain]));
        insight.impact = forge_core::types::clamp_rate(trend.abs());
        insight.trend = Some(if trend > 0.0 { Trend::Improving } else { Trend::Declining });
        insight.delta = Some(trend);
        insight.evidence_refs = evaluated.into_iter().map(|e| e.0).collect();
        insight.recommendation = Some(ThresholdRecommendation {
            adjustment,
            current: threshold,
            suggested,
        });
        Ok(Some(insight))
    }

    /// Causal and counterfactual steps
    fn attach_causes(&self, insight: &mut Insight, evidence: &[Observation], history: &[Observation]) {
        if let Some(attribution) = attribute(evidence) {
            insight.counterfactual = counterfactual(&attribution, evidence, history);
            insight.attribution = Some(attribution);
        }
    }

    pub fn summary(&self) -> ForgeResult<ReflectionSummary> {
        let insights = self.memory.insights()?;
        let counters = self
            .counters
            .lock()
            .map_err(|_| forge_core::Error::LockPoisoned)?;

        let mut by_level = BTreeMap::new();
        for insight in &insights {
            *by_level.entry(insight.level.as_str().to_string()).or_insert(0) += 1;
        }
        let confidences: Vec<f64> = insights.iter().map(|i| i.confidence).collect();
        let impacts: Vec<f64> = insights.iter().map(|i| i.impact).collect();

        let recent = insights
            .iter()
            .rev()
            .take(5)
            .map(|i| InsightDigest {
                level: i.level,
                statement: truncate(&i.statement, SUMMARY_STATEMENT_CHARS),
                confidence: i.confidence,
                impact: i.impact,
                created_at: i.created_at,
            })
            .collect();

        Ok(ReflectionSummary {
            total_insights: insights.len(),
            by_level,
            avg_confidence: mean(&confidences).unwrap_or(0.0),
            avg_impact: mean(&impacts).unwrap_or(0.0),
            threshold: self.threshold()?,
            passes: counters.passes,
            reinforced: counters.reinforced,
            discarded: counters.discarded,
            recent,
        })
    }
}

fn tail<T>(items: &[T], n: usize) -> &[T] {
    &items[items.len().saturating_sub(n)..]
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max).collect();
        out.push_str("...");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;
    use forge_core::types::Factor;
    use crate::memory::ArtifactFeatures;
    use chrono::TimeZone;
    use forge_core::types::{ArtifactMetadata, Attempt, Difficulty, NewAttempt, QualitySource, Strategy};
    use forge_core::{InMemoryStore, ManualClock};

    struct Harness {
        memory: Arc<MemoryTiers>,
        clock: Arc<ManualClock>,
        cycle: ReflectionCycle,
    }

    fn harness(config: ReflectionConfig) -> Harness {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()));
        let memory = Arc::new(MemoryTiers::new(
            MemoryConfig::default(),
            clock.clone(),
            Arc::new(InMemoryStore::new()),
        ));
        let cycle = ReflectionCycle::new(config, memory.clone(), clock.clone());
        Harness { memory, clock, cycle }
    }

    impl Harness {
        fn record(&self, quality: f64, strategy: Strategy, features: &[&str]) -> String {
            self.clock.advance(chrono::Duration::minutes(1));
            let attempt = Arc::new(Attempt::new(
                NewAttempt {
                    description: "dashboard with charts".into(),
                    domain: "ui".into(),
                    difficulty: Difficulty::Intermediate,
                    strategy,
                    success: quality >= 60.0,
                    quality_score: quality,
                    quality_source: QualitySource::Review,
                    reviewed: true,
                    elapsed_secs: 3.0,
                    artifact_metadata: ArtifactMetadata::default(),
                    task_id: None,
                    extra_tags: vec![],
                    used_patterns: vec![],
                },
                self.clock.now(),
            ));
            let id = attempt.id.clone();
            self.memory
                .attach_features(
                    &id,
                    ArtifactFeatures {
                        features: features.iter().map(|f| f.to_string()).collect(),
                        ..Default::default()
                    },
                )
                .unwrap();
            self.memory.record(attempt).unwrap();
            id
        }
    }

    #[tokio::test]
    async fn test_strategic_improving_trend() {
        let h = harness(ReflectionConfig::default());
        for i in 0..12 {
            h.record(60.0 + 25.0 * i as f64 / 11.0, Strategy::Imitation, &[]);
        }
        let insights = h.cycle.reflect(10, 20).await.unwrap();
        let strategic: Vec<_> = insights.iter().filter(|i| i.level == InsightLevel::Strategic).collect();
        assert_eq!(strategic.len(), 1);
        let insight = strategic[0];
        assert!(insight.has_tag("improving"));
        assert_eq!(insight.trend, Some(Trend::Improving));
        let delta = insight.delta.unwrap();
        assert!((delta - 13.636).abs() < 0.01);
        assert!((insight.confidence - 0.9345).abs() < 0.001);
        assert_eq!(insight.evidence_refs.len(), 12);
        assert_eq!(insight.domain.as_deref(), Some("ui"));
        assert_eq!(h.memory.stats().unwrap().reflective, insights.len());
    }

    #[tokio::test]
    async fn test_strategic_needs_two_per_window() {
        let h = harness(ReflectionConfig::default());
        for q in [40.0, 90.0, 90.0, 90.0] {
            h.record(q, Strategy::Imitation, &[]);
        }
        // Only one attempt precedes the recent window of three
        let insights = h.cycle.reflect(3, 20).await.unwrap();
        assert!(insights.iter().all(|i| i.level != InsightLevel::Strategic));
    }

    #[tokio::test]
    async fn test_strategic_within_noise_is_silent() {
        let h = harness(ReflectionConfig::default());
        for i in 0..12 {
            h.record(80.0 + (i % 2) as f64, Strategy::Imitation, &[]);
        }
        let insights = h.cycle.reflect(10, 20).await.unwrap();
        assert!(insights.is_empty());
    }

    #[tokio::test]
    async fn test_tactical_names_missing_feature() {
        let h = harness(ReflectionConfig::default());
        h.record(90.0, Strategy::Imitation, &["validation", "responsive"]);
        h.record(88.0, Strategy::Imitation, &["validation"]);
        h.record(86.0, Strategy::Imitation, &["validation"]);
        h.record(84.0, Strategy::Imitation, &["validation"]);
        h.record(50.0, Strategy::Imitation, &["responsive"]);

        let insights = h.cycle.reflect(10, 20).await.unwrap();
        let tactical = insights
            .iter()
            .find(|i| i.level == InsightLevel::Tactical)
            .expect("tactical insight");
        assert!(tactical.statement.contains("`validation`"));
        assert!(tactical.delta.unwrap() > 30.0);
        let attribution = tactical.attribution.as_ref().unwrap();
        assert_eq!(attribution.factor, Factor::Feature("validation".into()));
        let cf = tactical.counterfactual.as_ref().unwrap();
        assert_eq!(cf.alternative, "with feature=validation");
        assert!(cf.expected_quality <= cf.observed_max && cf.expected_quality >= cf.observed_min);
    }

    #[tokio::test]
    async fn test_low_confidence_is_discarded() {
        let h = harness(ReflectionConfig::default());
        h.record(90.0, Strategy::Imitation, &["tests"]);
        h.record(40.0, Strategy::Imitation, &[]);

        // Two attempts of evidence: confidence at most 0.4
        let insights = h.cycle.reflect(10, 20).await.unwrap();
        assert!(insights.is_empty());
        let summary = h.cycle.summary().unwrap();
        assert_eq!(summary.discarded, 1);
        assert_eq!(summary.total_insights, 0);
    }

    #[tokio::test]
    async fn test_meta_recommends_raising_threshold() {
        let config = ReflectionConfig {
            adaptive_threshold: true,
            ..Default::default()
        };
        let h = harness(config);

        // Each block: 5 attempts, an insight, then 5 attempts that either
        // improve (early) or decline (late).
        for block in 0..4 {
            let improves = block < 2;
            for _ in 0..5 {
                h.record(70.0, Strategy::Imitation, &[]);
            }
            let mut insight = Insight::new(InsightLevel::Tactical, format!("lesson {block}"), h.clock.now());
            insight.confidence = 0.9;
            h.memory.store_insight(insight).unwrap();
            for _ in 0..5 {
                h.record(if improves { 80.0 } else { 60.0 }, Strategy::Imitation, &[]);
            }
            // Return to baseline for the next block
            for _ in 0..5 {
                h.record(70.0, Strategy::Imitation, &[]);
            }
        }

        let insights = h.cycle.reflect(3, 3).await.unwrap();
        let meta = insights
            .iter()
            .find(|i| i.level == InsightLevel::Meta)
            .expect("meta insight");
        let rec = meta.recommendation.as_ref().unwrap();
        assert_eq!(rec.adjustment, ThresholdAdjustment::Raise);
        assert!((rec.suggested - 0.75).abs() < 1e-9);
        assert_eq!(meta.evidence_refs.len(), 4);
        assert!((meta.impact - 1.0).abs() < 1e-9);
        assert!((h.cycle.threshold().unwrap() - 0.75).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_run_pass_coalesces() {
        let h = Arc::new(harness(ReflectionConfig::default()));
        for i in 0..12 {
            h.record(60.0 + 25.0 * i as f64 / 11.0, Strategy::Imitation, &[]);
        }
        // Hold the pass lock so requests queue up behind it
        let guard = h.cycle.pass_lock.lock().await;
        let first = {
            let h = h.clone();
            tokio::spawn(async move { h.cycle.run_pass().await })
        };
        tokio::task::yield_now().await;
        while !h.cycle.queued.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        let second = h.cycle.run_pass().await.unwrap();
        assert!(second.is_none());
        drop(guard);
        assert!(first.await.unwrap().unwrap().is_some());
        assert_eq!(h.cycle.summary().unwrap().passes, 1);
    }

    #[tokio::test]
    async fn test_steady_trend_is_reinforced_not_repeated() {
        let h = harness(ReflectionConfig::default());
        for i in 0..40 {
            h.record(40.0 + 50.0 * i as f64 / 39.0, Strategy::Imitation, &[]);
            h.cycle.run_pass().await.unwrap();
        }

        let strategic: Vec<Insight> = h
            .memory
            .insights()
            .unwrap()
            .into_iter()
            .filter(|i| i.level == InsightLevel::Strategic)
            .collect();
        assert_eq!(strategic.len(), 1);
        assert!(strategic[0].has_tag("improving"));
        // The kept insight carries the latest evidence
        assert_eq!(strategic[0].evidence_refs.len(), 30);

        let summary = h.cycle.summary().unwrap();
        assert_eq!(summary.passes, 40);
        assert!(summary.reinforced >= 20);
    }

    #[tokio::test]
    async fn test_reversed_trend_is_a_new_insight() {
        let h = harness(ReflectionConfig::default());
        for i in 0..12 {
            h.record(60.0 + 2.0 * i as f64, Strategy::Imitation, &[]);
        }
        h.cycle.run_pass().await.unwrap();
        for _ in 0..10 {
            h.record(50.0, Strategy::Imitation, &[]);
        }
        h.cycle.run_pass().await.unwrap();

        let trends: Vec<_> = h
            .memory
            .insights()
            .unwrap()
            .into_iter()
            .filter(|i| i.level == InsightLevel::Strategic)
            .map(|i| i.trend)
            .collect();
        assert_eq!(trends, vec![Some(Trend::Improving), Some(Trend::Declining)]);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 100), "short");
        let long = "x".repeat(120);
        assert_eq!(truncate(&long, 100).len(), 103);
    }
}
