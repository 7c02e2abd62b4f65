//! On-demand report over every aggregate. Nothing here is persisted.

use chrono::{DateTime, Utc};
use forge_core::curriculum::CurriculumAnalytics;
use forge_core::types::{Attempt, Pattern, StrategyStat};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::memory::MemoryStats;
use crate::orchestrator::JobStats;
use crate::reflection::ReflectionSummary;

/// Attempts in the rolling success window
pub const RECENT_WINDOW: usize = 5;

/// Attempts in the quality progression
pub const PROGRESSION_WINDOW: usize = 10;

/// Patterns listed in a report
const TOP_PATTERNS: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct ForgeReport {
    pub generated_at: DateTime<Utc>,
    pub performance: PerformanceSummary,
    pub memory: MemoryStats,
    pub curriculum: CurriculumAnalytics,
    pub strategies: Vec<StrategyStat>,
    /// Strategy -> quality points per second, across domains
    pub strategy_efficiency: BTreeMap<String, f64>,
    pub reflection: ReflectionSummary,
    pub top_patterns: Vec<PatternDigest>,
    pub jobs: JobStats,
}

/// Outcome metrics over the attempt history
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub total_attempts: usize,
    pub successes: usize,
    pub success_rate: f64,
    /// Success rate over the last five attempts
    pub recent_success_rate: f64,
    pub avg_quality: f64,
    /// Quality of the last ten attempts, oldest first
    pub quality_progression: Vec<f64>,
    /// Time spent on successful attempts / total time
    pub time_efficiency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternDigest {
    pub id: String,
    pub domain: String,
    pub success_rate: f64,
    pub usage_count: u64,
    pub evidence_count: u64,
    pub tech_stack: Vec<String>,
}

impl From<&Pattern> for PatternDigest {
    fn from(p: &Pattern) -> Self {
        Self {
            id: p.id.clone(),
            domain: p.domain.clone(),
            success_rate: p.success_rate,
            usage_count: p.usage_count,
            evidence_count: p.evidence_count,
            tech_stack: p.tech_stack.iter().cloned().collect(),
        }
    }
}

pub(crate) fn performance(history: &[Arc<Attempt>]) -> PerformanceSummary {
    if history.is_empty() {
        return PerformanceSummary::default();
    }
    let rate = |attempts: &[Arc<Attempt>]| {
        attempts.iter().filter(|a| a.success).count() as f64 / attempts.len() as f64
    };
    let recent = &history[history.len().saturating_sub(RECENT_WINDOW)..];
    let progression = &history[history.len().saturating_sub(PROGRESSION_WINDOW)..];

    let total_time: f64 = history.iter().map(|a| a.elapsed_secs).sum();
    let success_time: f64 = history.iter().filter(|a| a.success).map(|a| a.elapsed_secs).sum();

    PerformanceSummary {
        total_attempts: history.len(),
        successes: history.iter().filter(|a| a.success).count(),
        success_rate: rate(history),
        recent_success_rate: rate(recent),
        avg_quality: history.iter().map(|a| a.quality_score).sum::<f64>() / history.len() as f64,
        quality_progression: progression.iter().map(|a| a.quality_score).collect(),
        time_efficiency: if total_time > 0.0 { success_time / total_time } else { 0.0 },
    }
}

/// Usage-weighted average quality over average seconds, per strategy
pub(crate) fn strategy_efficiency(stats: &[StrategyStat]) -> BTreeMap<String, f64> {
    let mut sums: BTreeMap<String, (f64, f64)> = BTreeMap::new();
    for stat in stats.iter().filter(|s| s.usage_count > 0) {
        let n = stat.usage_count as f64;
        let entry = sums.entry(stat.strategy.as_str().to_string()).or_default();
        entry.0 += stat.avg_quality * n;
        entry.1 += stat.avg_elapsed_secs * n;
    }
    sums.into_iter()
        .map(|(strategy, (quality, secs))| (strategy, if secs > 0.0 { quality / secs } else { 0.0 }))
        .collect()
}

pub(crate) fn top_patterns(mut patterns: Vec<Pattern>) -> Vec<PatternDigest> {
    patterns.sort_by(|a, b| {
        b.success_rate
            .total_cmp(&a.success_rate)
            .then(b.usage_count.cmp(&a.usage_count))
            .then(a.id.cmp(&b.id))
    });
    patterns.iter().take(TOP_PATTERNS).map(PatternDigest::from).collect()
}
