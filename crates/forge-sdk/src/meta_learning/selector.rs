//! Strategy selection.
//!
//! ```text
//!   score(s) = w1·success_rate
//!            + w2·avg_quality/100
//!            + w3·avg_quality_per_time / max over the domain
//!            + w4·sqrt(2·ln(N+1) / (n+1))
//! ```
//!
//! `N` is the domain's total usage and `n` the strategy's. The argmax wins;
//! ties go to the earlier strategy in declaration order.

use forge_core::StrategyStatsStore;
use forge_core::types::{Difficulty, Strategy, StrategyStat};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::config::SelectorConfig;
use crate::ForgeResult;

/// Parameters handed to the generator along with the chosen strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyParams {
    /// Number of generate/refine iterations the time budget affords
    pub iteration_budget: u32,
    pub temperature: f64,
    /// Maximum number of patterns to pass along
    pub pattern_limit: usize,
    /// Distinct approaches to try; exploration only
    pub alternative_approaches: Option<u32>,
    pub focus: String,
}

/// One strategy's score with its components
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyScore {
    pub strategy: Strategy,
    pub score: f64,
    pub success_rate: f64,
    pub quality: f64,
    pub efficiency: f64,
    pub exploration_bonus: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategySelection {
    pub strategy: Strategy,
    pub params: StrategyParams,
    /// Every candidate, in strategy order
    pub scores: Vec<StrategyScore>,
}

pub struct MetaLearningSelector {
    config: SelectorConfig,
    stats: Arc<StrategyStatsStore>,
}

impl MetaLearningSelector {
    pub fn new(config: SelectorConfig, stats: Arc<StrategyStatsStore>) -> Self {
        Self { config, stats }
    }

    pub fn stats(&self) -> &Arc<StrategyStatsStore> {
        &self.stats
    }

    /// Choose a strategy for a request and derive its parameters.
    ///
    /// # Arguments
    ///
    /// * `domain` - Request domain; statistics are kept per domain
    /// * `difficulty` - Advanced and harder requests get an extra iteration
    /// * `time_budget_secs` - Wall-clock budget for the whole request
    pub fn select(&self, domain: &str, difficulty: Difficulty, time_budget_secs: f64) -> ForgeResult<StrategySelection> {
        let rows = self.stats.for_domain(domain)?;
        let scores = self.score(&rows);

        let best = scores
            .iter()
            .fold(None, |best: Option<&StrategyScore>, s| match best {
                Some(b) if b.score >= s.score => Some(b),
                _ => Some(s),
            })
            .map(|s| s.strategy)
            .unwrap_or(Strategy::Imitation);

        let stat = rows
            .iter()
            .find(|r| r.strategy == best)
            .cloned()
            .unwrap_or_else(|| StrategyStat::empty(best, domain));
        let params = self.params(best, &stat, difficulty, time_budget_secs);

        debug!(
            domain,
            difficulty = %difficulty,
            strategy = %best,
            iteration_budget = params.iteration_budget,
            "strategy selected"
        );
        Ok(StrategySelection {
            strategy: best,
            params,
            scores,
        })
    }

    /// Fold one outcome into the (strategy, domain) statistics
    pub fn record_outcome(
        &self,
        strategy: Strategy,
        domain: &str,
        success: bool,
        quality: f64,
        elapsed_secs: f64,
    ) -> ForgeResult<StrategyStat> {
        Ok(self.stats.record(strategy, domain, success, quality, elapsed_secs)?)
    }

    fn score(&self, rows: &[StrategyStat]) -> Vec<StrategyScore> {
        let total: u64 = rows.iter().map(|r| r.usage_count).sum();
        let max_qpt = rows.iter().map(|r| r.avg_quality_per_time).fold(0.0, f64::max);
        let c = &self.config;

        rows.iter()
            .map(|row| {
                let efficiency = if max_qpt > 0.0 { row.avg_quality_per_time / max_qpt } else { 0.0 };
                let quality = row.avg_quality / 100.0;
                let exploration_bonus =
                    (2.0 * ((total + 1) as f64).ln() / (row.usage_count + 1) as f64).sqrt();
                StrategyScore {
                    strategy: row.strategy,
                    score: c.success_weight * row.success_rate
                        + c.quality_weight * quality
                        + c.efficiency_weight * efficiency
                        + c.exploration_weight * exploration_bonus,
                    success_rate: row.success_rate,
                    quality,
                    efficiency,
                    exploration_bonus,
                }
            })
            .collect()
    }

    fn params(&self, strategy: Strategy, stat: &StrategyStat, difficulty: Difficulty, time_budget_secs: f64) -> StrategyParams {
        let expected_secs = if stat.usage_count > 0 && stat.avg_quality_per_time > 0.0 && stat.avg_quality > 0.0 {
            stat.avg_quality / stat.avg_quality_per_time
        } else {
            self.config.default_attempt_secs
        };
        let max = self.config.max_iterations.max(1);
        let mut iterations = ((time_budget_secs.max(0.0) / expected_secs).floor() as u32).clamp(1, max);
        if difficulty >= Difficulty::Advanced {
            iterations = (iterations + 1).min(max);
        }

        let hard = difficulty >= Difficulty::Advanced;
        let (temperature, pattern_limit, focus) = match strategy {
            Strategy::Imitation => (0.2, 5, if hard { "deep_example_analysis" } else { "pattern_matching" }),
            Strategy::Exploration => (0.9, 1, "novelty"),
            Strategy::Refinement => (0.3, 2, if hard { "quality" } else { "speed" }),
            Strategy::Transfer => (0.5, 3, "cross_domain_mapping"),
            Strategy::Composition => (0.6, 3, "synthesis"),
        };
        let alternative_approaches = (strategy == Strategy::Exploration)
            .then(|| ((time_budget_secs.max(0.0) / 60.0) as u32 / 30).max(2));

        StrategyParams {
            iteration_budget: iterations,
            temperature,
            pattern_limit,
            alternative_approaches,
            focus: focus.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector() -> MetaLearningSelector {
        MetaLearningSelector::new(SelectorConfig::default(), Arc::new(StrategyStatsStore::new()))
    }

    #[test]
    fn test_cold_start_picks_first_strategy() {
        let s = selector();
        let selection = s.select("ui", Difficulty::Beginner, 300.0).unwrap();
        // Every score is zero; declaration order breaks the tie
        assert_eq!(selection.strategy, Strategy::Imitation);
        assert_eq!(selection.scores.len(), 5);
        assert!(selection.scores.iter().all(|s| s.score == 0.0));
    }

    #[test]
    fn test_unused_strategies_get_explored() {
        let s = selector();
        for _ in 0..10 {
            s.record_outcome(Strategy::Imitation, "ui", true, 80.0, 10.0).unwrap();
        }
        let selection = s.select("ui", Difficulty::Beginner, 300.0).unwrap();
        // sqrt(2 ln 11) dominates the imitation score
        assert_eq!(selection.strategy, Strategy::Exploration);
    }

    #[test]
    fn test_performance_wins_at_equal_usage() {
        let s = selector();
        for strategy in Strategy::ALL {
            let good = strategy == Strategy::Refinement;
            for _ in 0..10 {
                s.record_outcome(strategy, "ui", good, if good { 95.0 } else { 10.0 }, 10.0).unwrap();
            }
        }
        let selection = s.select("ui", Difficulty::Beginner, 300.0).unwrap();
        assert_eq!(selection.strategy, Strategy::Refinement);
        let refinement = &selection.scores[2];
        assert_eq!(refinement.efficiency, 1.0);

        // Other domains are unaffected
        assert_eq!(s.select("api", Difficulty::Beginner, 300.0).unwrap().strategy, Strategy::Imitation);
    }

    #[test]
    fn test_iteration_budget() {
        let s = selector();
        let p = s.select("ui", Difficulty::Beginner, 300.0).unwrap().params;
        assert_eq!(p.iteration_budget, 5);
        assert_eq!(p.temperature, 0.2);
        assert_eq!(p.pattern_limit, 5);
        assert_eq!(p.focus, "pattern_matching");
        assert_eq!(p.alternative_approaches, None);

        let p = s.select("ui", Difficulty::Advanced, 300.0).unwrap().params;
        assert_eq!(p.iteration_budget, 6);
        assert_eq!(p.focus, "deep_example_analysis");

        assert_eq!(s.select("ui", Difficulty::Beginner, 10.0).unwrap().params.iteration_budget, 1);
        assert_eq!(s.select("ui", Difficulty::Expert, 100_000.0).unwrap().params.iteration_budget, 10);
    }

    #[test]
    fn test_iteration_budget_uses_history() {
        let s = selector();
        // quality 80 in 20s: 4 quality points per second, so 20s expected
        for _ in 0..3 {
            s.record_outcome(Strategy::Imitation, "ui", true, 80.0, 20.0).unwrap();
        }
        for strategy in &Strategy::ALL[1..] {
            for _ in 0..3 {
                s.record_outcome(*strategy, "ui", false, 0.0, 20.0).unwrap();
            }
        }
        let selection = s.select("ui", Difficulty::Beginner, 100.0).unwrap();
        assert_eq!(selection.strategy, Strategy::Imitation);
        assert_eq!(selection.params.iteration_budget, 5);
    }

    #[test]
    fn test_exploration_params() {
        let s = selector();
        let stat = StrategyStat::empty(Strategy::Exploration, "ui");
        let p = s.params(Strategy::Exploration, &stat, Difficulty::Beginner, 7200.0);
        assert_eq!(p.temperature, 0.9);
        assert_eq!(p.pattern_limit, 1);
        assert_eq!(p.focus, "novelty");
        assert_eq!(p.alternative_approaches, Some(4));
        let p = s.params(Strategy::Exploration, &stat, Difficulty::Beginner, 60.0);
        assert_eq!(p.alternative_approaches, Some(2));
    }
}
