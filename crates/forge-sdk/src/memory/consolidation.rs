//! Decay, eviction and clustering rules shared by `record` and `consolidate`.
//!
//! ```text
//!   importance = base_importance × decay_rate ^ elapsed_intervals
//!
//!   mid-term attempts ──cluster(domain, jaccard ≥ t)──▶ ≥K members
//!                                                      ≥0.7 success
//!                                                      ≥2 successes ──▶ Pattern
//! ```

use chrono::{DateTime, Utc};
use forge_core::tags::jaccard;
use forge_core::types::Attempt;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use super::types::MemoryEntry;
use crate::config::MemoryConfig;
use crate::utils::elapsed_intervals;

/// Base importance given to a freshly created pattern
pub(crate) const PATTERN_BASE_IMPORTANCE: f64 = 1.0;

/// Base importance of an attempt at record time
pub(crate) fn attempt_importance(attempt: &Attempt) -> f64 {
    let base = if attempt.success { 0.8 } else { 0.6 };
    base + 0.2 * attempt.quality_score / 100.0
}

/// An evicted short-term attempt is kept iff it succeeded or was notable
pub(crate) fn qualifies_for_mid(attempt: &Attempt, notable_quality: f64) -> bool {
    attempt.success || attempt.quality_score > notable_quality
}

/// Importance of an entry at `now`, computed from its base
pub(crate) fn decayed_importance(entry: &MemoryEntry, config: &MemoryConfig, now: DateTime<Utc>) -> f64 {
    let intervals = elapsed_intervals(
        entry.last_reinforced_at,
        now,
        Duration::from_secs(config.decay_interval_secs),
    );
    entry.base_importance * config.decay_rate.powf(intervals)
}

/// Recompute `importance` from `base_importance`. Returns true if it changed.
pub(crate) fn apply_decay(entry: &mut MemoryEntry, config: &MemoryConfig, now: DateTime<Utc>) -> bool {
    let decayed = decayed_importance(entry, config, now);
    let changed = decayed != entry.importance;
    entry.importance = decayed;
    changed
}

/// Boost base importance (capped) and restart the decay curve
pub(crate) fn reinforce(entry: &mut MemoryEntry, config: &MemoryConfig, now: DateTime<Utc>) {
    entry.base_importance = (entry.base_importance + config.reinforcement_boost).min(config.max_importance);
    entry.importance = entry.base_importance;
    entry.last_reinforced_at = now;
}

/// Index of the entry to evict: lowest importance at `now`, oldest on ties
pub(crate) fn eviction_candidate(
    entries: &[MemoryEntry],
    config: &MemoryConfig,
    now: DateTime<Utc>,
) -> Option<usize> {
    entries
        .iter()
        .enumerate()
        .map(|(i, e)| (i, decayed_importance(e, config, now), e.created_at))
        .min_by(|(_, a, at), (_, b, bt)| a.total_cmp(b).then(at.cmp(bt)))
        .map(|(i, _, _)| i)
}

/// A mid-term attempt considered for clustering
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub attempt: Arc<Attempt>,
    /// Attempt tags plus artifact features
    pub tags: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

/// A group of similar attempts that qualifies for promotion
#[derive(Debug, Clone)]
pub(crate) struct Cluster {
    pub domain: String,
    pub members: Vec<Candidate>,
}

impl Cluster {
    pub fn successes(&self) -> usize {
        self.members.iter().filter(|c| c.attempt.success).count()
    }

    pub fn success_rate(&self) -> f64 {
        self.successes() as f64 / self.members.len() as f64
    }

    /// Union of the tags of the successful members
    pub fn tags(&self) -> BTreeSet<String> {
        self.members
            .iter()
            .filter(|c| c.attempt.success)
            .flat_map(|c| c.tags.iter().cloned())
            .collect()
    }

    pub fn attempt_ids(&self) -> Vec<String> {
        self.members.iter().map(|c| c.attempt.id.clone()).collect()
    }

    /// Best successful member, by quality then recency
    pub fn exemplar(&self) -> Option<&Candidate> {
        self.members
            .iter()
            .filter(|c| c.attempt.success)
            .max_by(|a, b| {
                a.attempt
                    .quality_score
                    .total_cmp(&b.attempt.quality_score)
                    .then(a.created_at.cmp(&b.created_at))
            })
    }
}

/// Greedy clustering, seeds taken oldest first.
///
/// A seed gathers every unassigned candidate in its domain whose tags are
/// similar enough. Qualifying clusters claim their members; a seed whose
/// cluster does not qualify leaves the others free for later seeds.
pub(crate) fn find_clusters(mut candidates: Vec<Candidate>, config: &MemoryConfig) -> Vec<Cluster> {
    candidates.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    let mut claimed = vec![false; candidates.len()];
    let mut clusters = Vec::new();

    for seed in 0..candidates.len() {
        if claimed[seed] {
            continue;
        }
        let seed_ref = &candidates[seed];
        let members: Vec<usize> = (0..candidates.len())
            .filter(|&i| !claimed[i])
            .filter(|&i| {
                i == seed
                    || (candidates[i].attempt.domain == seed_ref.attempt.domain
                        && jaccard(&seed_ref.tags, &candidates[i].tags) >= config.similarity_threshold)
            })
            .collect();

        let cluster = Cluster {
            domain: seed_ref.attempt.domain.clone(),
            members: members.iter().map(|&i| candidates[i].clone()).collect(),
        };
        if cluster.members.len() >= config.promotion_min_evidence
            && cluster.success_rate() >= config.promotion_success_rate
            && cluster.successes() >= config.promotion_min_successes
        {
            for i in members {
                claimed[i] = true;
            }
            clusters.push(cluster);
        }
    }

    clusters
}
