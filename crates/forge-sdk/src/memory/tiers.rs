//! Memory Tiers
//!
//! Short-term (FIFO), mid-term (importance-ranked), long-term (patterns) and
//! reflective (insights). `record` only appends and shifts entries between
//! the short and mid tiers; every other change to importance, promotion and
//! eviction happens in `consolidate`.

use chrono::{DateTime, Utc};
use forge_core::db::DocumentStore;
use forge_core::tags::overlap_ratio;
use forge_core::types::{Attempt, Insight, Pattern};
use forge_core::Clock;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::consolidation::{
    Candidate, Cluster, PATTERN_BASE_IMPORTANCE, apply_decay, attempt_importance,
    eviction_candidate, find_clusters, qualifies_for_mid, reinforce,
};
use super::types::{
    ArtifactFeatures, ConsolidationResult, MemoryEntry, MemoryPayload, MemorySnapshot,
    MemoryStats, MemoryTier, Observation, RecallQuery, RecallResult, RecordOutcome, SNIPPET_CHARS,
    SnapshotEntry,
};
use crate::config::MemoryConfig;
use crate::utils::short_hash;
use crate::{ForgeError, ForgeResult};

#[derive(Default)]
struct TierState {
    short: VecDeque<MemoryEntry>,
    /// Insertion order, oldest first
    mid: Vec<MemoryEntry>,
    long: Vec<MemoryEntry>,
    reflective: Vec<MemoryEntry>,
    /// Performance log for reflection and reporting
    history: VecDeque<Arc<Attempt>>,
    features: HashMap<String, ArtifactFeatures>,
    /// Attempts already folded into a pattern
    consolidated: HashSet<String>,
    pending_reuse: Vec<(String, bool)>,
    /// Pattern and insight ids whose latest version is not yet stored
    dirty: BTreeSet<String>,
    passes: u64,
    last_consolidation_at: Option<DateTime<Utc>>,
}

impl TierState {
    fn entry_tags(&self, entry: &MemoryEntry) -> BTreeSet<String> {
        let mut tags = entry.payload.tags();
        if let MemoryPayload::Attempt(a) = &entry.payload {
            if let Some(f) = self.features.get(&a.id) {
                tags.extend(f.features.iter().cloned());
            }
        }
        tags
    }

    fn tier(&self, tier: MemoryTier) -> Box<dyn Iterator<Item = &MemoryEntry> + '_> {
        match tier {
            MemoryTier::ShortTerm => Box::new(self.short.iter()),
            MemoryTier::MidTerm => Box::new(self.mid.iter()),
            MemoryTier::LongTerm => Box::new(self.long.iter()),
            MemoryTier::Reflective => Box::new(self.reflective.iter()),
        }
    }

    fn pattern_mut(&mut self, id: &str) -> Option<&mut MemoryEntry> {
        self.long.iter_mut().find(|e| e.id() == id)
    }
}

/// The four memory tiers plus the attempt history
pub struct MemoryTiers {
    config: MemoryConfig,
    clock: Arc<dyn Clock>,
    store: Arc<dyn DocumentStore>,
    state: Mutex<TierState>,
    /// Serializes consolidation passes
    consolidation: tokio::sync::Mutex<()>,
}

impl MemoryTiers {
    pub fn new(config: MemoryConfig, clock: Arc<dyn Clock>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            config,
            clock,
            store,
            state: Mutex::new(TierState::default()),
            consolidation: tokio::sync::Mutex::new(()),
        }
    }

    fn state(&self) -> ForgeResult<MutexGuard<'_, TierState>> {
        self.state
            .lock()
            .map_err(|_| forge_core::Error::LockPoisoned.into())
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Rehydrate long-term, reflective and history from the store
    pub fn load(&self) -> ForgeResult<()> {
        let patterns = self.store.load_all::<Pattern>()?;
        let mut insights = self.store.load_all::<Insight>()?;
        let mut attempts = self.store.load_all::<Attempt>()?;
        attempts.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        let mut state = self.state()?;
        for pattern in patterns {
            state.consolidated.extend(pattern.source_attempts.iter().cloned());
            let mut entry = MemoryEntry::new(
                MemoryTier::LongTerm,
                MemoryPayload::Pattern(pattern.clone()),
                PATTERN_BASE_IMPORTANCE,
                pattern.created_at,
            );
            entry.last_reinforced_at = pattern.updated_at;
            state.long.push(entry);
        }
        insights.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        for insight in insights {
            let (confidence, at) = (insight.confidence, insight.created_at);
            state.reflective.push(MemoryEntry::new(
                MemoryTier::Reflective,
                MemoryPayload::Insight(insight),
                confidence,
                at,
            ));
        }
        let skip = attempts.len().saturating_sub(self.config.history_capacity);
        state.history = attempts.into_iter().skip(skip).map(Arc::new).collect();

        info!(
            patterns = state.long.len(),
            insights = state.reflective.len(),
            history = state.history.len(),
            "memory restored from store"
        );
        Ok(())
    }

    /// Append an attempt to short-term memory and the history.
    ///
    /// The capacity check happens under the same lock as the append: the
    /// oldest short-term entry either moves to mid-term or is dropped. A
    /// mid-term overflow caused by that move is evicted here too, so the tier
    /// never sits above capacity between passes; `consolidate` handles every
    /// other demotion and eviction.
    pub fn record(&self, attempt: Arc<Attempt>) -> ForgeResult<RecordOutcome> {
        let now = self.clock.now();
        let mut state = self.state()?;
        let mut outcome = RecordOutcome::default();

        state.history.push_back(Arc::clone(&attempt));
        while state.history.len() > self.config.history_capacity {
            state.history.pop_front();
        }

        for pattern_id in &attempt.used_patterns {
            state.pending_reuse.push((pattern_id.clone(), attempt.success));
        }

        let importance = attempt_importance(&attempt);
        state.short.push_back(MemoryEntry::new(
            MemoryTier::ShortTerm,
            MemoryPayload::Attempt(Arc::clone(&attempt)),
            importance,
            now,
        ));

        if state.short.len() > self.config.short_term_capacity {
            if let Some(mut evicted) = state.short.pop_front() {
                outcome.evicted = Some(evicted.id().to_string());
                let keep = evicted
                    .payload
                    .as_attempt()
                    .is_some_and(|a| qualifies_for_mid(a, self.config.notable_quality));
                if keep {
                    evicted.tier = MemoryTier::MidTerm;
                    state.mid.push(evicted);
                    outcome.promoted_to_mid = true;
                    if state.mid.len() > self.config.mid_term_capacity {
                        if let Some(i) = eviction_candidate(&state.mid, &self.config, now) {
                            let dropped = state.mid.remove(i);
                            outcome.mid_evicted = Some(dropped.id().to_string());
                        }
                    }
                }
            }
        }

        debug!(
            attempt_id = %attempt.id,
            short_term = state.short.len(),
            mid_term = state.mid.len(),
            evicted = ?outcome.evicted,
            "attempt recorded"
        );
        Ok(outcome)
    }

    /// Attach features extracted from an attempt's artifacts
    pub fn attach_features(&self, attempt_id: &str, features: ArtifactFeatures) -> ForgeResult<()> {
        let mut state = self.state()?;
        state.features.insert(attempt_id.to_string(), features);
        Ok(())
    }

    /// Entries ranked by tag overlap, then importance, then recency
    pub fn recall(&self, query: &RecallQuery, top_k: usize) -> ForgeResult<Vec<RecallResult>> {
        let state = self.state()?;
        let tiers = query.tiers.clone().unwrap_or_else(|| MemoryTier::ALL.to_vec());

        let mut results: Vec<RecallResult> = tiers
            .iter()
            .flat_map(|tier| state.tier(*tier))
            .filter_map(|entry| {
                let score = overlap_ratio(&query.tags, &state.entry_tags(entry));
                (score > 0.0).then(|| RecallResult {
                    entry: entry.clone(),
                    score,
                })
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(b.entry.importance.total_cmp(&a.entry.importance))
                .then(b.entry.created_at.cmp(&a.entry.created_at))
        });
        results.truncate(top_k);
        Ok(results)
    }

    /// Write an insight to the reflective tier and the store.
    ///
    /// An insight whose id is already present replaces it and counts as a
    /// reinforcement. The insight stays in memory even if the store write
    /// fails; the write is retried by the next consolidation pass.
    pub fn store_insight(&self, insight: Insight) -> ForgeResult<()> {
        let id = insight.id.clone();
        let write = self.store.save(&insight);
        {
            let mut state = self.state()?;
            let (confidence, at) = (insight.confidence, insight.created_at);
            let existing = state.reflective.iter_mut().find(|e| e.id() == id);
            match existing {
                Some(entry) => {
                    entry.payload = MemoryPayload::Insight(insight);
                    entry.base_importance = confidence;
                    entry.importance = confidence;
                    entry.last_reinforced_at = self.clock.now();
                }
                None => state.reflective.push(MemoryEntry::new(
                    MemoryTier::Reflective,
                    MemoryPayload::Insight(insight),
                    confidence,
                    at,
                )),
            }
            if write.is_err() {
                state.dirty.insert(id.clone());
            }
        }
        if let Err(e) = write {
            let err = ForgeError::consolidation(format!("insight {id} not persisted: {e}"));
            warn!(insight_id = %id, error = %err, "insight write deferred");
        }
        Ok(())
    }

    /// Run one consolidation pass: apply reuse outcomes, decay, promote,
    /// evict, then persist changed patterns and insights.
    ///
    /// Idempotent for a fixed clock.
    pub async fn consolidate(&self) -> ForgeResult<ConsolidationResult> {
        let _pass = self.consolidation.lock().await;
        let start = Instant::now();
        let now = self.clock.now();
        let mut result = ConsolidationResult::default();

        let pending_writes = {
            let mut state = self.state()?;

            // Reuse outcomes
            let reuse = std::mem::take(&mut state.pending_reuse);
            for (pattern_id, success) in reuse {
                let Some(entry) = state.pattern_mut(&pattern_id) else {
                    debug!(pattern_id = %pattern_id, "reuse outcome for unknown pattern dropped");
                    continue;
                };
                if let MemoryPayload::Pattern(pattern) = &mut entry.payload {
                    pattern.absorb_outcomes(u64::from(success), 1);
                    pattern.usage_count += 1;
                    pattern.updated_at = now;
                }
                reinforce(entry, &self.config, now);
                state.dirty.insert(pattern_id);
                result.reuse_applied += 1;
            }

            // Decay
            let TierState { mid, long, .. } = &mut *state;
            for entry in mid.iter_mut().chain(long.iter_mut()) {
                if apply_decay(entry, &self.config, now) {
                    result.decayed += 1;
                }
            }

            // Promotion
            let candidates: Vec<Candidate> = state
                .mid
                .iter()
                .filter_map(|entry| {
                    let attempt = entry.payload.as_attempt()?;
                    (!state.consolidated.contains(&attempt.id)).then(|| Candidate {
                        attempt: Arc::clone(attempt),
                        tags: state.entry_tags(entry),
                        created_at: entry.created_at,
                    })
                })
                .collect();
            for cluster in find_clusters(candidates, &self.config) {
                let (pattern_id, created) = self.promote(&mut state, &cluster, now);
                if created {
                    result.created_patterns.push(pattern_id);
                } else {
                    result.updated_patterns.push(pattern_id);
                }
            }

            // Eviction
            while state.mid.len() > self.config.mid_term_capacity {
                match eviction_candidate(&state.mid, &self.config, now) {
                    Some(i) => {
                        state.mid.remove(i);
                        result.evicted += 1;
                    }
                    None => break,
                }
            }

            // Drop features and claims nothing refers to any more
            let live: HashSet<String> = state
                .history
                .iter()
                .map(|a| a.id.clone())
                .chain(state.short.iter().chain(state.mid.iter()).map(|e| e.id().to_string()))
                .collect();
            state.features.retain(|id, _| live.contains(id));
            state.consolidated.retain(|id| live.contains(id));

            state.passes += 1;
            state.last_consolidation_at = Some(now);

            let dirty: Vec<MemoryPayload> = state
                .long
                .iter()
                .chain(state.reflective.iter())
                .filter(|e| state.dirty.contains(e.id()))
                .map(|e| e.payload.clone())
                .collect();
            dirty
        };

        // Persist outside the state lock
        let mut written = Vec::new();
        for payload in pending_writes {
            let id = payload.id().to_string();
            let write = match &payload {
                MemoryPayload::Pattern(p) => self.store.save(p),
                MemoryPayload::Insight(i) => self.store.save(i),
                MemoryPayload::Attempt(_) => continue,
            };
            match write {
                Ok(()) => written.push(id),
                Err(e) => {
                    let err = ForgeError::consolidation(format!("{id}: {e}"));
                    error!(record_id = %id, error = %err, "consolidation write failed, will retry");
                    result.persist_failures.push(id);
                }
            }
        }
        result.persisted = written.len();
        {
            let mut state = self.state()?;
            for id in &written {
                state.dirty.remove(id);
            }
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        if !result.created_patterns.is_empty() || !result.updated_patterns.is_empty() {
            info!(
                created = result.created_patterns.len(),
                updated = result.updated_patterns.len(),
                reuse_applied = result.reuse_applied,
                "memory consolidated"
            );
        } else {
            debug!(
                decayed = result.decayed,
                evicted = result.evicted,
                reuse_applied = result.reuse_applied,
                "memory consolidated"
            );
        }
        Ok(result)
    }

    /// Fold a cluster into a new or existing pattern. Returns (id, created).
    fn promote(&self, state: &mut TierState, cluster: &Cluster, now: DateTime<Utc>) -> (String, bool) {
        let ids = cluster.attempt_ids();
        let exemplar_features = cluster
            .exemplar()
            .and_then(|c| state.features.get(&c.attempt.id).cloned())
            .unwrap_or_default();
        let snippet: String = exemplar_features
            .snippet
            .as_deref()
            .unwrap_or_default()
            .chars()
            .take(SNIPPET_CHARS)
            .collect();
        let tech_stack: BTreeSet<String> = cluster
            .members
            .iter()
            .filter_map(|c| state.features.get(&c.attempt.id))
            .flat_map(|f| f.tech_stack.iter().cloned())
            .collect();
        let tags = cluster.tags();

        let id_source = if snippet.is_empty() { ids.join(",") } else { snippet.clone() };
        let snippet_id = format!("pat_{}", short_hash(&format!("{}\n{}", cluster.domain, id_source)));

        // Same snippet, or same domain with similar tags
        let existing = state.long.iter().position(|e| match &e.payload {
            MemoryPayload::Pattern(p) => {
                p.id == snippet_id
                    || (p.domain == cluster.domain
                        && forge_core::tags::jaccard(&p.tags, &tags) >= self.config.similarity_threshold)
            }
            _ => false,
        });

        state.mid.retain(|e| !ids.contains(&e.id().to_string()));
        state.consolidated.extend(ids.iter().cloned());

        let successes = cluster.successes() as u64;
        let total = cluster.members.len() as u64;

        if let Some(i) = existing {
            let entry = &mut state.long[i];
            let mut pattern_id = String::new();
            if let MemoryPayload::Pattern(p) = &mut entry.payload {
                p.absorb_outcomes(successes, total);
                p.usage_count += 1;
                p.tech_stack.extend(tech_stack);
                p.tags.extend(tags);
                p.source_attempts.extend(ids);
                if p.code_snippet.is_empty() {
                    p.code_snippet = snippet;
                }
                p.updated_at = now;
                pattern_id = p.id.clone();
            }
            reinforce(entry, &self.config, now);
            state.dirty.insert(pattern_id.clone());
            info!(pattern_id = %pattern_id, domain = %cluster.domain, members = total, "pattern updated");
            (pattern_id, false)
        } else {
            let mut pattern = Pattern {
                id: snippet_id.clone(),
                domain: cluster.domain.clone(),
                tags,
                code_snippet: snippet,
                tech_stack,
                success_rate: 0.0,
                usage_count: 0,
                evidence_count: 0,
                source_attempts: ids,
                created_at: now,
                updated_at: now,
            };
            pattern.absorb_outcomes(successes, total);
            state.long.push(MemoryEntry::new(
                MemoryTier::LongTerm,
                MemoryPayload::Pattern(pattern),
                PATTERN_BASE_IMPORTANCE,
                now,
            ));
            state.dirty.insert(snippet_id.clone());
            info!(pattern_id = %snippet_id, domain = %cluster.domain, members = total, "pattern created");
            (snippet_id, true)
        }
    }

    /// Counts per tier
    pub fn stats(&self) -> ForgeResult<MemoryStats> {
        let state = self.state()?;
        Ok(MemoryStats {
            short_term: state.short.len(),
            mid_term: state.mid.len(),
            long_term: state.long.len(),
            reflective: state.reflective.len(),
            history: state.history.len(),
            pending_reuse: state.pending_reuse.len(),
            dirty: state.dirty.len(),
            consolidated: state.consolidated.len(),
            consolidation_passes: state.passes,
            last_consolidation_at: state.last_consolidation_at,
        })
    }

    pub fn snapshot(&self) -> ForgeResult<MemorySnapshot> {
        let state = self.state()?;
        let entries = MemoryTier::ALL
            .iter()
            .flat_map(|tier| state.tier(*tier))
            .map(|e| SnapshotEntry {
                tier: e.tier,
                id: e.id().to_string(),
                base_importance: e.base_importance,
                importance: e.importance,
                last_reinforced_at: e.last_reinforced_at,
            })
            .collect();
        Ok(MemorySnapshot {
            entries,
            patterns: state.long.iter().filter_map(|e| e.payload.as_pattern().cloned()).collect(),
            pending_reuse: state.pending_reuse.len(),
            dirty: state.dirty.clone(),
        })
    }

    /// Entries of one tier, in tier order
    pub fn entries(&self, tier: MemoryTier) -> ForgeResult<Vec<MemoryEntry>> {
        let state = self.state()?;
        Ok(state.tier(tier).cloned().collect())
    }

    pub fn patterns(&self) -> ForgeResult<Vec<Pattern>> {
        let state = self.state()?;
        Ok(state.long.iter().filter_map(|e| e.payload.as_pattern().cloned()).collect())
    }

    /// Reflective insights, oldest first
    pub fn insights(&self) -> ForgeResult<Vec<Insight>> {
        let state = self.state()?;
        Ok(state
            .reflective
            .iter()
            .filter_map(|e| match &e.payload {
                MemoryPayload::Insight(i) => Some(i.clone()),
                _ => None,
            })
            .collect())
    }

    /// The last `limit` attempts, oldest first
    pub fn history(&self, limit: usize) -> ForgeResult<Vec<Arc<Attempt>>> {
        let state = self.state()?;
        let skip = state.history.len().saturating_sub(limit);
        Ok(state.history.iter().skip(skip).cloned().collect())
    }

    /// The last `limit` attempts with their artifact features, oldest first
    pub fn observations(&self, limit: usize) -> ForgeResult<Vec<Observation>> {
        let state = self.state()?;
        let skip = state.history.len().saturating_sub(limit);
        Ok(state
            .history
            .iter()
            .skip(skip)
            .map(|a| Observation {
                attempt: Arc::clone(a),
                features: state
                    .features
                    .get(&a.id)
                    .map(|f| f.features.clone())
                    .unwrap_or_default(),
            })
            .collect())
    }
}
