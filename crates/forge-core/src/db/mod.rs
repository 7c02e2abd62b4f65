//! Document store for Forge records.
//!
//! Records are JSON documents keyed by (collection, id), with an optional tag
//! set and a rank (success rate for patterns) so the store can answer
//! "entries with tag overlap ≥ k, ordered by success_rate desc".
//!
//! Two backends:
//! 1. [`InMemoryStore`] - default, process lifetime only
//! 2. [`SqliteStore`] - rusqlite, when a database path is configured

mod memory;
#[cfg(feature = "db")]
mod sqlite;

pub use memory::InMemoryStore;
#[cfg(feature = "db")]
pub use sqlite::SqliteStore;

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;

use crate::error::Result;
use crate::types::{Attempt, Insight, Pattern, StrategyStat};

/// Logical collection a record lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Attempts,
    Patterns,
    Insights,
    CurriculumProgress,
    StrategyStats,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Attempts => "attempts",
            Self::Patterns => "patterns",
            Self::Insights => "insights",
            Self::CurriculumProgress => "curriculum_progress",
            Self::StrategyStats => "strategy_stats",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored document
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub tags: Vec<String>,
    pub rank: f64,
    pub body: serde_json::Value,
}

/// Backend-agnostic CRUD plus the tag-overlap query.
pub trait DocumentStore: Send + Sync {
    /// Insert or replace a document
    fn put(&self, collection: Collection, doc: Document) -> Result<()>;

    fn get(&self, collection: Collection, id: &str) -> Result<Option<serde_json::Value>>;

    /// Returns true if a document was removed
    fn delete(&self, collection: Collection, id: &str) -> Result<bool>;

    /// All documents in a collection, ordered by id
    fn list(&self, collection: Collection) -> Result<Vec<serde_json::Value>>;

    /// Documents sharing at least `min_overlap` of `tags`, ordered by rank
    /// descending then id ascending.
    fn query_by_tags(
        &self,
        collection: Collection,
        tags: &[String],
        min_overlap: usize,
    ) -> Result<Vec<serde_json::Value>>;

    fn count(&self, collection: Collection) -> Result<usize>;
}

/// A type that can be persisted in a [`DocumentStore`]
pub trait Record: Serialize + DeserializeOwned {
    const COLLECTION: Collection;

    fn record_id(&self) -> String;

    fn record_tags(&self) -> Vec<String> {
        Vec::new()
    }

    fn rank(&self) -> f64 {
        0.0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Typed helpers
// ─────────────────────────────────────────────────────────────────────────────

impl<'a> dyn DocumentStore + 'a {
    /// Persist a record, replacing any previous version
    pub fn save<R: Record>(&self, record: &R) -> Result<()> {
        let doc = Document {
            id: record.record_id(),
            tags: record.record_tags(),
            rank: record.rank(),
            body: serde_json::to_value(record)?,
        };
        self.put(R::COLLECTION, doc)
    }

    pub fn load<R: Record>(&self, id: &str) -> Result<Option<R>> {
        self.get(R::COLLECTION, id)?
            .map(|v| serde_json::from_value(v).map_err(Into::into))
            .transpose()
    }

    pub fn load_all<R: Record>(&self) -> Result<Vec<R>> {
        self.list(R::COLLECTION)?
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(Into::into))
            .collect()
    }

    pub fn remove<R: Record>(&self, id: &str) -> Result<bool> {
        self.delete(R::COLLECTION, id)
    }

    /// Patterns with tag overlap ≥ `min_overlap`, best success rate first
    pub fn query_patterns(&self, tags: &BTreeSet<String>, min_overlap: usize) -> Result<Vec<Pattern>> {
        let tags: Vec<String> = tags.iter().cloned().collect();
        self.query_by_tags(Collection::Patterns, &tags, min_overlap)?
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(Into::into))
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Record implementations
// ─────────────────────────────────────────────────────────────────────────────

impl Record for Attempt {
    const COLLECTION: Collection = Collection::Attempts;

    fn record_id(&self) -> String {
        self.id.clone()
    }

    fn record_tags(&self) -> Vec<String> {
        self.tags.iter().cloned().collect()
    }

    fn rank(&self) -> f64 {
        self.quality_score / 100.0
    }
}

impl Record for Pattern {
    const COLLECTION: Collection = Collection::Patterns;

    fn record_id(&self) -> String {
        self.id.clone()
    }

    fn record_tags(&self) -> Vec<String> {
        self.tags.iter().cloned().collect()
    }

    fn rank(&self) -> f64 {
        self.success_rate
    }
}

impl Record for Insight {
    const COLLECTION: Collection = Collection::Insights;

    fn record_id(&self) -> String {
        self.id.clone()
    }

    fn record_tags(&self) -> Vec<String> {
        self.tags.iter().cloned().collect()
    }

    fn rank(&self) -> f64 {
        self.confidence
    }
}

impl Record for StrategyStat {
    const COLLECTION: Collection = Collection::StrategyStats;

    fn record_id(&self) -> String {
        self.key()
    }

    fn rank(&self) -> f64 {
        self.success_rate
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::Utc;

    pub fn pattern(id: &str, tags: &[&str], success_rate: f64) -> Pattern {
        let now = Utc::now();
        Pattern {
            id: id.into(),
            domain: "ui".into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            code_snippet: "<button>ok</button>".into(),
            tech_stack: BTreeSet::new(),
            success_rate,
            usage_count: 0,
            evidence_count: 3,
            source_attempts: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    /// Shared behavioural checks run against every backend
    pub fn exercise_store(store: &dyn DocumentStore) {
        store.save(&pattern("p-low", &["form", "button"], 0.4)).unwrap();
        store.save(&pattern("p-high", &["form", "validation"], 0.9)).unwrap();
        store.save(&pattern("p-other", &["chart"], 1.0)).unwrap();

        let query: BTreeSet<String> = ["form", "validation"].iter().map(|s| s.to_string()).collect();

        let one = store.query_patterns(&query, 1).unwrap();
        let ids: Vec<&str> = one.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p-high", "p-low"]);

        let two = store.query_patterns(&query, 2).unwrap();
        assert_eq!(two.len(), 1);
        assert_eq!(two[0].id, "p-high");

        // Replacing a document updates its tags and rank
        store.save(&pattern("p-low", &["chart"], 0.95)).unwrap();
        let one = store.query_patterns(&query, 1).unwrap();
        assert_eq!(one.len(), 1);

        let loaded: Option<Pattern> = store.load("p-low").unwrap();
        assert_eq!(loaded.unwrap().success_rate, 0.95);
        assert_eq!(store.count(Collection::Patterns).unwrap(), 3);

        let all: Vec<Pattern> = store.load_all().unwrap();
        let ids: Vec<&str> = all.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p-high", "p-low", "p-other"]);

        assert!(store.remove::<Pattern>("p-other").unwrap());
        assert!(!store.remove::<Pattern>("p-other").unwrap());
        assert!(store.load::<Pattern>("p-other").unwrap().is_none());

        // min_overlap of zero returns everything by rank
        let everything = store.query_patterns(&BTreeSet::new(), 0).unwrap();
        let ids: Vec<&str> = everything.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p-low", "p-high"]);
    }
}
