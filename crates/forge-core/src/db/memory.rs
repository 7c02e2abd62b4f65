//! In-process document store.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

use super::{Collection, Document, DocumentStore};
use crate::error::{Error, Result};

/// Document store backed by in-memory maps.
///
/// Thread-safe via an internal RwLock.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<Collection, BTreeMap<String, Document>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn by_rank(mut docs: Vec<&Document>) -> Vec<serde_json::Value> {
    docs.sort_by(|a, b| b.rank.total_cmp(&a.rank).then_with(|| a.id.cmp(&b.id)));
    docs.into_iter().map(|d| d.body.clone()).collect()
}

impl DocumentStore for InMemoryStore {
    fn put(&self, collection: Collection, doc: Document) -> Result<()> {
        let mut collections = self.collections.write().map_err(|_| Error::LockPoisoned)?;
        collections
            .entry(collection)
            .or_default()
            .insert(doc.id.clone(), doc);
        Ok(())
    }

    fn get(&self, collection: Collection, id: &str) -> Result<Option<serde_json::Value>> {
        let collections = self.collections.read().map_err(|_| Error::LockPoisoned)?;
        Ok(collections
            .get(&collection)
            .and_then(|docs| docs.get(id))
            .map(|d| d.body.clone()))
    }

    fn delete(&self, collection: Collection, id: &str) -> Result<bool> {
        let mut collections = self.collections.write().map_err(|_| Error::LockPoisoned)?;
        Ok(collections
            .get_mut(&collection)
            .and_then(|docs| docs.remove(id))
            .is_some())
    }

    fn list(&self, collection: Collection) -> Result<Vec<serde_json::Value>> {
        let collections = self.collections.read().map_err(|_| Error::LockPoisoned)?;
        Ok(collections
            .get(&collection)
            .map(|docs| docs.values().map(|d| d.body.clone()).collect())
            .unwrap_or_default())
    }

    fn query_by_tags(
        &self,
        collection: Collection,
        tags: &[String],
        min_overlap: usize,
    ) -> Result<Vec<serde_json::Value>> {
        let collections = self.collections.read().map_err(|_| Error::LockPoisoned)?;
        let Some(docs) = collections.get(&collection) else {
            return Ok(Vec::new());
        };

        let wanted: HashSet<&str> = tags.iter().map(String::as_str).collect();
        let matching = docs
            .values()
            .filter(|doc| {
                let overlap = doc
                    .tags
                    .iter()
                    .filter(|t| wanted.contains(t.as_str()))
                    .collect::<HashSet<_>>()
                    .len();
                overlap >= min_overlap
            })
            .collect();

        Ok(by_rank(matching))
    }

    fn count(&self, collection: Collection) -> Result<usize> {
        let collections = self.collections.read().map_err(|_| Error::LockPoisoned)?;
        Ok(collections.get(&collection).map(BTreeMap::len).unwrap_or(0))
    }
}
