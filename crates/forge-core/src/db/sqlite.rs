//! SQLite-backed document store.

use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;

use super::{Collection, Document, DocumentStore};
use crate::error::{Error, Result};

const SCHEMA: &str = include_str!("schema.sql");

/// Database connection wrapper.
///
/// Thread-safe via internal Mutex. All database operations acquire the lock.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(Error::Database)?;
        Self::with_connection(conn)
    }

    /// Private in-memory database, mostly for tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(Error::Database)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        tracing::debug!("document store schema applied");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Check database connectivity
    pub fn ping(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        conn.execute_batch("SELECT 1").map_err(Error::Database)
    }

    fn decode(bodies: Vec<String>) -> Result<Vec<serde_json::Value>> {
        bodies
            .iter()
            .map(|b| serde_json::from_str(b).map_err(Into::into))
            .collect()
    }
}

impl DocumentStore for SqliteStore {
    fn put(&self, collection: Collection, doc: Document) -> Result<()> {
        let mut conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let now = chrono::Utc::now().timestamp_millis();
        let body = serde_json::to_string(&doc.body)?;
        let tags: BTreeSet<&String> = doc.tags.iter().collect();

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO documents (collection, id, body, rank, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (collection, id) DO UPDATE SET
                body = excluded.body,
                rank = excluded.rank,
                updated_at = excluded.updated_at",
            params![collection.as_str(), doc.id, body, doc.rank, now],
        )?;
        tx.execute(
            "DELETE FROM document_tags WHERE collection = ?1 AND id = ?2",
            params![collection.as_str(), doc.id],
        )?;
        for tag in tags {
            tx.execute(
                "INSERT INTO document_tags (collection, id, tag) VALUES (?1, ?2, ?3)",
                params![collection.as_str(), doc.id, tag],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn get(&self, collection: Collection, id: &str) -> Result<Option<serde_json::Value>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection.as_str(), id],
                |row| row.get(0),
            )
            .optional()?;
        body.map(|b| serde_json::from_str(&b).map_err(Into::into))
            .transpose()
    }

    fn delete(&self, collection: Collection, id: &str) -> Result<bool> {
        let mut conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM document_tags WHERE collection = ?1 AND id = ?2",
            params![collection.as_str(), id],
        )?;
        let removed = tx.execute(
            "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection.as_str(), id],
        )?;
        tx.commit()?;
        Ok(removed > 0)
    }

    fn list(&self, collection: Collection) -> Result<Vec<serde_json::Value>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt =
            conn.prepare("SELECT body FROM documents WHERE collection = ?1 ORDER BY id")?;
        let bodies = stmt
            .query_map(params![collection.as_str()], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Self::decode(bodies)
    }

    fn query_by_tags(
        &self,
        collection: Collection,
        tags: &[String],
        min_overlap: usize,
    ) -> Result<Vec<serde_json::Value>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;

        if min_overlap == 0 {
            let mut stmt = conn.prepare(
                "SELECT body FROM documents WHERE collection = ?1 ORDER BY rank DESC, id ASC",
            )?;
            let bodies = stmt
                .query_map(params![collection.as_str()], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            return Self::decode(bodies);
        }

        let unique: BTreeSet<&String> = tags.iter().collect();
        if unique.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; unique.len()].join(", ");
        let sql = format!(
            "SELECT d.body FROM documents d
             JOIN document_tags t ON t.collection = d.collection AND t.id = d.id
             WHERE d.collection = ? AND t.tag IN ({placeholders})
             GROUP BY d.collection, d.id
             HAVING COUNT(*) >= ?
             ORDER BY d.rank DESC, d.id ASC"
        );

        let mut values: Vec<Value> = Vec::with_capacity(unique.len() + 2);
        values.push(Value::Text(collection.as_str().to_string()));
        values.extend(unique.into_iter().map(|t| Value::Text(t.clone())));
        values.push(Value::Integer(min_overlap as i64));

        let mut stmt = conn.prepare(&sql)?;
        let bodies = stmt
            .query_map(params_from_iter(values), |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Self::decode(bodies)
    }

    fn count(&self, collection: Collection) -> Result<usize> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1",
            params![collection.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::exercise_store;
    use crate::types::Pattern;

    #[test]
    fn test_sqlite_store_in_memory() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.ping().unwrap();
        exercise_store(&store);
    }

    #[test]
    fn test_sqlite_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forge.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            let store: &dyn DocumentStore = &store;
            store
                .save(&crate::db::test_support::pattern("p1", &["form"], 0.8))
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let store: &dyn DocumentStore = &store;
        let loaded: Option<Pattern> = store.load("p1").unwrap();
        assert_eq!(loaded.unwrap().success_rate, 0.8);
    }
}
