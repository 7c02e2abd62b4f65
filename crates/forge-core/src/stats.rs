//! Strategy statistics store.
//!
//! One running-statistics row per (strategy, domain). Rows are created on
//! first use and live behind their own mutex, so writers to the same key are
//! serialized while readers of other keys never wait on them.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::{Strategy, StrategyStat, clamp_quality};

/// Smallest elapsed time used when computing quality per second
const MIN_ELAPSED_SECS: f64 = 0.001;

type Key = (Strategy, String);

#[derive(Default)]
pub struct StrategyStatsStore {
    rows: RwLock<HashMap<Key, Arc<Mutex<StrategyStat>>>>,
}

impl StrategyStatsStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn row(&self, strategy: Strategy, domain: &str) -> Result<Arc<Mutex<StrategyStat>>> {
        let key = (strategy, domain.to_string());
        if let Some(row) = self.rows.read().map_err(|_| Error::LockPoisoned)?.get(&key) {
            return Ok(Arc::clone(row));
        }
        let mut rows = self.rows.write().map_err(|_| Error::LockPoisoned)?;
        Ok(Arc::clone(rows.entry(key).or_insert_with(|| {
            Arc::new(Mutex::new(StrategyStat::empty(strategy, domain)))
        })))
    }

    /// Fold one outcome into the row with incremental means
    pub fn record(
        &self,
        strategy: Strategy,
        domain: &str,
        success: bool,
        quality: f64,
        elapsed_secs: f64,
    ) -> Result<StrategyStat> {
        let row = self.row(strategy, domain)?;
        let mut stat = row.lock().map_err(|_| Error::LockPoisoned)?;

        let quality = clamp_quality(quality);
        let elapsed = elapsed_secs.max(0.0);
        let per_time = quality / elapsed.max(MIN_ELAPSED_SECS);

        stat.usage_count += 1;
        let n = stat.usage_count as f64;
        let outcome = if success { 1.0 } else { 0.0 };
        stat.success_rate += (outcome - stat.success_rate) / n;
        stat.avg_quality += (quality - stat.avg_quality) / n;
        stat.avg_quality_per_time += (per_time - stat.avg_quality_per_time) / n;
        stat.avg_elapsed_secs += (elapsed - stat.avg_elapsed_secs) / n;
        stat.updated_at = Some(Utc::now());

        debug!(
            strategy = %strategy,
            domain,
            usage_count = stat.usage_count,
            success_rate = stat.success_rate,
            "strategy outcome recorded"
        );
        Ok(stat.clone())
    }

    /// Current row, or an empty one if the pair has never been used
    pub fn get(&self, strategy: Strategy, domain: &str) -> Result<StrategyStat> {
        let key = (strategy, domain.to_string());
        let rows = self.rows.read().map_err(|_| Error::LockPoisoned)?;
        match rows.get(&key) {
            Some(row) => Ok(row.lock().map_err(|_| Error::LockPoisoned)?.clone()),
            None => Ok(StrategyStat::empty(strategy, domain)),
        }
    }

    /// One row per strategy for a domain, in strategy order
    pub fn for_domain(&self, domain: &str) -> Result<Vec<StrategyStat>> {
        Strategy::ALL.iter().map(|s| self.get(*s, domain)).collect()
    }

    /// Every recorded row, ordered by domain then strategy
    pub fn all(&self) -> Result<Vec<StrategyStat>> {
        let rows = self.rows.read().map_err(|_| Error::LockPoisoned)?;
        let mut out = rows
            .values()
            .map(|row| row.lock().map(|s| s.clone()).map_err(|_| Error::LockPoisoned))
            .collect::<Result<Vec<_>>>()?;
        out.sort_by(|a, b| a.domain.cmp(&b.domain).then(a.strategy.cmp(&b.strategy)));
        Ok(out)
    }

    /// Load a persisted row, replacing whatever is in memory
    pub fn restore(&self, stat: StrategyStat) -> Result<()> {
        let row = self.row(stat.strategy, &stat.domain)?;
        let mut current = row.lock().map_err(|_| Error::LockPoisoned)?;
        *current = stat;
        Ok(())
    }

    /// Administrative reset of one row. Returns true if the row existed.
    pub fn reset(&self, strategy: Strategy, domain: &str) -> Result<bool> {
        let key = (strategy, domain.to_string());
        let removed = self
            .rows
            .write()
            .map_err(|_| Error::LockPoisoned)?
            .remove(&key)
            .is_some();
        if removed {
            info!(strategy = %strategy, domain, "strategy stats reset");
        }
        Ok(removed)
    }

    /// Administrative reset of every row
    pub fn reset_all(&self) -> Result<usize> {
        let mut rows = self.rows.write().map_err(|_| Error::LockPoisoned)?;
        let count = rows.len();
        rows.clear();
        info!(rows = count, "all strategy stats reset");
        Ok(count)
    }
}
