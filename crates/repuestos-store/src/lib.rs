//! # Repuestos Store
//!
//! Shared, persistent tier of the search cache, backed by `DuckDB`.
//!
//! Result sets are stored as serialized JSON alongside the normalized query
//! that produced them. Freshness is decided by the caller: reads take a
//! maximum age and a reference time, so stale rows are ignored without a
//! background sweep. [`SearchStore::purge_expired`] is available for an
//! explicit sweep.
//!
//! ## Table
//!
//! | Column | Description |
//! |--------|-------------|
//! | `cache_key` | Stable key derived from the normalized query |
//! | `piece` / `model` | Query as typed by the user (trimmed) |
//! | `category` | Optional category label |
//! | `result_count` | Number of listings in `results_json` |
//! | `results_json` | Serialized result set |
//! | `stored_at_ms` | Unix epoch milliseconds of the write |

pub mod pool;

use std::path::PathBuf;
use std::time::Duration;

use ::duckdb::params;
use thiserror::Error;
use tracing::debug;

pub use pool::ConnectionPool;

/// Errors raised by the shared store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid stored row: {0}")]
    InvalidRow(String),
}

/// Location and pool sizing for the store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub db_path: PathBuf,
    pub max_idle_connections: usize,
}

impl StoreConfig {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            max_idle_connections: 4,
        }
    }
}

/// A persisted result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSearch {
    pub cache_key: String,
    pub piece: String,
    pub model: String,
    pub category: Option<String>,
    pub result_count: usize,
    pub results_json: String,
    pub stored_at_ms: i64,
}

/// Row returned by history listings; the result payload is not loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSummary {
    pub cache_key: String,
    pub piece: String,
    pub model: String,
    pub category: Option<String>,
    pub result_count: usize,
    pub stored_at_ms: i64,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS search_cache (
    cache_key VARCHAR PRIMARY KEY,
    piece VARCHAR NOT NULL,
    model VARCHAR NOT NULL,
    category VARCHAR,
    result_count BIGINT NOT NULL,
    results_json VARCHAR NOT NULL,
    stored_at_ms BIGINT NOT NULL
);
";

/// `DuckDB`-backed store of cached search results.
#[derive(Clone)]
pub struct SearchStore {
    pool: ConnectionPool,
}

impl SearchStore {
    /// Opens (or creates) the store and applies the schema.
    ///
    /// # Errors
    /// Returns an error if the parent directory cannot be created or the
    /// database cannot be opened.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let pool = ConnectionPool::open(config.db_path.clone(), config.max_idle_connections)?;
        pool.with_connection(|conn| conn.execute_batch(SCHEMA))?;
        debug!(path = %config.db_path.display(), "opened search store");

        Ok(Self { pool })
    }

    /// Inserts or replaces the row for `entry.cache_key`.
    pub fn put(&self, entry: &StoredSearch) -> Result<(), StoreError> {
        let count = i64::try_from(entry.result_count)
            .map_err(|_| StoreError::InvalidRow(String::from("result_count overflows i64")))?;
        self.pool.with_connection(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO search_cache \
                 (cache_key, piece, model, category, result_count, results_json, stored_at_ms) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    entry.cache_key,
                    entry.piece,
                    entry.model,
                    entry.category,
                    count,
                    entry.results_json,
                    entry.stored_at_ms
                ],
            )?;
            Ok(())
        })
    }

    /// Returns the row for `cache_key` if it is younger than `max_age` at `now_ms`.
    pub fn get_fresh(
        &self,
        cache_key: &str,
        max_age: Duration,
        now_ms: i64,
    ) -> Result<Option<StoredSearch>, StoreError> {
        let oldest = oldest_allowed(max_age, now_ms);
        self.pool.with_connection(|conn| {
            let mut statement = conn.prepare(
                "SELECT cache_key, piece, model, category, result_count, results_json, stored_at_ms \
                 FROM search_cache WHERE cache_key = ? AND stored_at_ms > ?",
            )?;
            let mut rows = statement.query_map(params![cache_key, oldest], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, i64>(6)?,
                ))
            })?;

            let Some(row) = rows.next() else {
                return Ok(None);
            };
            let (cache_key, piece, model, category, count, results_json, stored_at_ms) = row?;
            Ok(Some(StoredSearch {
                cache_key,
                piece,
                model,
                category,
                result_count: to_count(count)?,
                results_json,
                stored_at_ms,
            }))
        })
    }

    /// Lists the newest rows first, at most `limit` of them.
    pub fn recent(&self, limit: usize) -> Result<Vec<StoredSummary>, StoreError> {
        let sql = format!(
            "SELECT cache_key, piece, model, category, result_count, stored_at_ms \
             FROM search_cache ORDER BY stored_at_ms DESC LIMIT {}",
            limit.max(1)
        );
        self.pool.with_connection(|conn| {
            let mut statement = conn.prepare(&sql)?;
            let rows = statement.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            })?;

            let mut summaries = Vec::new();
            for row in rows {
                let (cache_key, piece, model, category, count, stored_at_ms) = row?;
                summaries.push(StoredSummary {
                    cache_key,
                    piece,
                    model,
                    category,
                    result_count: to_count(count)?,
                    stored_at_ms,
                });
            }
            Ok(summaries)
        })
    }

    /// Deletes every row. Returns the number of rows removed.
    pub fn purge_all(&self) -> Result<usize, StoreError> {
        self.pool
            .with_connection(|conn| Ok(conn.execute("DELETE FROM search_cache", [])?))
    }

    /// Deletes rows whose age at `now_ms` has reached `max_age`.
    pub fn purge_expired(&self, max_age: Duration, now_ms: i64) -> Result<usize, StoreError> {
        let oldest = oldest_allowed(max_age, now_ms);
        self.pool.with_connection(|conn| {
            Ok(conn.execute("DELETE FROM search_cache WHERE stored_at_ms <= ?", params![oldest])?)
        })
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        self.pool.with_connection(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM search_cache", [], |row| row.get(0))?;
            to_count(count)
        })
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

fn oldest_allowed(max_age: Duration, now_ms: i64) -> i64 {
    let age_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
    now_ms.saturating_sub(age_ms)
}

fn to_count(value: i64) -> Result<usize, StoreError> {
    usize::try_from(value).map_err(|_| StoreError::InvalidRow(format!("negative count {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: Duration = Duration::from_secs(86_400);

    fn open_temp() -> (tempfile::TempDir, SearchStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SearchStore::open(&StoreConfig::new(dir.path().join("cache").join("s.duckdb")))
            .expect("open store");
        (dir, store)
    }

    fn entry(key: &str, stored_at_ms: i64) -> StoredSearch {
        StoredSearch {
            cache_key: key.to_owned(),
            piece: String::from("filtro de aceite"),
            model: String::from("Kia Rio 2018"),
            category: None,
            result_count: 2,
            results_json: String::from("[{},{}]"),
            stored_at_ms,
        }
    }

    #[test]
    fn fresh_row_is_returned_and_stale_row_is_ignored() {
        let (_dir, store) = open_temp();
        store.put(&entry("k1", 1_000)).expect("put");

        let hit = store.get_fresh("k1", DAY, 1_000 + 60_000).expect("get");
        assert_eq!(hit.map(|row| row.result_count), Some(2));

        let stale = store
            .get_fresh("k1", DAY, 1_000 + 8 * 86_400_000)
            .expect("get");
        assert!(stale.is_none());

        let boundary = store.get_fresh("k1", DAY, 1_000 + 86_400_000).expect("get");
        assert!(boundary.is_none());
    }

    #[test]
    fn put_replaces_existing_key() {
        let (_dir, store) = open_temp();
        store.put(&entry("k1", 1_000)).expect("put");
        let mut newer = entry("k1", 2_000);
        newer.result_count = 7;
        store.put(&newer).expect("replace");

        assert_eq!(store.len().expect("len"), 1);
        let row = store.get_fresh("k1", DAY, 2_000).expect("get").expect("row");
        assert_eq!(row.result_count, 7);
        assert_eq!(row.stored_at_ms, 2_000);
    }

    #[test]
    fn recent_lists_newest_first_and_respects_limit() {
        let (_dir, store) = open_temp();
        store.put(&entry("old", 1_000)).expect("put");
        store.put(&entry("mid", 2_000)).expect("put");
        store.put(&entry("new", 3_000)).expect("put");

        let keys = store
            .recent(2)
            .expect("recent")
            .into_iter()
            .map(|row| row.cache_key)
            .collect::<Vec<_>>();
        assert_eq!(keys, vec![String::from("new"), String::from("mid")]);
    }

    #[test]
    fn purge_all_and_purge_expired_remove_rows() {
        let (_dir, store) = open_temp();
        store.put(&entry("old", 0)).expect("put");
        store.put(&entry("new", 10 * 86_400_000)).expect("put");

        let removed = store
            .purge_expired(Duration::from_secs(7 * 86_400), 10 * 86_400_000)
            .expect("purge expired");
        assert_eq!(removed, 1);
        assert_eq!(store.purge_all().expect("purge all"), 1);
        assert!(store.is_empty().expect("is_empty"));
    }
}
