//! Two-tier cache of aggregated result sets.
//!
//! | Tier | Backing | Default TTL |
//! |------|---------|-------------|
//! | Local | In-memory map, tokio clock | 1 hour |
//! | Shared | [`SearchStore`] (DuckDB), wall clock | 7 days |
//!
//! Reads check local then shared; a shared hit is promoted into the local
//! tier. Writes reach the local tier before [`SearchCache::put`] returns and
//! the shared tier from a background task. Result sets with one entry or
//! fewer are never stored.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use repuestos_store::{SearchStore, StoredSearch};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::history::{relative_age, HistoryEntry};
use crate::{Category, CoreError, Repuesto, SearchQuery, UtcDateTime};

/// Cache key of a query: hash of its trimmed, lowercased piece and model.
pub fn cache_key(query: &SearchQuery) -> String {
    let digest = Sha256::digest(query.normalized_key_material().as_bytes());
    format!("search_{}", hex::encode(&digest[..16]))
}

/// Cached result set.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub query: SearchQuery,
    pub results: Vec<Repuesto>,
    pub stored_at: UtcDateTime,
}

/// Time-to-live of each tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub local_ttl: Duration,
    pub shared_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            local_ttl: Duration::from_secs(60 * 60),
            shared_ttl: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone)]
struct LocalEntry {
    entry: CacheEntry,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct CacheInner {
    map: HashMap<String, LocalEntry>,
}

impl CacheInner {
    fn get(&self, key: &str) -> Option<CacheEntry> {
        self.map
            .get(key)
            .filter(|local| Instant::now() < local.expires_at)
            .map(|local| local.entry.clone())
    }

    fn put(&mut self, entry: CacheEntry, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.map
            .insert(entry.key.clone(), LocalEntry { entry, expires_at });
    }

    fn remove_if_expired(&mut self, key: &str) {
        let now = Instant::now();
        if self
            .map
            .get(key)
            .is_some_and(|local| now >= local.expires_at)
        {
            self.map.remove(key);
        }
    }

    fn clear_expired(&mut self) -> usize {
        let now = Instant::now();
        let before = self.map.len();
        self.map.retain(|_, local| local.expires_at > now);
        before - self.map.len()
    }
}

/// Thread-safe two-tier search cache.
#[derive(Clone)]
pub struct SearchCache {
    inner: Arc<RwLock<CacheInner>>,
    shared: Option<SearchStore>,
    config: CacheConfig,
}

impl Default for SearchCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl SearchCache {
    /// Local tier only.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CacheInner::default())),
            shared: None,
            config,
        }
    }

    #[must_use]
    pub fn with_shared(mut self, store: SearchStore) -> Self {
        self.shared = Some(store);
        self
    }

    pub const fn config(&self) -> CacheConfig {
        self.config
    }

    pub const fn has_shared_tier(&self) -> bool {
        self.shared.is_some()
    }

    /// Fresh entry for `query`, if any tier has one.
    ///
    /// Shared-tier failures are logged and read as a miss.
    pub async fn get(&self, query: &SearchQuery) -> Option<CacheEntry> {
        let key = cache_key(query);
        if let Some(entry) = self.inner.read().await.get(&key) {
            debug!(%key, "local cache hit");
            return Some(entry);
        }
        self.inner.write().await.remove_if_expired(&key);

        let store = self.shared.clone()?;
        let entry = match load_shared(store, key.clone(), self.config.shared_ttl).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(error) => {
                warn!(%key, "shared cache read failed: {error}");
                return None;
            }
        };

        debug!(%key, "shared cache hit, promoting to local tier");
        let age = entry.stored_at.elapsed_until(UtcDateTime::now()).unsigned_abs();
        let remaining = self.config.shared_ttl.saturating_sub(age);
        self.inner
            .write()
            .await
            .put(entry.clone(), self.config.local_ttl.min(remaining));
        Some(entry)
    }

    /// Stores `results` for `query`. Returns whether the set was accepted.
    ///
    /// The shared-tier write runs in the background; its failure is only logged.
    pub async fn put(&self, query: &SearchQuery, results: &[Repuesto]) -> bool {
        let Some(entry) = self.store_local(query, results).await else {
            return false;
        };
        if let Some(store) = self.shared.clone() {
            tokio::spawn(async move {
                let key = entry.key.clone();
                if let Err(error) = save_shared(store, entry).await {
                    warn!(%key, "shared cache write failed: {error}");
                }
            });
        }
        true
    }

    /// Like [`put`](Self::put), but waits for the shared-tier write.
    ///
    /// # Errors
    /// Fails when the shared store rejects the write.
    pub async fn put_durable(
        &self,
        query: &SearchQuery,
        results: &[Repuesto],
    ) -> Result<bool, CoreError> {
        let Some(entry) = self.store_local(query, results).await else {
            return Ok(false);
        };
        if let Some(store) = self.shared.clone() {
            save_shared(store, entry).await?;
        }
        Ok(true)
    }

    async fn store_local(&self, query: &SearchQuery, results: &[Repuesto]) -> Option<CacheEntry> {
        if results.len() <= 1 {
            debug!(count = results.len(), "result set too small to cache");
            return None;
        }
        let entry = CacheEntry {
            key: cache_key(query),
            query: query.clone(),
            results: results.to_vec(),
            stored_at: UtcDateTime::now(),
        };
        self.inner
            .write()
            .await
            .put(entry.clone(), self.config.local_ttl);
        Some(entry)
    }

    /// Clears both tiers. Returns the number of entries removed from the
    /// shared tier when configured, otherwise from the local tier.
    ///
    /// # Errors
    /// Fails when the shared store cannot be purged; the local tier is cleared regardless.
    pub async fn purge_all(&self) -> Result<usize, CoreError> {
        let local = {
            let mut inner = self.inner.write().await;
            let count = inner.map.len();
            inner.map.clear();
            count
        };

        let shared = match self.shared.clone() {
            Some(store) => tokio::task::spawn_blocking(move || store.purge_all()).await??,
            None => 0,
        };
        debug!(local, shared, "purged search cache");
        Ok(if self.shared.is_some() { shared } else { local })
    }

    /// Removes expired entries from both tiers. Returns the number removed.
    ///
    /// # Errors
    /// Fails when the shared store cannot be swept.
    pub async fn clear_expired(&self) -> Result<usize, CoreError> {
        let local = self.inner.write().await.clear_expired();
        let shared = match self.shared.clone() {
            Some(store) => {
                let ttl = self.config.shared_ttl;
                let now_ms = UtcDateTime::now().unix_millis();
                tokio::task::spawn_blocking(move || store.purge_expired(ttl, now_ms)).await??
            }
            None => 0,
        };
        Ok(local + shared)
    }

    /// Most recent cached queries, newest first.
    ///
    /// Reads the shared tier when configured, otherwise the live local entries.
    ///
    /// # Errors
    /// Fails when the shared store cannot be read.
    pub async fn history(&self, limit: usize) -> Result<Vec<HistoryEntry>, CoreError> {
        let now = UtcDateTime::now();

        if let Some(store) = self.shared.clone() {
            let rows = tokio::task::spawn_blocking(move || store.recent(limit)).await??;
            return Ok(rows
                .into_iter()
                .map(|row| {
                    let stored_at = UtcDateTime::from_unix_millis(row.stored_at_ms);
                    HistoryEntry {
                        piece: row.piece,
                        model: row.model,
                        category: row.category.as_deref().and_then(Category::from_label),
                        result_count: row.result_count,
                        stored_at,
                        age: relative_age(stored_at, now),
                    }
                })
                .collect());
        }

        let inner = self.inner.read().await;
        let instant = Instant::now();
        let mut entries = inner
            .map
            .values()
            .filter(|local| instant < local.expires_at)
            .map(|local| &local.entry)
            .collect::<Vec<_>>();
        entries.sort_by(|a, b| b.stored_at.cmp(&a.stored_at));

        Ok(entries
            .into_iter()
            .take(limit)
            .map(|entry| HistoryEntry {
                piece: entry.query.piece().to_owned(),
                model: entry.query.model().to_owned(),
                category: entry.query.category(),
                result_count: entry.results.len(),
                stored_at: entry.stored_at,
                age: relative_age(entry.stored_at, now),
            })
            .collect())
    }

    /// Entries held by the local tier, including expired ones not yet removed.
    pub async fn local_len(&self) -> usize {
        self.inner.read().await.map.len()
    }
}

async fn save_shared(store: SearchStore, entry: CacheEntry) -> Result<(), CoreError> {
    let row = StoredSearch {
        cache_key: entry.key,
        piece: entry.query.piece().to_owned(),
        model: entry.query.model().to_owned(),
        category: entry.query.category().map(|category| category.as_str().to_owned()),
        result_count: entry.results.len(),
        results_json: serde_json::to_string(&entry.results)?,
        stored_at_ms: entry.stored_at.unix_millis(),
    };
    tokio::task::spawn_blocking(move || store.put(&row)).await??;
    Ok(())
}

async fn load_shared(
    store: SearchStore,
    key: String,
    ttl: Duration,
) -> Result<Option<CacheEntry>, CoreError> {
    let now_ms = UtcDateTime::now().unix_millis();
    let Some(row) = tokio::task::spawn_blocking(move || store.get_fresh(&key, ttl, now_ms)).await??
    else {
        return Ok(None);
    };

    let query = SearchQuery::new(&row.piece, &row.model)?
        .with_category(row.category.as_deref().and_then(Category::from_label));
    let results = serde_json::from_str::<Vec<Repuesto>>(&row.results_json)?;

    Ok(Some(CacheEntry {
        key: row.cache_key,
        query,
        results,
        stored_at: UtcDateTime::from_unix_millis(row.stored_at_ms),
    }))
}
