use std::{
    num::NonZeroUsize,
    sync::atomic::{AtomicU64, Ordering},
};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use crate::{
    mark::StockView,
    types::{KeyError, Market, StockKey},
};

use super::{Query, SharedStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
    pub capacity: usize,
}

impl CacheStats {
    /// Hits over lookups, 0.0 before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// A materialized view and the store version it was built from.
#[derive(Debug, Clone)]
struct CachedView {
    version: u64,
    view: StockView,
}

/// Read-through LRU cache of [`StockView`]s over a [`SharedStore`].
///
/// Lock order is always store, then cache. A miss materializes and inserts
/// the view while holding the store read lock, and the engine invalidates
/// while holding the store write lock, so a view built from a superseded
/// version can never be inserted after its invalidation.
pub struct StockCache {
    store: SharedStore,
    entries: Mutex<LruCache<StockKey, CachedView>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl StockCache {
    pub fn new(store: SharedStore, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            store,
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Version of the published store.
    pub fn version(&self) -> u64 {
        self.store.read().version()
    }

    /// Resolves `code` and returns its view.
    pub fn get(&self, code: &str) -> Result<Option<StockView>, KeyError> {
        let key = StockKey::resolve(code)?;
        Ok(self.view(&key))
    }

    pub fn view(&self, key: &StockKey) -> Option<StockView> {
        if let Some(cached) = self.entries.lock().get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, version = cached.version, "cache hit");
            return Some(cached.view.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let store = self.store.read();
        let view = store.view(key)?;
        let version = store.version();
        self.entries.lock().put(
            key.clone(),
            CachedView {
                version,
                view: view.clone(),
            },
        );
        debug!(key = %key, version, "cache miss, view materialized");
        Some(view)
    }

    /// Store version the cached view of `key` was built from, if cached.
    /// Does not touch recency or hit counters.
    pub fn cached_version(&self, key: &StockKey) -> Option<u64> {
        self.entries.lock().peek(key).map(|cached| cached.version)
    }

    pub fn query(&self, query: &Query) -> Vec<StockView> {
        match query {
            Query::Keys(codes) => codes
                .iter()
                .filter_map(|code| match StockKey::resolve(code) {
                    Ok(key) => self.view(&key),
                    Err(err) => {
                        debug!(code = %code, error = %err, "skipping unresolvable code");
                        None
                    }
                })
                .collect(),
            Query::Keyword(keyword) => self.scan(|view| view.matches_keyword(keyword)),
        }
    }

    pub fn by_market(&self, market: Market) -> Vec<StockView> {
        self.scan(|view| view.market == market)
    }

    /// Views carrying a TIPWORD token that contains `word`.
    pub fn search_by_tipword(&self, word: &str) -> Vec<StockView> {
        self.scan(|view| view.tipword.tokens().iter().any(|t| t.contains(word)))
    }

    /// Drops cached views for `keys`.
    pub fn invalidate<'a>(&self, keys: impl IntoIterator<Item = &'a StockKey>) -> usize {
        let mut entries = self.entries.lock();
        keys.into_iter()
            .filter(|key| entries.pop(*key).is_some())
            .count()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            len: entries.len(),
            capacity: entries.cap().get(),
        }
    }

    // Scans bypass the cache.
    fn scan(&self, keep: impl Fn(&StockView) -> bool) -> Vec<StockView> {
        self.store
            .read()
            .views()
            .into_iter()
            .filter(|view| keep(view))
            .collect()
    }
}
