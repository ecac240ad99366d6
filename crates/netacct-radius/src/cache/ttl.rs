//! Expiring key/value store on DashMap
//!
//! Entries carry their own deadline. Reads check the deadline so an expired
//! entry is never returned, whether or not the janitor has swept it yet.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map_or(false, |deadline| now >= deadline)
    }
}

/// Concurrent cache with a per-cache default TTL
pub struct TtlCache<V> {
    name: &'static str,
    entries: DashMap<String, CacheEntry<V>>,
    default_ttl: Option<Duration>,
}

impl<V: Clone + Send + Sync + 'static> TtlCache<V> {
    /// Cache whose entries expire `ttl` after their last write
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            entries: DashMap::new(),
            default_ttl: Some(ttl),
        }
    }

    /// Cache whose entries live until removed
    pub fn without_expiry(name: &'static str) -> Self {
        Self {
            name,
            entries: DashMap::new(),
            default_ttl: None,
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let entry = self.entries.get(key)?;
        if !entry.is_expired(now) {
            return Some(entry.value.clone());
        }
        // Release the shard guard before removing
        drop(entry);
        self.entries.remove_if(key, |_, e| e.is_expired(now));
        None
    }

    /// Store under the default TTL, returning the live previous value
    pub fn set(&self, key: impl Into<String>, value: V) -> Option<V> {
        self.set_with(key, value, self.default_ttl)
    }

    pub fn set_with(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) -> Option<V> {
        let now = Instant::now();
        let entry = CacheEntry {
            value,
            expires_at: ttl.map(|ttl| now + ttl),
        };
        self.entries
            .insert(key.into(), entry)
            .filter(|previous| !previous.is_expired(now))
            .map(|previous| previous.value)
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        self.entries
            .remove(key)
            .map(|(_, entry)| entry)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value)
    }

    /// Drop every expired entry, returning how many went
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Entries currently stored, expired ones included until swept
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Start a background sweep every `interval`
    pub fn spawn_janitor(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            loop {
                ticker.tick().await;
                let removed = cache.sweep();
                if removed > 0 {
                    debug!(
                        cache = cache.name,
                        removed,
                        remaining = cache.len(),
                        "Swept expired entries"
                    );
                }
            }
        })
    }
}
