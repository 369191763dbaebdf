//! Process-wide embedding cache.
//!
//! Keys are SHA-256 hex digests of the source text. Entries expire after a
//! fixed TTL and are swept lazily before every read and write; there is no
//! background timer.

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Source of "now" for expiry decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Hashes text to the cache key.
pub fn cache_key(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

struct CacheEntry {
    embedding: Vec<f32>,
    inserted_at: Instant,
}

/// TTL cache of embedding vectors, safe to share across tasks.
pub struct EmbeddingCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl EmbeddingCache {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the embedding for `key` if it is younger than the TTL.
    pub fn get(&self, key: &str) -> Option<Vec<f32>> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        Self::sweep_locked(&mut entries, now, self.ttl);
        entries.get(key).map(|entry| entry.embedding.clone())
    }

    pub fn insert(&self, key: String, embedding: Vec<f32>) {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        Self::sweep_locked(&mut entries, now, self.ttl);
        entries.insert(
            key,
            CacheEntry {
                embedding,
                inserted_at: now,
            },
        );
    }

    /// Evicts every expired entry and returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        Self::sweep_locked(&mut entries, now, self.ttl)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sweep_locked(entries: &mut HashMap<String, CacheEntry>, now: Instant, ttl: Duration) -> usize {
        let before = entries.len();
        entries.retain(|_, entry| now.saturating_duration_since(entry.inserted_at) < ttl);
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, remaining = entries.len(), "swept expired embeddings");
        }
        removed
    }
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TTL)
    }
}

/// Clock that only moves when told to.
#[cfg(test)]
pub(crate) struct ManualClock {
    now: Mutex<Instant>,
}

#[cfg(test)]
impl ManualClock {
    pub(crate) fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub(crate) fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_with_clock(ttl: Duration) -> (EmbeddingCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (EmbeddingCache::with_clock(ttl, clock.clone()), clock)
    }

    #[test]
    fn test_cache_key_is_sha256_hex() {
        assert_eq!(
            cache_key("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(cache_key("abc"), cache_key("abc"));
        assert_ne!(cache_key("abc"), cache_key("abd"));
    }

    #[test]
    fn test_hit_within_ttl() {
        let (cache, clock) = cache_with_clock(Duration::from_secs(300));
        cache.insert(cache_key("hello"), vec![0.1, 0.2]);

        clock.advance(Duration::from_secs(299));
        assert_eq!(cache.get(&cache_key("hello")), Some(vec![0.1, 0.2]));
    }

    #[test]
    fn test_expired_entry_is_evicted_not_served() {
        let (cache, clock) = cache_with_clock(Duration::from_secs(300));
        cache.insert(cache_key("hello"), vec![0.1, 0.2]);

        clock.advance(Duration::from_secs(300));
        assert_eq!(cache.get(&cache_key("hello")), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_sweep_only_removes_expired() {
        let (cache, clock) = cache_with_clock(Duration::from_secs(10));
        cache.insert("old".to_string(), vec![1.0]);
        clock.advance(Duration::from_secs(6));
        cache.insert("new".to_string(), vec![2.0]);
        clock.advance(Duration::from_secs(5));

        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("new"), Some(vec![2.0]));
    }

    #[test]
    fn test_insert_sweeps_first() {
        let (cache, clock) = cache_with_clock(Duration::from_secs(1));
        cache.insert("a".to_string(), vec![1.0]);
        clock.advance(Duration::from_secs(2));
        cache.insert("b".to_string(), vec![2.0]);

        assert_eq!(cache.len(), 1);
    }
}
