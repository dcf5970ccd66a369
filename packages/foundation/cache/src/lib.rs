//! Fingerprint cache (C2): a bounded TTL key-value store used for dedup
//! keys, correlation counters, alert cooldowns, IOC lookups and LLM result
//! memoization.
//!
//! The spec treats this store as fail-open: callers must tolerate it being
//! unreachable without losing availability. [`Cache`] is therefore a trait
//! boundary — [`MemoryCache`] is the in-process implementation used today;
//! a future Redis-backed implementation is a drop-in replacement behind the
//! same trait, which is also why every method returns a [`CacheError`]
//! instead of panicking on internal lock contention.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache unreachable: {0}")]
    Unreachable(String),
}

#[async_trait::async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError>;
    /// Increments the integer counter at `key`, applying `ttl` only the
    /// first time the counter is created. Returns the post-increment value.
    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;
    /// Returns all live keys with the given prefix.
    async fn scan(&self, prefix: &str) -> Result<Vec<String>, CacheError>;
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map(|exp| exp > now).unwrap_or(true)
    }
}

/// In-process sharded map with lazy + background expiry.
pub struct MemoryCache {
    shards: Vec<Arc<RwLock<HashMap<String, Entry>>>>,
}

const SHARD_COUNT: usize = 16;

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        let shards = (0..SHARD_COUNT).map(|_| Arc::new(RwLock::new(HashMap::new()))).collect();
        Self { shards }
    }

    fn shard_for(&self, key: &str) -> &Arc<RwLock<HashMap<String, Entry>>> {
        let mut hash: u64 = 0xcbf29ce484222325;
        for b in key.as_bytes() {
            hash ^= *b as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        &self.shards[(hash as usize) % self.shards.len()]
    }

    /// Spawns a background task that periodically sweeps expired entries
    /// out of every shard. Not required for correctness (lookups already
    /// treat expired entries as absent) but keeps steady-state memory flat.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let now = Instant::now();
                for shard in &cache.shards {
                    let mut guard = shard.write().await;
                    guard.retain(|_, entry| entry.is_live(now));
                }
            }
        })
    }
}

#[async_trait::async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let shard = self.shard_for(key).read().await;
        let now = Instant::now();
        Ok(shard.get(key).filter(|e| e.is_live(now)).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = if ttl.is_zero() { None } else { Some(Instant::now() + ttl) };
        let mut shard = self.shard_for(key).write().await;
        shard.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, CacheError> {
        let mut shard = self.shard_for(key).write().await;
        let now = Instant::now();
        let live = shard.get(key).map(|e| e.is_live(now)).unwrap_or(false);
        if !live {
            shard.insert(
                key.to_string(),
                Entry { value: Value::from(1_i64), expires_at: Some(now + ttl) },
            );
            return Ok(1);
        }
        let entry = shard.get_mut(key).expect("checked live above");
        let next = entry.value.as_i64().unwrap_or(0) + 1;
        entry.value = Value::from(next);
        Ok(next)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut shard = self.shard_for(key).write().await;
        shard.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.get(key).await?.is_some())
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        let now = Instant::now();
        let mut out = Vec::new();
        for shard in &self.shards {
            let guard = shard.read().await;
            out.extend(
                guard
                    .iter()
                    .filter(|(k, e)| k.starts_with(prefix) && e.is_live(now))
                    .map(|(k, _)| k.clone()),
            );
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let cache = MemoryCache::new();
        cache.set("dedup:abc", Value::from(true), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("dedup:abc").await.unwrap(), Some(Value::from(true)));
    }

    #[tokio::test]
    async fn incr_sets_ttl_only_on_first_increment() {
        let cache = MemoryCache::new();
        assert_eq!(cache.incr("corr:rule:source", Duration::from_secs(60)).await.unwrap(), 1);
        assert_eq!(cache.incr("corr:rule:source", Duration::from_secs(60)).await.unwrap(), 2);
        assert_eq!(cache.incr("corr:rule:source", Duration::from_secs(60)).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn expired_entries_are_absent() {
        tokio::time::pause();
        let cache = MemoryCache::new();
        cache.set("k", Value::from(1), Duration::from_millis(10)).await.unwrap();
        tokio::time::advance(Duration::from_millis(20)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn scan_returns_only_matching_live_keys() {
        let cache = MemoryCache::new();
        cache.set("ioc:ip:1.2.3.4", Value::from(1), Duration::from_secs(60)).await.unwrap();
        cache.set("ioc:ip:5.6.7.8", Value::from(1), Duration::from_secs(60)).await.unwrap();
        cache.set("dedup:xyz", Value::from(1), Duration::from_secs(60)).await.unwrap();
        let mut keys = cache.scan("ioc:ip:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["ioc:ip:1.2.3.4", "ioc:ip:5.6.7.8"]);
    }
}
