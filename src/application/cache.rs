//! Process-local TTL cache with pattern invalidation.
//!
//! Services memoize read paths through [`TtlCache::get_or_set`] and
//! invalidate on writes with [`TtlCache::delete`] /
//! [`TtlCache::delete_pattern`]. Keys follow the `"<resource>:<selector>"`
//! convention so a resource can clear its own listing keys without
//! touching a sibling's.
//!
//! The map is guarded by a single mutex: operations are short and
//! synchronous, and the guard is never held across an await point. The
//! periodic sweep (spawned by the binary) bounds growth from keys that
//! expire without ever being read again.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use metrics::counter;
use regex::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

/// Cache introspection snapshot, exposed for diagnostics only.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub keys: Vec<String>,
}

pub struct TtlCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    default_ttl: Duration,
}

impl TtlCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Store `value` under `key`, overwriting any previous entry.
    pub fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        self.set_at(key, value, ttl, Instant::now());
    }

    fn set_at(&self, key: &str, value: Value, ttl: Option<Duration>, now: Instant) {
        let expires_at = now + ttl.unwrap_or(self.default_ttl);
        let mut entries = self.lock();
        entries.insert(key.to_string(), CacheEntry { value, expires_at });
    }

    /// Fetch the value for `key` if present and fresh. Expired entries are
    /// removed as a side effect of the lookup.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.get_at(key, Instant::now())
    }

    fn get_at(&self, key: &str, now: Instant) -> Option<Value> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => {
                counter!("expohall_cache_hit_total").increment(1);
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                counter!("expohall_cache_miss_total").increment(1);
                None
            }
            None => {
                counter!("expohall_cache_miss_total").increment(1);
                None
            }
        }
    }

    /// Expiry-aware membership test with the same eviction side effect
    /// as [`TtlCache::get`].
    pub fn has(&self, key: &str) -> bool {
        self.has_at(key, Instant::now())
    }

    fn has_at(&self, key: &str, now: Instant) -> bool {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => true,
            Some(_) => {
                entries.remove(key);
                false
            }
            None => false,
        }
    }

    /// Read-through memoization: return the cached value for `key`, or run
    /// `producer`, store its result, and return it. A failing producer
    /// caches nothing and its error propagates unchanged.
    pub async fn get_or_set<T, F, Fut, E>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        producer: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.get(key) {
            match serde_json::from_value(cached) {
                Ok(value) => return Ok(value),
                // A shape change across deploys makes the entry unreadable;
                // fall through and recompute.
                Err(err) => {
                    warn!(target = "expohall::cache", key, error = %err, "discarding undecodable cache entry");
                    self.delete(key);
                }
            }
        }

        let value = producer().await?;

        match serde_json::to_value(&value) {
            Ok(serialized) => self.set(key, serialized, ttl),
            Err(err) => {
                warn!(target = "expohall::cache", key, error = %err, "value not cacheable, skipping store");
            }
        }

        Ok(value)
    }

    /// Remove one entry unconditionally. Absent keys are not an error.
    pub fn delete(&self, key: &str) {
        self.lock().remove(key);
    }

    /// Delete every key matching a glob where `*` matches any substring.
    /// Returns the number of removed entries.
    pub fn delete_pattern(&self, pattern: &str) -> usize {
        let regex = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");

        let Ok(regex) = Regex::new(&format!("^{regex}$")) else {
            return 0;
        };

        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|key, _| !regex.is_match(key));
        before - entries.len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.lock();
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        CacheStats {
            size: entries.len(),
            keys,
        }
    }

    /// Drop every expired entry; run periodically by the binary.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    fn sweep_at(&self, now: Instant) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        let cleaned = before - entries.len();
        if cleaned > 0 {
            counter!("expohall_cache_sweep_evict_total").increment(cleaned as u64);
        }
        cleaned
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        // A poisoned guard means another thread panicked mid-operation;
        // the map itself is still structurally sound for cache purposes.
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    fn cache() -> TtlCache {
        TtlCache::new(Duration::from_secs(300))
    }

    #[test]
    fn set_then_get_returns_value() {
        let cache = cache();
        cache.set("booth:1", json!({"number": "A01"}), None);
        assert_eq!(cache.get("booth:1"), Some(json!({"number": "A01"})));
    }

    #[test]
    fn expired_entry_is_absent_and_removed() {
        let cache = cache();
        let now = Instant::now();
        cache.set_at("booth:1", json!(1), Some(Duration::from_secs(60)), now);

        let later = now + Duration::from_secs(61);
        assert_eq!(cache.get_at("booth:1", later), None);
        assert!(!cache.has_at("booth:1", later));
        assert_eq!(cache.stats().size, 0);
    }

    #[test]
    fn entry_is_fresh_just_before_expiry() {
        let cache = cache();
        let now = Instant::now();
        cache.set_at("booth:1", json!(1), Some(Duration::from_secs(60)), now);

        let almost = now + Duration::from_secs(59);
        assert!(cache.has_at("booth:1", almost));
        assert_eq!(cache.get_at("booth:1", almost), Some(json!(1)));
    }

    #[tokio::test]
    async fn get_or_set_invokes_producer_once() {
        let cache = cache();
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let value: u32 = cache
                .get_or_set("exhibitor:count", None, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, std::convert::Infallible>(42)
                })
                .await
                .unwrap();
            assert_eq!(value, 42);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn get_or_set_does_not_cache_producer_failure() {
        let cache = cache();

        let result: Result<u32, &str> = cache
            .get_or_set("exhibitor:broken", None, || async { Err("db down") })
            .await;
        assert_eq!(result, Err("db down"));
        assert!(!cache.has("exhibitor:broken"));

        let value: u32 = cache
            .get_or_set("exhibitor:broken", None, || async {
                Ok::<_, &str>(7)
            })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn delete_pattern_only_touches_matching_prefix() {
        let cache = cache();
        cache.set("booth:list:1", json!(1), None);
        cache.set("booth:area:2", json!(2), None);
        cache.set("exhibitor:search:3", json!(3), None);

        let removed = cache.delete_pattern("booth:*");
        assert_eq!(removed, 2);
        assert!(!cache.has("booth:list:1"));
        assert!(!cache.has("booth:area:2"));
        assert!(cache.has("exhibitor:search:3"));
    }

    #[test]
    fn delete_pattern_treats_regex_metacharacters_literally() {
        let cache = cache();
        cache.set("booth:list:{\"q\":\"a+b\"}", json!(1), None);
        cache.set("booth:list:other", json!(2), None);

        assert_eq!(cache.delete_pattern("booth:list:{\"q\":\"a+b\"}"), 1);
        assert!(cache.has("booth:list:other"));
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let cache = cache();
        let now = Instant::now();
        cache.set_at("a", json!(1), Some(Duration::from_secs(10)), now);
        cache.set_at("b", json!(2), Some(Duration::from_secs(600)), now);

        let cleaned = cache.sweep_at(now + Duration::from_secs(11));
        assert_eq!(cleaned, 1);
        let stats = cache.stats();
        assert_eq!(stats.size, 1);
        assert_eq!(stats.keys, vec!["b".to_string()]);
    }

    #[test]
    fn clear_empties_everything() {
        let cache = cache();
        cache.set("a", json!(1), None);
        cache.set("b", json!(2), None);
        cache.clear();
        assert_eq!(cache.stats().size, 0);
    }
}
