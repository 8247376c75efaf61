//! TTL-bounded key/value cache keyed by user name.
//!
//! Expired entries are dropped lazily on `get`; `evict_expired` only
//! reclaims memory.

use super::clock_impl::add_saturating;
use crate::domain_port::Clock;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

pub struct ExpiringCache<V> {
    name: &'static str,
    entries: DashMap<String, CacheEntry<V>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> ExpiringCache<V> {
    pub fn new(name: &'static str, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            name,
            entries: DashMap::new(),
            ttl,
            clock,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Store `value` until now + the configured TTL, replacing any entry.
    pub fn set(&self, key: &str, value: V) {
        let expires_at = add_saturating(self.clock.now(), self.ttl);
        self.set_until(key, value, expires_at);
    }

    /// Store `value` until an absolute deadline, replacing any entry.
    pub fn set_until(&self, key: &str, value: V, expires_at: DateTime<Utc>) {
        self.entries
            .insert(key.to_string(), CacheEntry { value, expires_at });
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        {
            let entry = self.entries.get(key)?;
            if now < entry.expires_at {
                return Some(entry.value.clone());
            }
        }
        // A concurrent `set` may have replaced the entry since the read.
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        None
    }

    /// Renew a live entry's TTL in place when `accept` approves its value.
    /// An absent or expired entry is never recreated.
    pub fn touch_if(&self, key: &str, accept: impl FnOnce(&V) -> bool) -> bool {
        let now = self.clock.now();
        {
            let Some(mut entry) = self.entries.get_mut(key) else {
                return false;
            };
            if now < entry.expires_at {
                if !accept(&entry.value) {
                    return false;
                }
                entry.expires_at = add_saturating(now, self.ttl);
                return true;
            }
        }
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        false
    }

    pub fn remove(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra_memory::ManualClock;

    fn cache(ttl_secs: u64) -> (Arc<ManualClock>, ExpiringCache<String>) {
        let clock = Arc::new(ManualClock::default());
        let cache = ExpiringCache::new("test", Duration::from_secs(ttl_secs), clock.clone());
        (clock, cache)
    }

    #[test]
    fn get_returns_value_before_expiry() {
        let (clock, cache) = cache(60);
        cache.set("alice", "s1".to_string());
        clock.advance(Duration::from_secs(59));
        assert_eq!(cache.get("alice").as_deref(), Some("s1"));
    }

    #[test]
    fn get_evicts_expired_entry() {
        let (clock, cache) = cache(60);
        cache.set("alice", "s1".to_string());
        clock.advance(Duration::from_secs(60));
        assert_eq!(cache.get("alice"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn set_overwrites_value_and_expiry() {
        let (clock, cache) = cache(60);
        cache.set("alice", "s1".to_string());
        clock.advance(Duration::from_secs(50));
        cache.set("alice", "s2".to_string());
        clock.advance(Duration::from_secs(50));
        assert_eq!(cache.get("alice").as_deref(), Some("s2"));
    }

    #[test]
    fn explicit_deadline_overrides_default() {
        let (clock, cache) = cache(60);
        let deadline = clock.now() + chrono::TimeDelta::seconds(5);
        cache.set_until("alice", "short".to_string(), deadline);
        clock.advance(Duration::from_secs(5));
        assert_eq!(cache.get("alice"), None);
    }

    #[test]
    fn past_deadline_is_never_served() {
        let (clock, cache) = cache(60);
        cache.set_until("alice", "gone".to_string(), clock.now());
        assert_eq!(cache.get("alice"), None);
    }

    #[test]
    fn evict_expired_keeps_live_entries() {
        let (clock, cache) = cache(60);
        cache.set_until("short", "a".to_string(), clock.now() + chrono::TimeDelta::seconds(1));
        cache.set("long", "b".to_string());
        clock.advance(Duration::from_secs(2));
        assert_eq!(cache.evict_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("long").is_some());
    }

    #[test]
    fn touch_if_slides_matching_entry() {
        let (clock, cache) = cache(60);
        cache.set("alice", "s1".to_string());
        clock.advance(Duration::from_secs(50));
        assert!(!cache.touch_if("alice", |v| v == "s2"));
        assert!(cache.touch_if("alice", |v| v == "s1"));
        clock.advance(Duration::from_secs(50));
        assert_eq!(cache.get("alice").as_deref(), Some("s1"));
    }

    #[test]
    fn touch_if_never_resurrects_removed_or_expired_entry() {
        let (clock, cache) = cache(60);
        cache.set("alice", "s1".to_string());
        cache.remove("alice");
        assert!(!cache.touch_if("alice", |_| true));
        assert!(cache.is_empty());

        cache.set("bob", "s2".to_string());
        clock.advance(Duration::from_secs(60));
        assert!(!cache.touch_if("bob", |_| true));
        assert!(cache.is_empty());
    }

    #[test]
    fn remove_and_clear() {
        let (_clock, cache) = cache(60);
        cache.set("alice", "a".to_string());
        cache.set("bob", "b".to_string());
        cache.remove("alice");
        assert_eq!(cache.get("alice"), None);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn concurrent_access_on_shared_keys() {
        let clock = Arc::new(ManualClock::default());
        let cache = Arc::new(ExpiringCache::new(
            "test",
            Duration::from_secs(60),
            clock as Arc<dyn Clock>,
        ));
        let tasks = (0..16).map(|i| {
            let cache = cache.clone();
            tokio::spawn(async move {
                for j in 0..200 {
                    let key = format!("user-{}", j % 8);
                    cache.set(&key, format!("{i}-{j}"));
                    if let Some(value) = cache.get(&key) {
                        assert!(value.contains('-'));
                    }
                }
            })
        });
        for result in futures_util::future::join_all(tasks).await {
            result.unwrap();
        }
        assert_eq!(cache.len(), 8);
    }
}
