//! In-memory TTL cache with an injectable clock.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Time source for expiry decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for deterministic expiry.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let step = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += step;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A cached value with its expiry.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub expires_at: DateTime<Utc>,
    stamp: u64,
}

/// Keyed cache where every entry carries its own expiry.
#[derive(Debug)]
pub struct TtlCache<V> {
    entries: HashMap<String, CacheEntry<V>>,
    next_stamp: u64,
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next_stamp: 0,
        }
    }

    /// Fetch a live entry. Expired entries are treated as absent.
    pub fn get(&self, key: &str, now: DateTime<Utc>) -> Option<(V, u64)> {
        self.entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| (entry.value.clone(), entry.stamp))
    }

    /// Insert a value, returning a stamp that identifies this entry.
    pub fn insert(&mut self, key: String, value: V, expires_at: DateTime<Utc>) -> u64 {
        self.next_stamp += 1;
        let stamp = self.next_stamp;
        self.entries.insert(
            key,
            CacheEntry {
                value,
                expires_at,
                stamp,
            },
        );
        stamp
    }

    /// Move the expiry of an entry, but only if it is still the entry
    /// identified by `stamp`.
    pub fn expire_at(&mut self, key: &str, stamp: u64, expires_at: DateTime<Utc>) {
        if let Some(entry) = self.entries.get_mut(key) {
            if entry.stamp == stamp {
                entry.expires_at = expires_at;
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        self.entries.remove(key).map(|entry| entry.value)
    }

    /// Drop all expired entries, returning how many were removed.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_get_respects_expiry() {
        let mut cache = TtlCache::new();
        cache.insert("a".to_string(), 1, at(60));

        assert_eq!(cache.get("a", at(0)).map(|(v, _)| v), Some(1));
        assert_eq!(cache.get("a", at(59)).map(|(v, _)| v), Some(1));
        assert!(cache.get("a", at(60)).is_none());
    }

    #[test]
    fn test_expire_at_ignores_replaced_entry() {
        let mut cache = TtlCache::new();
        let old = cache.insert("a".to_string(), 1, at(60));
        cache.insert("a".to_string(), 2, at(60));

        cache.expire_at("a", old, at(1));
        assert_eq!(cache.get("a", at(30)).map(|(v, _)| v), Some(2));
    }

    #[test]
    fn test_purge_expired() {
        let mut cache = TtlCache::new();
        cache.insert("a".to_string(), 1, at(10));
        cache.insert("b".to_string(), 2, at(100));

        assert_eq!(cache.purge_expired(at(50)), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("b", at(50)).is_some());
    }

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new(at(0));
        clock.advance(Duration::from_secs(90));
        assert_eq!(clock.now(), at(90));
    }
}
