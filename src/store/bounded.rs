//! Bounded in-memory store backed by moka.
//!
//! Like [`super::MemoryStore`] but with a capacity limit: once
//! `max_capacity` entries are stored, moka evicts the least useful ones.
//! An evicted key is simply a miss on the next read.

use super::Store;
use crate::error::{Error, Result};
use crate::value::{CacheValue, Value};
use moka::future::{Cache as MokaCache, CacheBuilder as MokaCacheBuilder};
use moka::Expiry;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Configuration for [`BoundedStore`].
#[derive(Clone, Debug)]
pub struct BoundedConfig {
    /// Maximum number of entries kept.
    pub max_capacity: u64,
    /// Evict entries not read for this long, regardless of their TTL.
    pub time_to_idle: Option<Duration>,
}

impl Default for BoundedConfig {
    fn default() -> Self {
        BoundedConfig {
            max_capacity: 10_000,
            time_to_idle: None,
        }
    }
}

// Longest expiry handed to moka; its clock counts nanoseconds in a u64.
const MAX_EXPIRY: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

struct BoundedEntry {
    value: Value,
    ttl: Option<Duration>,
    expires_at: Option<Instant>,
}

impl BoundedEntry {
    fn new(value: Value, ttl: Duration) -> Self {
        // a TTL past the clock's range is stored as "never expires"
        let expires_at = if ttl.is_zero() {
            None
        } else {
            Instant::now().checked_add(ttl)
        };
        BoundedEntry {
            value,
            ttl: expires_at.map(|_| ttl.min(MAX_EXPIRY)),
            expires_at,
        }
    }

    // moka may hand back an entry in the instant before it evicts it
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Instant::now() >= exp)
    }
}

/// Per-entry expiry: each write carries its own TTL.
struct EntryTtl;

impl Expiry<String, Arc<BoundedEntry>> for EntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &Arc<BoundedEntry>,
        _created_at: Instant,
    ) -> Option<Duration> {
        entry.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Arc<BoundedEntry>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        entry.ttl
    }
}

/// Capacity-bounded async in-memory store.
///
/// moka handles capacity eviction, per-entry TTLs and the optional idle
/// timeout. Clones share the same cache.
///
/// # Example
///
/// ```ignore
/// use cacher::store::{BoundedConfig, BoundedStore};
///
/// let store = BoundedStore::new(BoundedConfig {
///     max_capacity: 1_000,
///     time_to_idle: Some(Duration::from_secs(600)),
/// })?;
/// let cacher = Cacher::new(store);
/// ```
#[derive(Clone)]
pub struct BoundedStore {
    cache: MokaCache<String, Arc<BoundedEntry>>,
}

impl BoundedStore {
    /// Create a new bounded store.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` if `max_capacity` is zero.
    pub fn new(config: BoundedConfig) -> Result<Self> {
        if config.max_capacity == 0 {
            return Err(Error::ConfigError(
                "Bounded store max_capacity must be greater than zero".to_string(),
            ));
        }

        let mut builder = MokaCacheBuilder::new(config.max_capacity).expire_after(EntryTtl);
        if let Some(idle) = config.time_to_idle {
            builder = builder.time_to_idle(idle);
        }

        info!(
            "✓ Bounded store initialized (capacity: {}, idle timeout: {:?})",
            config.max_capacity, config.time_to_idle
        );

        Ok(BoundedStore {
            cache: builder.build(),
        })
    }

    /// Approximate number of entries (moka updates this lazily).
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Apply pending evictions so `entry_count` is current.
    pub async fn sync(&self) {
        self.cache.run_pending_tasks().await;
    }
}

impl Store for BoundedStore {
    fn to_value<T: CacheValue>(&self, value: &T) -> Result<Value> {
        Ok(Value::object(value.clone()))
    }

    async fn load(&self, key: &str) -> Result<Option<Value>> {
        match self.cache.get(key).await {
            Some(entry) if entry.is_expired() => {
                self.cache.invalidate(key).await;
                debug!("✓ Bounded GET {} -> MISS (expired)", key);
                Ok(None)
            }
            Some(entry) => {
                debug!("✓ Bounded GET {} -> HIT", key);
                Ok(Some(entry.value.clone()))
            }
            None => {
                debug!("✓ Bounded GET {} -> MISS", key);
                Ok(None)
            }
        }
    }

    async fn store_many(&self, items: Vec<(String, Value)>, ttl: Duration) -> Result<()> {
        let count = items.len();

        for (key, value) in items {
            self.cache
                .insert(key, Arc::new(BoundedEntry::new(value, ttl)))
                .await;
        }

        debug!("✓ Bounded MSET {} keys (TTL: {:?})", count, ttl);
        Ok(())
    }

    async fn del(&self, keys: &[&str]) -> Result<i64> {
        let mut deleted = 0;
        for key in keys {
            if let Some(entry) = self.cache.remove(*key).await {
                if !entry.is_expired() {
                    deleted += 1;
                }
            }
        }

        debug!("✓ Bounded DEL {} keys ({} deleted)", keys.len(), deleted);
        Ok(deleted)
    }

    async fn clear_all(&self) -> Result<()> {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        warn!("⚠ Bounded CLEAR_ALL executed - all entries removed!");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn store(capacity: u64) -> BoundedStore {
        BoundedStore::new(BoundedConfig {
            max_capacity: capacity,
            time_to_idle: None,
        })
        .expect("Failed to create store")
    }

    #[test]
    fn test_bounded_rejects_zero_capacity() {
        let result = BoundedStore::new(BoundedConfig {
            max_capacity: 0,
            time_to_idle: None,
        });
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_bounded_set_get_del() {
        let store = store(100);
        let items = HashMap::from([("a".to_string(), 1_u32), ("b".to_string(), 2_u32)]);
        store
            .mset(&items, Duration::ZERO)
            .await
            .expect("Failed to set");

        let mut dst: Option<u32> = None;
        assert!(store.get("a", &mut dst).await.expect("Failed to get"));
        assert_eq!(dst, Some(1));

        let deleted = store.del(&["a", "b", "c"]).await.expect("Failed to delete");
        assert_eq!(deleted, 2);

        let mut dst: Option<u32> = None;
        assert!(!store.get("a", &mut dst).await.expect("Failed to get"));
    }

    #[tokio::test]
    async fn test_bounded_ttl_expiration() {
        let store = store(100);
        let items = HashMap::from([("a".to_string(), 1_u32)]);
        store
            .mset(&items, Duration::from_millis(30))
            .await
            .expect("Failed to set");

        tokio::time::sleep(Duration::from_millis(80)).await;

        let mut dst: Option<u32> = None;
        assert!(!store.get("a", &mut dst).await.expect("Failed to get"));
        assert_eq!(store.del(&["a"]).await.expect("Failed to delete"), 0);
    }

    #[tokio::test]
    async fn test_bounded_evicts_over_capacity() {
        let store = store(10);
        let items: HashMap<String, u32> = (0..100).map(|i| (format!("k{}", i), i)).collect();
        store
            .mset(&items, Duration::ZERO)
            .await
            .expect("Failed to set");

        store.sync().await;
        assert!(store.entry_count() <= 10);
    }

    #[tokio::test]
    async fn test_bounded_unbounded_ttl_never_expires() {
        let store = store(100);
        let items = HashMap::from([("a".to_string(), 1_u32)]);
        store
            .mset(&items, Duration::MAX)
            .await
            .expect("Failed to set");
        store.sync().await;

        let mut dst: Option<u32> = None;
        assert!(store.get("a", &mut dst).await.expect("Failed to get"));
        assert_eq!(dst, Some(1));

        // in range for the clock but past moka's limit
        let long = Duration::from_secs(200 * 365 * 24 * 60 * 60);
        let items = HashMap::from([("b".to_string(), 2_u32)]);
        store.mset(&items, long).await.expect("Failed to set");
        store.sync().await;

        let mut dst: Option<u32> = None;
        assert!(store.get("b", &mut dst).await.expect("Failed to get"));
        assert_eq!(dst, Some(2));
    }
}
