//! In-memory store (default, thread-safe, async).
//!
//! Uses DashMap for lock-free concurrent access with per-key sharding.
//! Values are kept as typed objects, so nothing is serialized.
//! TTL expiration is checked on access.

use super::Store;
use crate::error::Result;
use crate::value::{CacheValue, Value};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// In-memory entry with optional expiration.
struct CacheEntry {
    value: Value,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(value: Value, ttl: Duration) -> Self {
        // a TTL past the clock's range never expires
        let expires_at = if ttl.is_zero() {
            None
        } else {
            Instant::now().checked_add(ttl)
        };
        CacheEntry { value, expires_at }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Instant::now() >= exp)
    }
}

/// Thread-safe async in-memory store.
///
/// Unbounded: entries leave only by TTL expiry, `del` or `clear_all`.
/// Clones share the same table.
///
/// # Example
///
/// ```no_run
/// use cacher::store::{MemoryStore, Store};
/// use std::collections::HashMap;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryStore::new();
///
///     let items = HashMap::from([("u:1".to_string(), "Alice".to_string())]);
///     store.mset(&items, Duration::from_secs(300)).await?;
///
///     let mut name: Option<String> = None;
///     assert!(store.get("u:1", &mut name).await?);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct MemoryStore {
    store: Arc<DashMap<String, CacheEntry>>,
}

impl MemoryStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        MemoryStore {
            store: Arc::new(DashMap::new()),
        }
    }

    /// Get the current number of entries, expired ones included until touched.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Get entry statistics.
    pub fn stats(&self) -> MemoryStats {
        let expired_entries = self.store.iter().filter(|entry| entry.is_expired()).count();

        MemoryStats {
            total_entries: self.store.len(),
            expired_entries,
        }
    }

    /// Print statistics to debug log.
    pub fn log_stats(&self) {
        let stats = self.stats();
        debug!(
            "Memory store stats: {} entries ({} expired)",
            stats.total_entries, stats.expired_entries
        );
    }

    fn live(&self, key: &str) -> Option<Value> {
        if let Some(entry) = self.store.get(key) {
            if !entry.is_expired() {
                return Some(entry.value.clone());
            }
        }
        None
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn to_value<T: CacheValue>(&self, value: &T) -> Result<Value> {
        Ok(Value::object(value.clone()))
    }

    async fn load(&self, key: &str) -> Result<Option<Value>> {
        if let Some(value) = self.live(key) {
            debug!("✓ Memory GET {} -> HIT", key);
            return Ok(Some(value));
        }

        // Drop the entry if it exists but expired
        self.store.remove_if(key, |_, entry| entry.is_expired());
        debug!("✓ Memory GET {} -> MISS", key);
        Ok(None)
    }

    async fn load_many(&self, keys: &[&str]) -> Result<Vec<Option<Value>>> {
        let results: Vec<Option<Value>> = keys.iter().map(|key| self.live(key)).collect();

        debug!(
            "✓ Memory MGET {} keys ({} hits)",
            keys.len(),
            results.iter().filter(|v| v.is_some()).count()
        );
        Ok(results)
    }

    async fn store_many(&self, items: Vec<(String, Value)>, ttl: Duration) -> Result<()> {
        let count = items.len();
        for (key, value) in items {
            self.store.insert(key, CacheEntry::new(value, ttl));
        }

        if ttl.is_zero() {
            debug!("✓ Memory MSET {} keys", count);
        } else {
            debug!("✓ Memory MSET {} keys (TTL: {:?})", count, ttl);
        }

        Ok(())
    }

    async fn del(&self, keys: &[&str]) -> Result<i64> {
        let mut deleted = 0;
        for key in keys {
            if let Some((_, entry)) = self.store.remove(*key) {
                if !entry.is_expired() {
                    deleted += 1;
                }
            }
        }

        debug!("✓ Memory DEL {} keys ({} deleted)", keys.len(), deleted);
        Ok(deleted)
    }

    async fn clear_all(&self) -> Result<()> {
        self.store.clear();
        warn!("⚠ Memory CLEAR_ALL executed - all entries removed!");
        Ok(())
    }
}

/// Memory store statistics.
#[derive(Clone, Debug)]
pub struct MemoryStats {
    pub total_entries: usize,
    pub expired_entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::collections::HashMap;

    fn items<T: Clone>(pairs: &[(&str, T)]) -> HashMap<String, T> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_memory_store_set_get() {
        let store = MemoryStore::new();

        store
            .mset(&items(&[("key1", "value1".to_string())]), Duration::ZERO)
            .await
            .expect("Failed to set");

        let mut dst: Option<String> = None;
        let found = store.get("key1", &mut dst).await.expect("Failed to get");
        assert!(found);
        assert_eq!(dst.as_deref(), Some("value1"));
    }

    #[tokio::test]
    async fn test_memory_store_miss() {
        let store = MemoryStore::new();

        let mut dst: Option<String> = None;
        let found = store.get("nonexistent", &mut dst).await.expect("Failed to get");
        assert!(!found);
        assert!(dst.is_none());
    }

    #[tokio::test]
    async fn test_memory_store_type_mismatch_on_read() {
        let store = MemoryStore::new();
        store
            .mset(&items(&[("key1", "text".to_string())]), Duration::ZERO)
            .await
            .expect("Failed to set");

        let mut dst: Option<u64> = None;
        let err = store.get("key1", &mut dst).await.unwrap_err();
        assert!(matches!(err, Error::TypeMismatch(_)));
    }

    #[tokio::test]
    async fn test_memory_store_del_counts_present_keys() {
        let store = MemoryStore::new();
        store
            .mset(&items(&[("key1", 1_u32), ("key2", 2_u32)]), Duration::ZERO)
            .await
            .expect("Failed to set");

        let deleted = store
            .del(&["key1", "key2", "missing"])
            .await
            .expect("Failed to delete");
        assert_eq!(deleted, 2);

        let deleted = store.del(&["key1"]).await.expect("Failed to delete");
        assert_eq!(deleted, 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_ttl_expiration() {
        let store = MemoryStore::new();

        store
            .mset(
                &items(&[("key1", "value1".to_string())]),
                Duration::from_millis(100),
            )
            .await
            .expect("Failed to set");

        let mut dst: Option<String> = None;
        assert!(store.get("key1", &mut dst).await.expect("Failed to get"));

        tokio::time::sleep(Duration::from_millis(150)).await;

        let mut dst: Option<String> = None;
        assert!(!store.get("key1", &mut dst).await.expect("Failed to get"));
        assert_eq!(store.len(), 0, "expired entry is removed on access");
    }

    #[tokio::test]
    async fn test_memory_store_expired_key_not_counted_by_del() {
        let store = MemoryStore::new();
        store
            .mset(&items(&[("key1", 1_u8)]), Duration::from_millis(20))
            .await
            .expect("Failed to set");

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(store.del(&["key1"]).await.expect("Failed to delete"), 0);
    }

    #[tokio::test]
    async fn test_memory_store_mget_partial() {
        let store = MemoryStore::new();
        store
            .mset(&items(&[("key1", 1_u32), ("key2", 2_u32)]), Duration::ZERO)
            .await
            .expect("Failed to set");

        let mut dst: HashMap<String, u32> = HashMap::new();
        store
            .mget(&["key1", "key2", "key3"], &mut dst)
            .await
            .expect("Failed to mget");

        assert_eq!(dst.len(), 2);
        assert_eq!(dst["key1"], 1);
        assert_eq!(dst["key2"], 2);
        assert!(!dst.contains_key("key3"));
    }

    #[tokio::test]
    async fn test_memory_store_clear_all() {
        let store = MemoryStore::new();
        store
            .mset(&items(&[("key1", 1_u32), ("key2", 2_u32)]), Duration::ZERO)
            .await
            .expect("Failed to set");

        assert_eq!(store.len(), 2);
        store.clear_all().await.expect("Failed to clear");
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_memory_store_stats() {
        let store = MemoryStore::new();
        store
            .mset(&items(&[("key1", 1_u32)]), Duration::ZERO)
            .await
            .expect("Failed to set");
        store
            .mset(&items(&[("key2", 2_u32)]), Duration::from_millis(10))
            .await
            .expect("Failed to set");

        tokio::time::sleep(Duration::from_millis(40)).await;

        let stats = store.stats();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.expired_entries, 1);
    }

    #[tokio::test]
    async fn test_memory_store_clone_shares_table() {
        let store1 = MemoryStore::new();
        store1
            .mset(&items(&[("key", 7_u64)]), Duration::ZERO)
            .await
            .expect("Failed to set");

        let store2 = store1.clone();
        let mut dst: Option<u64> = None;
        assert!(store2.get("key", &mut dst).await.expect("Failed to get"));
        assert_eq!(dst, Some(7));
    }

    #[tokio::test]
    async fn test_memory_store_thread_safe() {
        let store = MemoryStore::new();
        let mut handles = vec![];

        for i in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let items = HashMap::from([(format!("key_{}", i), i)]);
                store
                    .mset(&items, Duration::ZERO)
                    .await
                    .expect("Failed to set");
            }));
        }

        for handle in handles {
            handle.await.expect("Task failed");
        }

        assert_eq!(store.len(), 10);
    }

    #[tokio::test]
    async fn test_memory_store_unbounded_ttl_never_expires() {
        let store = MemoryStore::new();
        store
            .mset(&items(&[("key1", 7_u32)]), Duration::MAX)
            .await
            .expect("Failed to set");

        let mut dst: Option<u32> = None;
        assert!(store.get("key1", &mut dst).await.expect("Failed to get"));
        assert_eq!(dst, Some(7));
        assert_eq!(store.del(&["key1"]).await.expect("Failed to delete"), 1);
    }
}
