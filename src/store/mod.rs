//! Store contract and its implementations.

use crate::error::{Error, Result};
use crate::transport::{self, Destination};
use crate::value::{CacheValue, Value};
use std::collections::HashMap;
use std::time::Duration;

#[cfg(feature = "bounded")]
pub mod bounded;
#[cfg(feature = "memcached")]
pub mod memcached;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

#[cfg(feature = "bounded")]
pub use bounded::{BoundedConfig, BoundedStore};
#[cfg(feature = "memcached")]
pub use memcached::{MemcachedConfig, MemcachedStore};
pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis::{PoolStats, RedisConfig, RedisStore};

/// Trait for key-value stores the cache can sit on.
///
/// Implementors provide raw access to [`Value`]s (`load`, `load_many`,
/// `store_many`, `del`) and decide how typed values are represented
/// (`to_value`). The typed operations the orchestrator uses (`get`, `mget`,
/// `mset`, `exists`) are provided on top of those and run every assignment
/// through [`crate::transport`].
///
/// Contract for every implementation:
/// - absence is `Ok(None)` / `Ok(false)`, never an error
/// - an expired entry is absent
/// - `ttl == Duration::ZERO` means "never expires"
/// - `del` counts only keys that were present
/// - errors name the operation and, where there is one, the key
///
/// **IMPORTANT:** All methods take `&self`. Implementations must be safe to
/// call concurrently and use interior mutability or an external server.
#[allow(async_fn_in_trait)]
pub trait Store: Send + Sync + Clone {
    /// Encode a typed value into this store's native representation.
    ///
    /// # Errors
    /// Returns `Err` if the value cannot be encoded.
    fn to_value<T: CacheValue>(&self, value: &T) -> Result<Value>;

    /// Read the raw value stored under `key`.
    ///
    /// # Returns
    /// - `Ok(Some(value))` - Value found and not expired
    /// - `Ok(None)` - Key absent or expired
    ///
    /// # Errors
    /// Returns `Err` if a store error occurs (connection lost, etc.)
    async fn load(&self, key: &str) -> Result<Option<Value>>;

    /// Read many raw values, positionally aligned with `keys`.
    ///
    /// Default implementation calls `load()` for each key.
    /// Override for batch efficiency (e.g., Redis MGET).
    ///
    /// # Errors
    /// Returns `Err` if a store error occurs
    async fn load_many(&self, keys: &[&str]) -> Result<Vec<Option<Value>>> {
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            results.push(self.load(key).await?);
        }
        Ok(results)
    }

    /// Write raw values, all with the same TTL.
    ///
    /// Each key is written whole or not at all; the batch as a whole need not
    /// be atomic.
    ///
    /// # Errors
    /// Returns `Err` if a store error occurs
    async fn store_many(&self, items: Vec<(String, Value)>, ttl: Duration) -> Result<()>;

    /// Delete keys, returning how many were present.
    ///
    /// # Errors
    /// Returns `Err` if a store error occurs
    async fn del(&self, keys: &[&str]) -> Result<i64>;

    /// Report presence of every requested key.
    ///
    /// Default implementation uses `load_many()`.
    ///
    /// # Errors
    /// Returns `Err` if a store error occurs
    async fn exists(&self, keys: &[&str]) -> Result<HashMap<String, bool>> {
        let values = self.load_many(keys).await?;
        Ok(keys
            .iter()
            .zip(values)
            .map(|(key, value)| (key.to_string(), value.is_some()))
            .collect())
    }

    /// Read `key` into a single-slot destination.
    ///
    /// # Returns
    /// `Ok(true)` if the key was found and assigned, `Ok(false)` if absent.
    ///
    /// # Errors
    /// - `Error::InvalidDestination` if `dst` is not a single slot
    /// - `Error::TypeMismatch` if the stored value does not fit `dst`
    /// - store errors from `load()`
    async fn get<D: Destination>(&self, key: &str, dst: &mut D) -> Result<bool> {
        transport::expect_single(dst)?;
        match self.load(key).await? {
            Some(value) => {
                transport::assign_single(dst, &value)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Read the present subset of `keys` into a mapping destination.
    ///
    /// Keys that are absent are simply not added.
    ///
    /// # Errors
    /// - `Error::InvalidDestination` if `dst` is not a mapping
    /// - `Error::TypeMismatch` if a stored value does not fit `dst`
    /// - store errors from `load_many()`
    async fn mget<D: Destination>(&self, keys: &[&str], dst: &mut D) -> Result<()> {
        transport::expect_mapping(dst)?;
        let values = self.load_many(keys).await?;
        if values.len() != keys.len() {
            return Err(Error::StoreError(format!(
                "MGET returned {} values for {} keys",
                values.len(),
                keys.len()
            )));
        }
        for (key, value) in keys.iter().zip(values) {
            if let Some(value) = value {
                transport::assign_into_mapping(dst, key, &value)?;
            }
        }
        Ok(())
    }

    /// Write typed values with the given TTL (`Duration::ZERO` = no expiry).
    ///
    /// # Errors
    /// Returns `Err` if encoding or the underlying write fails
    async fn mset<T: CacheValue>(&self, items: &HashMap<String, T>, ttl: Duration) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let encoded = items
            .iter()
            .map(|(key, value)| Ok((key.clone(), self.to_value(value)?)))
            .collect::<Result<Vec<_>>>()?;
        self.store_many(encoded, ttl).await
    }

    /// Health check - verify the store is reachable.
    ///
    /// # Errors
    /// Returns `Err` if the store is not accessible
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    /// Optional: Clear everything in the store (use with caution).
    ///
    /// # Errors
    /// Returns `Err` if operation is not implemented or fails
    async fn clear_all(&self) -> Result<()> {
        Err(Error::NotImplemented(
            "clear_all not implemented for this store".to_string(),
        ))
    }
}

/// Bytes to put on the wire for `key`; remote stores only hold encoded values.
#[cfg(any(feature = "redis", feature = "memcached"))]
pub(crate) fn wire_bytes<'a>(operation: &str, key: &str, value: &'a Value) -> Result<&'a [u8]> {
    value.as_bytes().ok_or_else(|| {
        Error::StoreError(format!(
            "{} failed for key {}: {} is not encoded",
            operation,
            key,
            value.describe()
        ))
    })
}

/// TTL in whole milliseconds, `None` for "never expires".
#[cfg(feature = "redis")]
pub(crate) fn ttl_millis(ttl: Duration) -> Option<u64> {
    if ttl.is_zero() {
        None
    } else {
        Some(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1))
    }
}

/// TTL in whole seconds, rounded up, `None` for "never expires".
#[cfg(feature = "memcached")]
pub(crate) fn ttl_seconds(ttl: Duration) -> Option<u64> {
    if ttl.is_zero() {
        None
    } else {
        let secs = ttl.as_secs().saturating_add(u64::from(ttl.subsec_nanos() > 0));
        Some(secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_exists_default() {
        let store = MemoryStore::new();
        let items = HashMap::from([("key".to_string(), 1_u32)]);
        store
            .mset(&items, Duration::ZERO)
            .await
            .expect("Failed to set key");

        let exists = store
            .exists(&["key", "nonexistent"])
            .await
            .expect("Failed to check exists");
        assert_eq!(exists.len(), 2);
        assert!(exists["key"]);
        assert!(!exists["nonexistent"]);
    }

    #[tokio::test]
    async fn test_store_get_rejects_mapping_destination() {
        let store = MemoryStore::new();
        let mut dst: HashMap<String, u32> = HashMap::new();

        let err = store.get("key", &mut dst).await.unwrap_err();
        assert!(matches!(err, Error::InvalidDestination(_)));
    }

    #[cfg(feature = "redis")]
    #[test]
    fn test_ttl_millis() {
        assert_eq!(ttl_millis(Duration::ZERO), None);
        assert_eq!(ttl_millis(Duration::from_micros(10)), Some(1));
        assert_eq!(ttl_millis(Duration::from_secs(2)), Some(2000));
        assert_eq!(ttl_millis(Duration::MAX), Some(u64::MAX));
    }

    #[cfg(feature = "memcached")]
    #[test]
    fn test_ttl_seconds() {
        assert_eq!(ttl_seconds(Duration::ZERO), None);
        assert_eq!(ttl_seconds(Duration::from_millis(200)), Some(1));
        assert_eq!(ttl_seconds(Duration::from_millis(1500)), Some(2));
        assert_eq!(ttl_seconds(Duration::from_secs(3)), Some(3));
        assert_eq!(ttl_seconds(Duration::MAX), Some(u64::MAX));
    }
}
