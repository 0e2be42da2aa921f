//! Memcached store implementation.

use super::{ttl_seconds, wire_bytes, Store};
use crate::error::{Error, Result};
use crate::serialization::Codec;
use crate::value::{CacheValue, Value};
use async_memcached::AsciiProtocol;
use deadpool_memcached::{Manager, Object, Pool};
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Default Memcached connection pool size.
/// Formula: (CPU cores × 2) + 1
/// For 8-core systems: 16 connections is optimal
/// Override with MEMCACHED_POOL_SIZE environment variable
const DEFAULT_POOL_SIZE: u32 = 16;

/// Longest relative expiration memcached accepts; larger values are read as
/// absolute unix timestamps.
const MAX_RELATIVE_EXPIRATION: u64 = 60 * 60 * 24 * 30;

/// Configuration for Memcached store.
#[derive(Clone, Debug)]
pub struct MemcachedConfig {
    pub servers: Vec<String>, // e.g., ["localhost:11211", "cache2:11211"]
    pub connection_timeout: Duration,
    pub pool_size: u32,
    /// Encoding used for values written to Memcached.
    pub codec: Codec,
}

impl Default for MemcachedConfig {
    fn default() -> Self {
        MemcachedConfig {
            servers: vec!["localhost:11211".to_string()],
            connection_timeout: Duration::from_secs(5),
            pool_size: DEFAULT_POOL_SIZE,
            codec: Codec::default(),
        }
    }
}

/// Memcached store with connection pooling and async operations.
///
/// Memcached has no sub-second expiry: TTLs are rounded up to whole seconds.
///
/// # Example
///
/// ```no_run
/// # use cacher::store::{MemcachedConfig, MemcachedStore, Store};
/// # async fn example() -> cacher::Result<()> {
/// let config = MemcachedConfig {
///     servers: vec!["localhost:11211".to_string()],
///     ..Default::default()
/// };
///
/// let store = MemcachedStore::new(config).await?;
/// let mut value: Option<String> = None;
/// store.get("key", &mut value).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MemcachedStore {
    pool: Pool,
    codec: Codec,
}

impl MemcachedStore {
    /// Create new Memcached store from configuration.
    ///
    /// # Errors
    /// Returns `Err` if no server is configured or pool creation fails
    pub async fn new(config: MemcachedConfig) -> Result<Self> {
        // deadpool-memcached Manager takes a single server address
        let addr = config
            .servers
            .first()
            .ok_or_else(|| Error::ConfigError("No memcached servers specified".to_string()))?
            .clone();

        let manager = Manager::new(addr.clone());

        let pool = Pool::builder(manager)
            .max_size(config.pool_size as usize)
            .build()
            .map_err(|e| Error::ConfigError(format!("Failed to create connection pool: {}", e)))?;

        info!(
            "✓ Memcached store initialized with server: {} (pool size: {}, codec: {})",
            addr, config.pool_size, config.codec
        );

        Ok(MemcachedStore {
            pool,
            codec: config.codec,
        })
    }

    /// Create from server address directly.
    ///
    /// Pool size is determined by:
    /// 1. `MEMCACHED_POOL_SIZE` environment variable (if set)
    /// 2. `DEFAULT_POOL_SIZE` constant (16)
    ///
    /// # Errors
    /// Returns `Err` if connection pool creation fails
    pub async fn from_server(addr: String) -> Result<Self> {
        let pool_size = std::env::var("MEMCACHED_POOL_SIZE")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_POOL_SIZE);

        let config = MemcachedConfig {
            servers: vec![addr],
            pool_size,
            ..Default::default()
        };
        Self::new(config).await
    }

    async fn connection(&self) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| Error::StoreError(format!("Failed to get Memcached connection: {}", e)))
    }
}

/// Memcached expiration for `ttl`: relative seconds, or an absolute unix
/// timestamp past the 30 day limit.
fn expiration(ttl: Duration) -> Option<i64> {
    let secs = ttl_seconds(ttl)?;
    if secs <= MAX_RELATIVE_EXPIRATION {
        return Some(secs as i64);
    }

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    Some(i64::try_from(now.saturating_add(secs)).unwrap_or(i64::MAX))
}

/// Turn a GET reply into a value; an item without data is a miss.
fn found_value(codec: Codec, key: &str, data: Option<Vec<u8>>) -> Option<Value> {
    match data {
        Some(bytes) => {
            debug!("✓ Memcached GET {} -> HIT", key);
            Some(Value::from_bytes(codec, bytes))
        }
        None => {
            debug!("✓ Memcached GET {} -> MISS", key);
            None
        }
    }
}

fn is_not_found(e: &impl std::fmt::Display) -> bool {
    e.to_string().contains("not found")
}

impl Store for MemcachedStore {
    fn to_value<T: CacheValue>(&self, value: &T) -> Result<Value> {
        Value::encode(self.codec, value)
    }

    async fn load(&self, key: &str) -> Result<Option<Value>> {
        let mut conn = self.connection().await?;

        match conn.get(key).await {
            Ok(item) => Ok(found_value(self.codec, key, item.and_then(|value| value.data))),
            Err(e) => Err(Error::StoreError(format!(
                "Memcached GET failed for key {}: {}",
                key, e
            ))),
        }
    }

    async fn load_many(&self, keys: &[&str]) -> Result<Vec<Option<Value>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.connection().await?;

        // get_multi reports "not found" when none of the keys exist
        let values = match conn.get_multi(keys).await {
            Ok(vals) => vals,
            Err(e) if is_not_found(&e) => {
                debug!("✓ Memcached MGET {} keys (all miss)", keys.len());
                return Ok(vec![None; keys.len()]);
            }
            Err(e) => return Err(Error::StoreError(format!("Memcached MGET failed: {}", e))),
        };

        let mut by_key: HashMap<String, Vec<u8>> = HashMap::with_capacity(values.len());
        for value in values {
            if let Some(data) = value.data {
                by_key.insert(String::from_utf8_lossy(&value.key).into_owned(), data);
            }
        }

        debug!(
            "✓ Memcached MGET {} keys ({} hits)",
            keys.len(),
            by_key.len()
        );

        // Preserve input order; duplicates get the same value
        Ok(keys
            .iter()
            .map(|key| {
                by_key
                    .get(*key)
                    .map(|bytes| Value::from_bytes(self.codec, bytes.clone()))
            })
            .collect())
    }

    async fn store_many(&self, items: Vec<(String, Value)>, ttl: Duration) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }

        let expiration = expiration(ttl);
        let mut conn = self.connection().await?;

        for (key, value) in &items {
            let bytes = wire_bytes("Memcached SET", key, value)?;
            conn.set(key, bytes, expiration, None).await.map_err(|e| {
                Error::StoreError(format!("Memcached SET failed for key {}: {}", key, e))
            })?;
        }

        debug!("✓ Memcached MSET {} keys (TTL: {:?})", items.len(), ttl);
        Ok(())
    }

    async fn del(&self, keys: &[&str]) -> Result<i64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.connection().await?;
        let mut deleted = 0;

        for key in keys {
            match conn.delete(key).await {
                Ok(()) => deleted += 1,
                Err(e) if is_not_found(&e) => {}
                Err(e) => {
                    return Err(Error::StoreError(format!(
                        "Memcached DELETE failed for key {}: {}",
                        key, e
                    )))
                }
            }
        }

        debug!("✓ Memcached DEL {} keys ({} deleted)", keys.len(), deleted);
        Ok(deleted)
    }

    async fn health_check(&self) -> Result<bool> {
        match self.pool.get().await {
            Ok(mut conn) => Ok(conn.get("__health_check__").await.is_ok()),
            Err(_) => Ok(false),
        }
    }

    async fn clear_all(&self) -> Result<()> {
        let mut conn = self.connection().await?;

        conn.flush_all()
            .await
            .map_err(|e| Error::StoreError(format!("Memcached FLUSH_ALL failed: {}", e)))?;

        warn!("⚠ Memcached FLUSH_ALL executed - all cache cleared!");
        Ok(())
    }
}
