//! High-level cache service for web applications.
//!
//! Provides a convenient wrapper around [`Cacher`] with Arc for easy sharing.

use crate::cacher::{CacheOptions, Cacher};
use crate::error::Result;
use crate::fallback::{BatchFallback, Fallback};
use crate::observability::CacheMetrics;
use crate::store::Store;
use crate::transport::Destination;
use std::sync::Arc;

/// High-level cache service for web applications.
///
/// Wraps `Cacher` in `Arc` for easy sharing across tasks without requiring
/// external `Arc<Mutex<>>` wrappers. Stores use interior mutability and the
/// orchestrator only takes `&self`, so no extra lock is needed.
///
/// # Example
///
/// ```ignore
/// use cacher::{CacheService, CacheOptions, store::MemoryStore};
///
/// pub struct UserService {
///     cache: CacheService<MemoryStore>,
///     repo: Arc<UserRepository>,
/// }
///
/// impl UserService {
///     pub async fn names(&self, ids: &[&str]) -> cacher::Result<HashMap<String, String>> {
///         let repo = self.repo.clone();
///         let load = move |ids: Vec<String>| {
///             let repo = repo.clone();
///             async move { repo.names(&ids).await }
///         };
///
///         let mut names = HashMap::new();
///         self.cache.mget(ids, &mut names, Some(&load), CacheOptions::default()).await?;
///         Ok(names)
///     }
/// }
/// ```
pub struct CacheService<S: Store> {
    cacher: Arc<Cacher<S>>,
}

impl<S: Store> Clone for CacheService<S> {
    fn clone(&self) -> Self {
        CacheService {
            cacher: Arc::clone(&self.cacher),
        }
    }
}

impl<S: Store> CacheService<S> {
    /// Create a new cache service over the given store.
    pub fn new(store: S) -> Self {
        CacheService {
            cacher: Arc::new(Cacher::new(store)),
        }
    }

    /// Create a new cache service with custom metrics.
    pub fn with_metrics(store: S, metrics: Box<dyn CacheMetrics>) -> Self {
        CacheService {
            cacher: Arc::new(Cacher::new(store).with_metrics(metrics)),
        }
    }

    /// See [`Cacher::get`].
    pub async fn get<D, F>(
        &self,
        key: &str,
        dst: &mut D,
        fallback: Option<&F>,
        options: CacheOptions,
    ) -> Result<bool>
    where
        D: Destination,
        F: Fallback<D::Item>,
    {
        self.cacher.get(key, dst, fallback, options).await
    }

    /// See [`Cacher::mget`].
    pub async fn mget<D, F>(
        &self,
        keys: &[&str],
        dst: &mut D,
        fallback: Option<&F>,
        options: CacheOptions,
    ) -> Result<()>
    where
        D: Destination,
        F: BatchFallback<D::Item>,
    {
        self.cacher.mget(keys, dst, fallback, options).await
    }

    /// See [`Cacher::mdelete`].
    pub async fn mdelete(&self, keys: &[&str]) -> Result<i64> {
        self.cacher.mdelete(keys).await
    }

    /// See [`Cacher::mrefresh`].
    pub async fn mrefresh<D, F>(
        &self,
        keys: &[&str],
        dst: &mut D,
        fallback: Option<&F>,
        options: CacheOptions,
    ) -> Result<()>
    where
        D: Destination,
        F: BatchFallback<D::Item>,
    {
        self.cacher.mrefresh(keys, dst, fallback, options).await
    }

    /// Get a reference to the underlying orchestrator.
    pub fn cacher(&self) -> &Cacher<S> {
        &self.cacher
    }
}
