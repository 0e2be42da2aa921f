//! Fallback contracts: where values come from on a cache miss.
//!
//! The orchestrator never talks to a database, API or computation directly.
//! On a miss it calls a caller-supplied fallback and caches what comes back.
//! Fallbacks are opaque to the cache: it does not retry them, rate-limit them
//! or deduplicate concurrent calls for the same key.
//!
//! Two shapes exist:
//!
//! - [`Fallback`] for single keys: `key → Option<value>`
//! - [`BatchFallback`] for batches: `keys → map of the keys that exist`
//!
//! Both are implemented for plain async closures taking owned keys, so most
//! call sites never name the traits:
//!
//! ```ignore
//! let load_user = |id: String| async move { db.find_user(&id).await };
//! cacher.get(&id, &mut user, Some(&load_user), CacheOptions::default()).await?;
//! ```
//!
//! # Error Handling
//!
//! Return `Err` for failures of the source itself (connection lost, query
//! timeout). "Not found" is `Ok(None)` or an absent map entry, never an
//! error. Errors are surfaced to the caller wrapped in `Error::Fallback`.

use crate::error::{Error, Result};
use crate::value::CacheValue;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Single-key data source consulted on a cache miss.
#[allow(async_fn_in_trait)]
pub trait Fallback<T>: Send + Sync {
    /// Produce the authoritative value for `key`.
    ///
    /// # Returns
    /// - `Ok(Some(value))` - Value exists
    /// - `Ok(None)` - Value does not exist (not an error)
    ///
    /// # Errors
    /// Returns `Err` if the data source fails
    async fn fetch(&self, key: &str) -> Result<Option<T>>;
}

/// Batch data source consulted for the keys a batch read missed.
#[allow(async_fn_in_trait)]
pub trait BatchFallback<T>: Send + Sync {
    /// Produce values for `keys`.
    ///
    /// May return a subset; missing keys stay not-found. Keys outside the
    /// requested set are ignored by the orchestrator.
    ///
    /// # Errors
    /// Returns `Err` if the data source fails
    async fn fetch_many(&self, keys: &[String]) -> Result<HashMap<String, T>>;
}

impl<T, F, Fut> Fallback<T> for F
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<T>>>,
{
    async fn fetch(&self, key: &str) -> Result<Option<T>> {
        self(key.to_string()).await
    }
}

impl<T, F, Fut> BatchFallback<T> for F
where
    F: Fn(Vec<String>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<HashMap<String, T>>>,
{
    async fn fetch_many(&self, keys: &[String]) -> Result<HashMap<String, T>> {
        self(keys.to_vec()).await
    }
}

/// Placeholder for "no fallback"; cannot be constructed.
///
/// Use [`NO_FALLBACK`] where an operation takes an optional fallback.
#[derive(Debug, Clone, Copy)]
pub enum NoFallback {}

/// Absent fallback, usable with any value type.
pub const NO_FALLBACK: Option<&NoFallback> = None;

impl<T> Fallback<T> for NoFallback {
    async fn fetch(&self, _key: &str) -> Result<Option<T>> {
        match *self {}
    }
}

impl<T> BatchFallback<T> for NoFallback {
    async fn fetch_many(&self, _keys: &[String]) -> Result<HashMap<String, T>> {
        match *self {}
    }
}

// ============================================================================
// In-Memory Test Source
// ============================================================================

/// In-memory data source for tests and examples.
///
/// Serves values from a `HashMap`, counts every invocation and records the
/// keys each call asked for, so tests can assert exactly what the cache
/// fetched. Can be switched into a failing mode.
///
/// # Example
///
/// ```
/// use cacher::fallback::{Fallback, InMemorySource};
///
/// # #[tokio::main]
/// # async fn main() -> cacher::Result<()> {
/// let mut source = InMemorySource::new();
/// source.insert("u:1", "Alice".to_string());
///
/// assert_eq!(source.fetch("u:1").await?, Some("Alice".to_string()));
/// assert_eq!(source.fetch("u:2").await?, None);
/// assert_eq!(source.calls(), 2);
/// # Ok(())
/// # }
/// ```
pub struct InMemorySource<T> {
    data: HashMap<String, T>,
    failure: Option<Error>,
    calls: AtomicUsize,
    requested: Mutex<Vec<Vec<String>>>,
}

impl<T: CacheValue> InMemorySource<T> {
    /// Create an empty source.
    pub fn new() -> Self {
        InMemorySource {
            data: HashMap::new(),
            failure: None,
            calls: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
        }
    }

    /// Add or replace a value.
    pub fn insert(&mut self, key: impl Into<String>, value: T) {
        self.data.insert(key.into(), value);
    }

    /// Make every call fail with `error`.
    pub fn failing_with(mut self, error: Error) -> Self {
        self.failure = Some(error);
        self
    }

    /// Number of times the source was invoked (single or batch).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Keys requested by each invocation, in call order.
    pub fn requested(&self) -> Vec<Vec<String>> {
        self.requested
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn record(&self, keys: Vec<String>) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(keys);

        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

impl<T: CacheValue> Default for InMemorySource<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: CacheValue> Fallback<T> for InMemorySource<T> {
    async fn fetch(&self, key: &str) -> Result<Option<T>> {
        self.record(vec![key.to_string()])?;
        Ok(self.data.get(key).cloned())
    }
}

impl<T: CacheValue> BatchFallback<T> for InMemorySource<T> {
    async fn fetch_many(&self, keys: &[String]) -> Result<HashMap<String, T>> {
        self.record(keys.to_vec())?;
        Ok(keys
            .iter()
            .filter_map(|key| self.data.get(key).map(|v| (key.clone(), v.clone())))
            .collect())
    }
}
