//! Cacher - the cache-aside orchestrator.
//!
//! Every operation follows the same protocol: read the store first, call the
//! fallback only for what the store did not have, write the fallback's
//! results back, and hand everything to the caller as if it had been cached
//! all along.
//!
//! | Operation | Reads store | Calls fallback | Writes store |
//! |-----------|-------------|----------------|--------------|
//! | [`Cacher::get`] | yes | on miss | fallback result |
//! | [`Cacher::mget`] | yes | missed keys only | fallback results |
//! | [`Cacher::mdelete`] | no | no | deletes |
//! | [`Cacher::mrefresh`] | no | every key | fallback results |
//!
//! Failures while reading (store or fallback) abort the call. Failures while
//! writing back are logged, reported to [`CacheMetrics`] and otherwise
//! ignored: the caller already has a correct value.

use crate::error::{Error, Result};
use crate::fallback::{BatchFallback, Fallback};
use crate::observability::{CacheMetrics, NoOpMetrics};
use crate::store::Store;
use crate::transport::{self, Destination};
use crate::value::CacheValue;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::{Duration, Instant};

/// Per-operation options.
///
/// # Example
///
/// ```
/// use cacher::CacheOptions;
/// use std::time::Duration;
///
/// let options = CacheOptions::default()
///     .with_ttl(Duration::from_secs(300))
///     .with_timeout(Duration::from_millis(250));
/// assert!(!options.never_expires());
/// ```
#[derive(Clone, Debug, Default)]
pub struct CacheOptions {
    /// Lifetime of values written back. `Duration::ZERO` (the default) means
    /// they never expire.
    pub ttl: Duration,

    /// Deadline for the whole operation, store and fallback calls included.
    ///
    /// When it passes, the in-flight step is dropped and the call fails with
    /// `Error::Timeout`, unless the step was the write-back, which is
    /// abandoned silently like any other write-back failure.
    pub timeout: Option<Duration>,
}

impl CacheOptions {
    /// Set the TTL of written-back values.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Bound the whole operation by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Whether written-back values never expire.
    pub fn never_expires(&self) -> bool {
        self.ttl.is_zero()
    }
}

/// Absolute deadline for one operation, shared by all of its steps.
#[derive(Clone, Copy)]
struct Deadline(Option<tokio::time::Instant>);

impl Deadline {
    fn start(timeout: Option<Duration>) -> Self {
        Deadline(timeout.and_then(|limit| tokio::time::Instant::now().checked_add(limit)))
    }

    async fn run<T>(
        self,
        step: impl FnOnce() -> String,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match self.0 {
            Some(at) => tokio::time::timeout_at(at, fut)
                .await
                .map_err(|_| Error::Timeout(step()))?,
            None => fut.await,
        }
    }
}

/// Cache-aside orchestrator over a [`Store`].
///
/// Holds no per-call state and no locks; share it behind an `Arc` (or use
/// [`crate::CacheService`]) and call it from as many tasks as you like.
/// Concurrent misses for the same key each run the fallback.
///
/// # Example
///
/// ```ignore
/// use cacher::{Cacher, CacheOptions, store::MemoryStore};
///
/// let cacher = Cacher::new(MemoryStore::new());
/// let load_user = |id: String| async move { db.find_user_name(&id).await };
///
/// let mut name: Option<String> = None;
/// let found = cacher
///     .get("u:1", &mut name, Some(&load_user), CacheOptions::default())
///     .await?;
/// ```
pub struct Cacher<S: Store> {
    store: S,
    metrics: Box<dyn CacheMetrics>,
}

impl<S: Store> Cacher<S> {
    /// Create a new orchestrator over `store`.
    pub fn new(store: S) -> Self {
        Cacher {
            store,
            metrics: Box::new(NoOpMetrics),
        }
    }

    /// Set custom metrics handler.
    pub fn with_metrics(mut self, metrics: Box<dyn CacheMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Get store reference (for advanced use).
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Read one key, falling back on a miss.
    ///
    /// 1. Store hit: `dst` is filled, returns `Ok(true)`; the fallback is not called.
    /// 2. Miss without fallback: returns `Ok(false)`.
    /// 3. Miss with fallback: the fallback runs once. `Ok(None)` from it
    ///    returns `Ok(false)`. A value is put into `dst`, written back with
    ///    `options.ttl`, and `Ok(true)` is returned even if the write-back fails.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidDestination`: `dst` is a mapping
    /// - `Error::TypeMismatch`: the stored value does not fit `dst`
    /// - `Error::StoreError`: the store read failed
    /// - `Error::Fallback`: the fallback failed (nothing is written)
    /// - `Error::Timeout`: `options.timeout` passed before the value was produced
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
        let deadline = Deadline::start(options.timeout);
        let timer = Instant::now();

        let found = deadline
            .run(|| format!("GET {}", key), self.store.get(key, dst))
            .await;
        if self.observe(key, found)? {
            self.metrics.record_hit(key, timer.elapsed());
            debug!("✓ Cache hit for {}", key);
            return Ok(true);
        }
        self.metrics.record_miss(key, timer.elapsed());

        let Some(fallback) = fallback else {
            debug!("✗ Cache miss for {} - no fallback", key);
            return Ok(false);
        };

        debug!("Cache miss for {}, calling fallback", key);
        let started = Instant::now();
        let fetched = deadline
            .run(|| format!("fallback for {}", key), async {
                fallback
                    .fetch(key)
                    .await
                    .map_err(|e| Error::fallback(format!("get {}", key), e))
            })
            .await;
        let fetched = self.observe(key, fetched)?;
        self.metrics.record_fallback(1, started.elapsed());

        let Some(value) = fetched else {
            debug!("Fallback found nothing for {}", key);
            return Ok(false);
        };

        transport::put_single(dst, value.clone())?;
        let items = HashMap::from([(key.to_string(), value)]);
        self.write_back(&items, &options, deadline).await;

        Ok(true)
    }

    /// Read many keys, falling back for the ones the store missed.
    ///
    /// Afterwards `dst` holds every key found in the store plus every key the
    /// fallback returned; keys found nowhere are absent. The fallback is
    /// called at most once, with exactly the missed keys (deduplicated), and
    /// not at all when nothing missed. Returned entries for keys that were
    /// not requested are skipped.
    ///
    /// Keys already present in `dst` before the call count as hits.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidDestination`: `dst` is not a mapping
    /// - `Error::TypeMismatch`: a stored value does not fit `dst`
    /// - `Error::StoreError`: the store read failed
    /// - `Error::Fallback`: the fallback failed (nothing from it is merged)
    /// - `Error::Timeout`: `options.timeout` passed before results were produced
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
        if keys.is_empty() {
            return Ok(());
        }

        let deadline = Deadline::start(options.timeout);
        let timer = Instant::now();
        let label = batch_label(keys.len());

        let loaded = deadline
            .run(|| format!("MGET {}", label), self.store.mget(keys, dst))
            .await;
        self.observe(&label, loaded)?;

        let present = transport::mapping_keys(dst)?;
        let elapsed = timer.elapsed();
        let mut seen = HashSet::new();
        let mut missed = Vec::new();
        for key in keys {
            if present.contains(*key) {
                self.metrics.record_hit(key, elapsed);
            } else {
                self.metrics.record_miss(key, elapsed);
                if seen.insert(*key) {
                    missed.push(key.to_string());
                }
            }
        }

        if missed.is_empty() {
            debug!("✓ Cache hit for all {} keys", keys.len());
            return Ok(());
        }

        let Some(fallback) = fallback else {
            debug!("✗ Cache missed {} of {} keys - no fallback", missed.len(), keys.len());
            return Ok(());
        };

        debug!(
            "Cache missed {} of {} keys, calling batch fallback",
            missed.len(),
            keys.len()
        );
        let fetched = self.fetch_batch(fallback, &missed, deadline, "mget").await?;
        let accepted = accept(dst, &missed, fetched)?;
        self.write_back(&accepted, &options, deadline).await;

        Ok(())
    }

    /// Delete keys from the store, returning how many were present.
    ///
    /// Never calls a fallback. Empty `keys` returns `Ok(0)` without touching
    /// the store.
    ///
    /// # Errors
    /// `Error::StoreError` if the delete fails.
    pub async fn mdelete(&self, keys: &[&str]) -> Result<i64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let timer = Instant::now();
        let deleted = self.observe(&batch_label(keys.len()), self.store.del(keys).await)?;
        self.metrics.record_delete(deleted, timer.elapsed());
        debug!("✓ Deleted {} of {} keys", deleted, keys.len());

        Ok(deleted)
    }

    /// Reload keys from the fallback, ignoring what the store holds.
    ///
    /// The batch fallback is called once with every (deduplicated) key. Its
    /// results go into `dst` and are written to the store with
    /// `options.ttl`, replacing cached values. Empty `keys` is a no-op.
    ///
    /// # Errors
    ///
    /// - `Error::MissingFallback`: no batch fallback given
    /// - `Error::InvalidDestination`: `dst` is not a mapping
    /// - `Error::Fallback`: the fallback failed (nothing is written)
    /// - `Error::Timeout`: `options.timeout` passed before results were produced
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
        if keys.is_empty() {
            return Ok(());
        }

        let fallback = fallback.ok_or(Error::MissingFallback)?;
        transport::expect_mapping(dst)?;

        let deadline = Deadline::start(options.timeout);
        let mut seen = HashSet::new();
        let requested: Vec<String> = keys
            .iter()
            .filter(|key| seen.insert(**key))
            .map(|key| key.to_string())
            .collect();

        debug!("Refreshing {} keys from fallback", requested.len());
        let fetched = self
            .fetch_batch(fallback, &requested, deadline, "mrefresh")
            .await?;
        let accepted = accept(dst, &requested, fetched)?;
        self.write_back(&accepted, &options, deadline).await;

        Ok(())
    }

    async fn fetch_batch<T, F>(
        &self,
        fallback: &F,
        keys: &[String],
        deadline: Deadline,
        operation: &str,
    ) -> Result<HashMap<String, T>>
    where
        F: BatchFallback<T>,
    {
        let started = Instant::now();
        let context = format!("{} {}", operation, batch_label(keys.len()));

        let fetched = deadline
            .run(|| format!("batch fallback for {}", batch_label(keys.len())), async {
                fallback
                    .fetch_many(keys)
                    .await
                    .map_err(|e| Error::fallback(context.clone(), e))
            })
            .await;
        let fetched = self.observe(&context, fetched)?;
        self.metrics.record_fallback(keys.len(), started.elapsed());

        Ok(fetched)
    }

    /// Populate the store; failures are reported, never returned.
    async fn write_back<T: CacheValue>(
        &self,
        items: &HashMap<String, T>,
        options: &CacheOptions,
        deadline: Deadline,
    ) {
        if items.is_empty() {
            return;
        }

        let timer = Instant::now();
        let written = deadline
            .run(
                || format!("write-back of {}", batch_label(items.len())),
                self.store.mset(items, options.ttl),
            )
            .await;

        match written {
            Ok(()) => {
                self.metrics.record_set(items.len(), timer.elapsed());
                debug!("✓ Wrote back {} keys (TTL: {:?})", items.len(), options.ttl);
            }
            Err(e) => {
                let keys: Vec<String> = items.keys().cloned().collect();
                warn!(
                    "Write-back of {} keys failed, returning fallback values anyway: {}",
                    keys.len(),
                    e
                );
                self.metrics.record_write_back_error(&keys, &e.to_string());
            }
        }
    }

    /// Report an error to metrics before handing it back.
    fn observe<T>(&self, label: &str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.metrics.record_error(label, &e.to_string());
        }
        result
    }
}

/// Put requested fallback results into `dst`, returning what was accepted.
fn accept<D: Destination>(
    dst: &mut D,
    requested: &[String],
    fetched: HashMap<String, D::Item>,
) -> Result<HashMap<String, D::Item>> {
    let requested: HashSet<&str> = requested.iter().map(String::as_str).collect();
    let mut accepted = HashMap::with_capacity(fetched.len());

    for (key, value) in fetched {
        if !requested.contains(key.as_str()) {
            warn!("Batch fallback returned unrequested key {}, skipping", key);
            continue;
        }
        transport::put_into_mapping(dst, &key, value.clone())?;
        accepted.insert(key, value);
    }

    Ok(accepted)
}

fn batch_label(len: usize) -> String {
    format!("[{} keys]", len)
}
