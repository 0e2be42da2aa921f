//! Metrics hooks for cache operations.
//!
//! Implement [`CacheMetrics`] to feed hit/miss counts, fallback latency and
//! absorbed write-back failures into your monitoring system:
//!
//! ```ignore
//! use cacher::observability::CacheMetrics;
//! use std::time::Duration;
//!
//! struct PrometheusMetrics;
//!
//! impl CacheMetrics for PrometheusMetrics {
//!     fn record_hit(&self, _key: &str, _duration: Duration) {
//!         // counter!("cache_hits").inc();
//!     }
//!     fn record_write_back_error(&self, _keys: &[String], _error: &str) {
//!         // counter!("cache_write_back_failures").inc();
//!     }
//! }
//!
//! // let cacher = Cacher::new(store).with_metrics(Box::new(PrometheusMetrics));
//! ```
//!
//! Every method has a default that logs through the `log` crate.
//! [`NoOpMetrics`], the orchestrator's default, discards everything.
//!
//! Write-back failures never change an operation's result; this trait is the
//! side channel through which they are reported.

use std::time::Duration;

/// Trait for cache metrics collection.
pub trait CacheMetrics: Send + Sync {
    /// Record a store hit.
    fn record_hit(&self, key: &str, duration: Duration) {
        debug!("Cache HIT: {} took {:?}", key, duration);
    }

    /// Record a store miss.
    fn record_miss(&self, key: &str, duration: Duration) {
        debug!("Cache MISS: {} took {:?}", key, duration);
    }

    /// Record a fallback invocation covering `keys`.
    fn record_fallback(&self, keys: usize, duration: Duration) {
        debug!("Cache FALLBACK: {} keys took {:?}", keys, duration);
    }

    /// Record a successful write-back.
    fn record_set(&self, keys: usize, duration: Duration) {
        debug!("Cache SET: {} keys took {:?}", keys, duration);
    }

    /// Record a delete operation.
    fn record_delete(&self, deleted: i64, duration: Duration) {
        debug!("Cache DELETE: {} keys took {:?}", deleted, duration);
    }

    /// Record an error that was returned to the caller.
    fn record_error(&self, key: &str, error: &str) {
        warn!("Cache ERROR for {}: {}", key, error);
    }

    /// Record a write-back failure that was absorbed.
    fn record_write_back_error(&self, keys: &[String], error: &str) {
        warn!("Cache WRITE-BACK failed for {} keys: {}", keys.len(), error);
    }
}

/// Default metrics implementation (no-op).
#[derive(Clone, Default)]
pub struct NoOpMetrics;

impl CacheMetrics for NoOpMetrics {
    fn record_hit(&self, _key: &str, _duration: Duration) {}
    fn record_miss(&self, _key: &str, _duration: Duration) {}
    fn record_fallback(&self, _keys: usize, _duration: Duration) {}
    fn record_set(&self, _keys: usize, _duration: Duration) {}
    fn record_delete(&self, _deleted: i64, _duration: Duration) {}
    fn record_error(&self, _key: &str, _error: &str) {}
    fn record_write_back_error(&self, _keys: &[String], _error: &str) {}
}

/// Metrics implementation that only logs, using the trait defaults.
#[derive(Clone, Default)]
pub struct LogMetrics;

impl CacheMetrics for LogMetrics {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_metrics() {
        let metrics = NoOpMetrics;
        metrics.record_hit("key", Duration::from_secs(1));
        metrics.record_miss("key", Duration::from_secs(2));
        metrics.record_write_back_error(&["key".to_string()], "boom");
    }

    #[test]
    fn test_log_metrics_defaults() {
        let metrics = LogMetrics;
        metrics.record_fallback(3, Duration::from_millis(5));
        metrics.record_delete(1, Duration::from_millis(1));
    }
}
