//! Error types for the cache-aside layer.

use std::fmt;

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the cache-aside layer.
///
/// A cache miss is never an error: it is reported as `Ok(false)` from
/// single-key reads and as an absent entry in batch destinations.
///
/// Failures fall into two groups:
/// - **Fatal**: read-path store failures, fallback failures, destination
///   shape/type problems. These abort the call and reach the caller.
/// - **Absorbed**: a failed write-back after a successful read. These are
///   logged and reported through [`crate::observability::CacheMetrics`], and
///   never returned.
#[derive(Debug, Clone)]
pub enum Error {
    /// Backing store failed (connection lost, protocol error, pool exhausted).
    ///
    /// The message names the store operation and, where there is one, the key.
    StoreError(String),

    /// The caller-supplied fallback returned an error.
    ///
    /// `source` is exactly what the fallback produced; `context` names the
    /// orchestrator operation and key(s) it was invoked for.
    Fallback {
        /// Operation and key(s) the fallback was invoked for
        context: String,
        /// Error produced by the fallback
        source: Box<Error>,
    },

    /// Destination has the wrong shape for the operation.
    ///
    /// Raised when a mapping is passed where a single slot is expected, or
    /// the other way around.
    InvalidDestination(String),

    /// Stored value cannot be assigned or safely converted to the
    /// destination's type.
    TypeMismatch(String),

    /// `mrefresh` was called without a batch fallback.
    MissingFallback,

    /// Serialization failed when converting a value to cache bytes.
    SerializationError(String),

    /// Cache bytes could not be read as an envelope at all.
    ///
    /// **Recovery:** Cache entry should be evicted and recomputed.
    DeserializationError(String),

    /// Invalid cache entry: envelope carries a foreign magic header.
    ///
    /// Returned when the bytes under a key were not written by this crate.
    InvalidCacheEntry(String),

    /// Schema version mismatch between code and cached data.
    ///
    /// **Recovery:** Entry is recomputed once a fallback repopulates the key.
    VersionMismatch {
        /// Expected schema version (from compiled code)
        expected: u32,
        /// Found schema version (from cached entry)
        found: u32,
    },

    /// Operation exceeded the deadline set in `CacheOptions::timeout`.
    Timeout(String),

    /// Configuration error while building a store.
    ConfigError(String),

    /// Feature not implemented by this store.
    NotImplemented(String),

    /// Generic error with custom message.
    ///
    /// Handy for fallbacks that want to fail with a plain message.
    Other(String),
}

impl Error {
    /// Wrap an error returned by a fallback with the operation context.
    pub fn fallback(context: impl Into<String>, source: Error) -> Self {
        Error::Fallback {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::StoreError(msg) => write!(f, "Store error: {}", msg),
            Error::Fallback { context, source } => {
                write!(f, "Fallback error ({}): {}", context, source)
            }
            Error::InvalidDestination(msg) => write!(f, "Invalid destination: {}", msg),
            Error::TypeMismatch(msg) => write!(f, "Type mismatch: {}", msg),
            Error::MissingFallback => write!(f, "Missing fallback: refresh requires a batch fallback"),
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            Error::InvalidCacheEntry(msg) => write!(f, "Invalid cache entry: {}", msg),
            Error::VersionMismatch { expected, found } => {
                write!(
                    f,
                    "Cache version mismatch: expected {}, found {}",
                    expected, found
                )
            }
            Error::Timeout(msg) => write!(f, "Timeout: {}", msg),
            Error::ConfigError(msg) => write!(f, "Config error: {}", msg),
            Error::NotImplemented(msg) => write!(f, "Not implemented: {}", msg),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Fallback { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            Error::StoreError(e.to_string())
        } else if e.is_syntax() || e.is_eof() {
            Error::DeserializationError(e.to_string())
        } else {
            Error::SerializationError(e.to_string())
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::StoreError(e.to_string())
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Other(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Other(e.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::StoreError(format!("Redis error: {}", e))
    }
}
