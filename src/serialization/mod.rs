//! Versioned envelope codecs for byte-oriented stores.
//!
//! Network stores (Redis, Memcached) hold bytes, so every value they keep is
//! wrapped in a versioned envelope before it leaves the process:
//!
//! ```text
//! ┌─────────────────┬─────────────────┬──────────────────┬─────────────┐
//! │  MAGIC (4 bytes)│ VERSION (u32)   │ TYPE TAG (str)   │ PAYLOAD (T) │
//! └─────────────────┴─────────────────┴──────────────────┴─────────────┘
//!   "CCHR"
//! ```
//!
//! Two codecs write the same envelope:
//!
//! | Codec | Self-describing | Reading into another type |
//! |-------|-----------------|---------------------------|
//! | [`Codec::Json`] | yes | allowed when serde can convert the payload (`i32` → `i64`) |
//! | [`Codec::Postcard`] | no | rejected unless the type tag matches exactly |
//!
//! Postcard cannot tell an `i64` from a `u32` on the wire, so for it the type
//! tag is the only guard against silently decoding garbage.
//!
//! # Example
//!
//! ```rust
//! use cacher::serialization::{deserialize_from_cache, serialize_for_cache, Codec};
//!
//! # fn main() -> cacher::Result<()> {
//! let bytes = serialize_for_cache(Codec::Json, &42_i32)?;
//! let widened: i64 = deserialize_from_cache(Codec::Json, &bytes)?;
//! assert_eq!(widened, 42);
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::any::type_name;

/// Magic header for cacher entries: b"CCHR"
pub const CACHE_MAGIC: [u8; 4] = *b"CCHR";

/// Current schema version.
///
/// Increment when the envelope layout changes. Entries written under another
/// version are rejected with `Error::VersionMismatch` and behave as a failed
/// read until they are overwritten.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Wire codec used by a byte-oriented store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Codec {
    /// JSON envelope. Tolerant of compatible type changes between writer and reader.
    #[default]
    Json,
    /// Postcard envelope. Compact, strict about types.
    Postcard,
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Codec::Json => write!(f, "json"),
            Codec::Postcard => write!(f, "postcard"),
        }
    }
}

/// Versioned envelope for cache entries.
///
/// # Example
///
/// ```rust
/// use cacher::serialization::CacheEnvelope;
///
/// let envelope = CacheEnvelope::new("data");
/// assert_eq!(envelope.magic, *b"CCHR");
/// assert_eq!(envelope.type_tag, "&str");
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CacheEnvelope<T> {
    /// Magic header: must be b"CCHR"
    pub magic: [u8; 4],
    /// Schema version: must match CURRENT_SCHEMA_VERSION
    pub version: u32,
    /// Rust type name of the payload at write time
    pub type_tag: String,
    /// The actual cached data
    pub payload: T,
}

impl<T> CacheEnvelope<T> {
    /// Create a new envelope with current magic, version and the payload's type tag.
    pub fn new(payload: T) -> Self {
        Self {
            magic: CACHE_MAGIC,
            version: CURRENT_SCHEMA_VERSION,
            type_tag: type_name::<T>().to_string(),
            payload,
        }
    }
}

/// Envelope fields that precede the payload, decoded on their own so a
/// payload failure can be told apart from a corrupt header.
#[derive(Deserialize)]
struct EnvelopeHeader {
    magic: [u8; 4],
    version: u32,
    type_tag: String,
}

/// Serialize a value with envelope for cache storage.
///
/// # Errors
///
/// Returns `Error::SerializationError` if the codec fails.
pub fn serialize_for_cache<T: Serialize>(codec: Codec, value: &T) -> Result<Vec<u8>> {
    let envelope = CacheEnvelope {
        magic: CACHE_MAGIC,
        version: CURRENT_SCHEMA_VERSION,
        type_tag: type_name::<T>().to_string(),
        payload: value,
    };

    let encoded = match codec {
        Codec::Json => serde_json::to_vec(&envelope).map_err(|e| e.to_string()),
        Codec::Postcard => postcard::to_allocvec(&envelope).map_err(|e| e.to_string()),
    };

    encoded.map_err(|e| {
        log::error!("Cache serialization failed ({}): {}", codec, e);
        Error::SerializationError(e)
    })
}

/// Deserialize a value from cache storage with validation.
///
/// # Errors
///
/// - `Error::DeserializationError`: bytes are not an envelope
/// - `Error::InvalidCacheEntry`: invalid magic header
/// - `Error::VersionMismatch`: schema version mismatch
/// - `Error::TypeMismatch`: payload does not fit `T`
pub fn deserialize_from_cache<T: DeserializeOwned>(codec: Codec, bytes: &[u8]) -> Result<T> {
    match codec {
        Codec::Json => decode_json(bytes),
        Codec::Postcard => decode_postcard(bytes),
    }
}

fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let envelope: CacheEnvelope<serde_json::Value> =
        serde_json::from_slice(bytes).map_err(|e| {
            log::error!("Cache deserialization failed (json): {}", e);
            Error::DeserializationError(e.to_string())
        })?;

    check_header(&envelope.magic, envelope.version)?;

    serde_json::from_value(envelope.payload).map_err(|e| {
        Error::TypeMismatch(format!(
            "stored {} cannot be read as {}: {}",
            envelope.type_tag,
            type_name::<T>(),
            e
        ))
    })
}

fn decode_postcard<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let (header, rest) = postcard::take_from_bytes::<EnvelopeHeader>(bytes).map_err(|e| {
        log::error!("Cache deserialization failed (postcard): {}", e);
        Error::DeserializationError(e.to_string())
    })?;

    check_header(&header.magic, header.version)?;

    if header.type_tag != type_name::<T>() {
        return Err(Error::TypeMismatch(format!(
            "stored {} cannot be read as {}",
            header.type_tag,
            type_name::<T>()
        )));
    }

    match postcard::take_from_bytes::<T>(rest) {
        Ok((value, [])) => Ok(value),
        Ok((_, trailing)) => Err(Error::TypeMismatch(format!(
            "{} trailing bytes after {} payload",
            trailing.len(),
            type_name::<T>()
        ))),
        Err(e) => Err(Error::TypeMismatch(format!(
            "payload does not decode as {}: {}",
            type_name::<T>(),
            e
        ))),
    }
}

fn check_header(magic: &[u8; 4], version: u32) -> Result<()> {
    if *magic != CACHE_MAGIC {
        log::warn!(
            "Invalid cache entry: expected magic {:?}, got {:?}",
            CACHE_MAGIC,
            magic
        );
        return Err(Error::InvalidCacheEntry(format!(
            "Invalid magic: expected {:?}, got {:?}",
            CACHE_MAGIC, magic
        )));
    }

    if version != CURRENT_SCHEMA_VERSION {
        log::warn!(
            "Cache version mismatch: expected {}, got {}",
            CURRENT_SCHEMA_VERSION,
            version
        );
        return Err(Error::VersionMismatch {
            expected: CURRENT_SCHEMA_VERSION,
            found: version,
        });
    }

    Ok(())
}
