//! Values as stores hold them.
//!
//! Callers work with concrete types; stores work with [`Value`], which is
//! either an in-process object (kept as-is, no serialization) or an encoded
//! envelope (for stores that move bytes over the network). Turning a `Value`
//! back into a concrete type is the job of [`crate::transport`].

use crate::error::Result;
use crate::serialization::{self, Codec};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

/// Bound for every type that can pass through a cache.
///
/// Blanket-implemented: any `Clone + Serialize + DeserializeOwned` type that
/// is `Send + Sync + 'static` qualifies, no manual impl needed.
///
/// # Example
///
/// ```
/// use cacher::CacheValue;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, Serialize, Deserialize)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// fn assert_cacheable<T: CacheValue>() {}
/// assert_cacheable::<User>();
/// assert_cacheable::<String>();
/// ```
pub trait CacheValue: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// A cached value whose concrete type is only known at runtime.
#[derive(Clone)]
pub enum Value {
    /// Typed object kept in process memory.
    Object {
        /// The value itself
        value: Arc<dyn Any + Send + Sync>,
        /// Rust type name of `value`, for error messages
        type_name: &'static str,
    },

    /// Envelope bytes produced by [`serialization::serialize_for_cache`].
    Encoded {
        /// Codec the bytes were written with
        codec: Codec,
        /// Envelope bytes
        bytes: Vec<u8>,
    },
}

impl Value {
    /// Wrap a typed value for in-process storage.
    pub fn object<T: CacheValue>(value: T) -> Self {
        Value::Object {
            value: Arc::new(value),
            type_name: type_name::<T>(),
        }
    }

    /// Encode a typed value into an envelope.
    ///
    /// # Errors
    /// Returns `Error::SerializationError` if the codec fails.
    pub fn encode<T: CacheValue>(codec: Codec, value: &T) -> Result<Self> {
        Ok(Value::Encoded {
            codec,
            bytes: serialization::serialize_for_cache(codec, value)?,
        })
    }

    /// Wrap bytes read from a store.
    pub fn from_bytes(codec: Codec, bytes: Vec<u8>) -> Self {
        Value::Encoded { codec, bytes }
    }

    /// Envelope bytes, if this value is encoded.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Encoded { bytes, .. } => Some(bytes),
            Value::Object { .. } => None,
        }
    }

    /// Size in bytes of an encoded value, `None` for objects.
    pub fn encoded_len(&self) -> Option<usize> {
        self.as_bytes().map(<[u8]>::len)
    }

    /// Short description of what this value holds.
    pub fn describe(&self) -> String {
        match self {
            Value::Object { type_name, .. } => (*type_name).to_string(),
            Value::Encoded { codec, bytes } => format!("{} envelope ({} bytes)", codec, bytes.len()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Object { type_name, .. } => f
                .debug_struct("Object")
                .field("type_name", type_name)
                .finish_non_exhaustive(),
            Value::Encoded { codec, bytes } => f
                .debug_struct("Encoded")
                .field("codec", codec)
                .field("len", &bytes.len())
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_records_type_name() {
        let value = Value::object(42_u64);
        assert_eq!(value.describe(), "u64");
        assert!(value.as_bytes().is_none());
    }

    #[test]
    fn test_encoded_exposes_bytes() {
        let value = Value::encode(Codec::Json, &"Alice".to_string()).unwrap();
        assert!(value.encoded_len().unwrap() > 0);
        assert!(value.describe().starts_with("json envelope"));
    }
}
