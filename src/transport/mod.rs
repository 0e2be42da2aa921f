//! Value transport: moving runtime-typed values into caller destinations.
//!
//! Stores hand back [`Value`]s whose concrete type is only known at runtime;
//! callers hand in destinations with a static type. Everything that checks
//! the two against each other lives here, so the orchestrator and the stores
//! never compare types themselves.
//!
//! A destination is either a single slot (`Option<T>`) or a mapping from key
//! to value (`HashMap<String, T>`, `BTreeMap<String, T>`). Using one where
//! the other is expected fails with `Error::InvalidDestination`. A value that
//! cannot be assigned or safely converted to `T` fails with
//! `Error::TypeMismatch`.
//!
//! Assignment rules, in order:
//!
//! 1. In-process object of exactly type `T`: cloned in.
//! 2. In-process scalar with a value-preserving conversion to `T`
//!    (see [`convert`]): converted.
//! 3. Encoded envelope: decoded by its codec
//!    (see [`crate::serialization`]).
//! 4. Anything else: `TypeMismatch`.

mod convert;

use crate::error::{Error, Result};
use crate::serialization;
use crate::value::{CacheValue, Value};
use std::any::type_name;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Shape of a destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shape {
    /// One value, key ignored.
    Single,
    /// Key → value mapping.
    Mapping,
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Shape::Single => write!(f, "single slot"),
            Shape::Mapping => write!(f, "mapping"),
        }
    }
}

/// Caller-owned place the cache writes results into.
///
/// Implemented for `Option<T>` (single slot) and for `HashMap<String, T>` /
/// `BTreeMap<String, T>` (mappings). The cache only ever adds entries; it
/// never keeps a reference once the call returns.
pub trait Destination: Send {
    /// Element type the destination holds.
    type Item: CacheValue;

    /// Whether this is a single slot or a mapping.
    fn shape(&self) -> Shape;

    /// Store `item`. Single slots ignore `key`.
    fn put(&mut self, key: &str, item: Self::Item);

    /// Keys currently present. Always empty for single slots.
    fn present_keys(&self) -> Vec<String>;
}

impl<T: CacheValue> Destination for Option<T> {
    type Item = T;

    fn shape(&self) -> Shape {
        Shape::Single
    }

    fn put(&mut self, _key: &str, item: T) {
        *self = Some(item);
    }

    fn present_keys(&self) -> Vec<String> {
        Vec::new()
    }
}

impl<T: CacheValue> Destination for HashMap<String, T> {
    type Item = T;

    fn shape(&self) -> Shape {
        Shape::Mapping
    }

    fn put(&mut self, key: &str, item: T) {
        self.insert(key.to_string(), item);
    }

    fn present_keys(&self) -> Vec<String> {
        self.keys().cloned().collect()
    }
}

impl<T: CacheValue> Destination for BTreeMap<String, T> {
    type Item = T;

    fn shape(&self) -> Shape {
        Shape::Mapping
    }

    fn put(&mut self, key: &str, item: T) {
        self.insert(key.to_string(), item);
    }

    fn present_keys(&self) -> Vec<String> {
        self.keys().cloned().collect()
    }
}

/// Fail with `InvalidDestination` unless `dst` is a single slot.
pub fn expect_single<D: Destination>(dst: &D) -> Result<()> {
    expect_shape(dst, Shape::Single)
}

/// Fail with `InvalidDestination` unless `dst` is a mapping.
pub fn expect_mapping<D: Destination>(dst: &D) -> Result<()> {
    expect_shape(dst, Shape::Mapping)
}

fn expect_shape<D: Destination>(dst: &D, expected: Shape) -> Result<()> {
    let actual = dst.shape();
    if actual == expected {
        Ok(())
    } else {
        Err(Error::InvalidDestination(format!(
            "expected a {}, got {} ({})",
            expected,
            actual,
            type_name::<D>()
        )))
    }
}

/// Turn a stored value into a `T`, applying the assignment rules.
///
/// # Errors
/// `TypeMismatch` if no rule applies, or a codec error for corrupt envelopes.
pub fn decode<T: CacheValue>(value: &Value) -> Result<T> {
    match value {
        Value::Object {
            value,
            type_name: stored,
        } => {
            if let Some(exact) = value.downcast_ref::<T>() {
                return Ok(exact.clone());
            }
            convert::convert::<T>(&**value).ok_or_else(|| {
                Error::TypeMismatch(format!(
                    "stored {} cannot be assigned to {}",
                    stored,
                    type_name::<T>()
                ))
            })
        }
        Value::Encoded { codec, bytes } => serialization::deserialize_from_cache(*codec, bytes),
    }
}

/// Write a stored value into a single-slot destination.
///
/// # Errors
/// `InvalidDestination` for mappings, `TypeMismatch` for incompatible values.
pub fn assign_single<D: Destination>(dst: &mut D, value: &Value) -> Result<()> {
    expect_single(dst)?;
    let item = decode::<D::Item>(value)?;
    dst.put("", item);
    Ok(())
}

/// Write a stored value under `key` into a mapping destination.
///
/// # Errors
/// `InvalidDestination` for single slots, `TypeMismatch` for incompatible values.
pub fn assign_into_mapping<D: Destination>(dst: &mut D, key: &str, value: &Value) -> Result<()> {
    expect_mapping(dst)?;
    let item = decode::<D::Item>(value)?;
    dst.put(key, item);
    Ok(())
}

/// Write an already-typed value into a single-slot destination.
///
/// # Errors
/// `InvalidDestination` for mappings.
pub fn put_single<D: Destination>(dst: &mut D, item: D::Item) -> Result<()> {
    expect_single(dst)?;
    dst.put("", item);
    Ok(())
}

/// Write an already-typed value under `key` into a mapping destination.
///
/// # Errors
/// `InvalidDestination` for single slots.
pub fn put_into_mapping<D: Destination>(dst: &mut D, key: &str, item: D::Item) -> Result<()> {
    expect_mapping(dst)?;
    dst.put(key, item);
    Ok(())
}

/// Keys present in a mapping destination.
///
/// # Errors
/// `InvalidDestination` for single slots.
pub fn mapping_keys<D: Destination>(dst: &D) -> Result<HashSet<String>> {
    expect_mapping(dst)?;
    Ok(dst.present_keys().into_iter().collect())
}
