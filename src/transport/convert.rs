//! Safe conversions between in-process scalar types.
//!
//! Used when an object read from an in-process store is not exactly the
//! destination's type. Only value-preserving conversions succeed:
//!
//! - integer → integer when the value fits (`i32` → `i64`, `u64` 7 → `u8`)
//! - integer → float when the value is exactly representable
//! - `f32` → `f64`, and `f64` → `f32` when nothing is lost
//! - `String` ↔ `Box<str>`
//!
//! Everything else, including numbers ↔ text, is a mismatch.

use std::any::Any;

/// Largest integer magnitude an `f64` represents exactly.
const MAX_EXACT_F64: u128 = 1 << 53;
/// Largest integer magnitude an `f32` represents exactly.
const MAX_EXACT_F32: u128 = 1 << 24;

enum Scalar {
    Int(i128),
    Float(f64),
    Text(String),
}

macro_rules! int_scalar {
    ($value:expr, $($t:ty),*) => {
        $(
            if let Some(n) = $value.downcast_ref::<$t>() {
                return Some(Scalar::Int(*n as i128));
            }
        )*
    };
}

macro_rules! fill_int {
    ($slot:expr, $n:expr, $($t:ty),*) => {
        $(
            if let Some(out) = $slot.downcast_mut::<Option<$t>>() {
                *out = <$t>::try_from($n).ok();
                return;
            }
        )*
    };
}

/// Convert `value` into a `T`, if a safe conversion exists.
pub(crate) fn convert<T: 'static>(value: &(dyn Any + Send + Sync)) -> Option<T> {
    let scalar = scalar_of(value)?;
    let mut out: Option<T> = None;
    fill(&mut out, scalar);
    out
}

fn scalar_of(value: &(dyn Any + Send + Sync)) -> Option<Scalar> {
    int_scalar!(value, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

    if let Some(f) = value.downcast_ref::<f32>() {
        return Some(Scalar::Float(f64::from(*f)));
    }
    if let Some(f) = value.downcast_ref::<f64>() {
        return Some(Scalar::Float(*f));
    }
    if let Some(s) = value.downcast_ref::<String>() {
        return Some(Scalar::Text(s.clone()));
    }
    if let Some(s) = value.downcast_ref::<Box<str>>() {
        return Some(Scalar::Text(s.to_string()));
    }

    None
}

/// Write `scalar` into `slot` (an `Option<T>` seen as `Any`) when `T` can hold it.
fn fill(slot: &mut dyn Any, scalar: Scalar) {
    match scalar {
        Scalar::Int(n) => {
            fill_int!(slot, n, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

            if let Some(out) = slot.downcast_mut::<Option<f64>>() {
                if n.unsigned_abs() <= MAX_EXACT_F64 {
                    *out = Some(n as f64);
                }
                return;
            }
            if let Some(out) = slot.downcast_mut::<Option<f32>>() {
                if n.unsigned_abs() <= MAX_EXACT_F32 {
                    *out = Some(n as f32);
                }
            }
        }
        Scalar::Float(f) => {
            if let Some(out) = slot.downcast_mut::<Option<f64>>() {
                *out = Some(f);
                return;
            }
            if let Some(out) = slot.downcast_mut::<Option<f32>>() {
                let narrowed = f as f32;
                if f64::from(narrowed) == f || f.is_nan() {
                    *out = Some(narrowed);
                }
            }
        }
        Scalar::Text(s) => {
            if let Some(out) = slot.downcast_mut::<Option<String>>() {
                *out = Some(s);
                return;
            }
            if let Some(out) = slot.downcast_mut::<Option<Box<str>>>() {
                *out = Some(s.into_boxed_str());
            }
        }
    }
}
