//! JSON-safe value canonicalization
//!
//! Everything that leaves the engine goes through here. Output is built only
//! from i64 integers, finite f64 floats, booleans, strings, null, arrays and
//! string-keyed objects. NaN, +Inf, -Inf and missing cells all become null.

use crate::data_utils::{millis_to_datetime, Scalar, TEMPORAL_FORMAT};
use crate::error::{EngineError, Result};
use polars::prelude::{AnyValue, TimeUnit};
use serde::Serialize;
use serde_json::{Map, Number, Value};

/// Finite float or `None`
pub fn safe_float(v: f64) -> Option<f64> {
    if v.is_finite() {
        Some(v)
    } else {
        None
    }
}

pub fn float_to_json(v: f64) -> Value {
    safe_float(v)
        .and_then(Number::from_f64)
        .map_or(Value::Null, Value::Number)
}

pub fn opt_float_to_json(v: Option<f64>) -> Value {
    v.map_or(Value::Null, float_to_json)
}

pub fn scalar_to_json(scalar: &Scalar) -> Value {
    match scalar {
        Scalar::Null => Value::Null,
        Scalar::Bool(b) => Value::Bool(*b),
        Scalar::Int(i) => Value::Number((*i).into()),
        Scalar::Float(f) => float_to_json(*f),
        Scalar::Str(s) => Value::String(s.clone()),
        Scalar::Temporal(t) => Value::String(t.format(TEMPORAL_FORMAT).to_string()),
    }
}

/// Convert a raw polars cell. Integers wider than i64 degrade to floats,
/// types without a JSON form fall back to their display text.
pub fn any_value_to_json(value: &AnyValue) -> Value {
    match value {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(b) => Value::Bool(*b),
        AnyValue::String(s) => Value::String(s.to_string()),
        AnyValue::StringOwned(s) => Value::String(s.to_string()),
        AnyValue::Float32(f) => float_to_json(*f as f64),
        AnyValue::Float64(f) => float_to_json(*f),
        AnyValue::Datetime(v, unit, _) => {
            let millis = match unit {
                TimeUnit::Nanoseconds => v / 1_000_000,
                TimeUnit::Microseconds => v / 1_000,
                TimeUnit::Milliseconds => *v,
            };
            millis_to_datetime(millis).map_or(Value::Null, |t| {
                Value::String(t.format(TEMPORAL_FORMAT).to_string())
            })
        }
        other if other.dtype().is_integer() => match other.extract::<i64>() {
            Some(i) => Value::Number(i.into()),
            None => other.extract::<f64>().map_or(Value::Null, float_to_json),
        },
        other => Value::String(other.to_string()),
    }
}

/// Canonicalize an arbitrary JSON tree. Idempotent and order-preserving.
pub fn sanitize(value: Value) -> Value {
    match value {
        Value::Number(n) => sanitize_number(&n),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize).collect()),
        Value::Object(entries) => {
            let mut out = Map::with_capacity(entries.len());
            for (key, item) in entries {
                out.insert(key, sanitize(item));
            }
            Value::Object(out)
        }
        other => other,
    }
}

fn sanitize_number(n: &Number) -> Value {
    if let Some(i) = n.as_i64() {
        return Value::Number(i.into());
    }
    // u64 beyond i64::MAX is not a 64-bit signed integer; degrade to float
    if let Some(u) = n.as_u64() {
        return float_to_json(u as f64);
    }
    n.as_f64().map_or(Value::Null, float_to_json)
}

/// Final check before bytes are emitted: no number in the tree may be
/// non-finite.
pub fn ensure_finite(value: &Value) -> Result<()> {
    check_finite(value, "$")
}

fn check_finite(value: &Value, path: &str) -> Result<()> {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) if !f.is_finite() => Err(EngineError::NonFiniteOutput(path.to_string())),
            _ => Ok(()),
        },
        Value::Array(items) => {
            for (idx, item) in items.iter().enumerate() {
                check_finite(item, &format!("{}[{}]", path, idx))?;
            }
            Ok(())
        }
        Value::Object(entries) => {
            for (key, item) in entries {
                check_finite(item, &format!("{}.{}", path, key))?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Blanket response encoder used at the HTTP boundary
pub fn to_safe_value<T: Serialize>(value: &T) -> Result<Value> {
    let value = sanitize(serde_json::to_value(value)?);
    ensure_finite(&value)?;
    Ok(value)
}

pub fn to_safe_vec<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let value = to_safe_value(value)?;
    Ok(serde_json::to_vec(&value)?)
}

/// Historical row payload shape: missing cells render as empty strings
pub fn blank_missing(value: Value) -> Value {
    match value {
        Value::Null => Value::String(String::new()),
        Value::Array(items) => Value::Array(items.into_iter().map(blank_missing).collect()),
        Value::Object(entries) => Value::Object(
            entries
                .into_iter()
                .map(|(key, item)| (key, blank_missing(item)))
                .collect(),
        ),
        other => other,
    }
}
