//! Value comparison shared by the in-memory evaluator and the filter matcher.
//!
//! Both evaluation paths must agree on every record, so neither compares JSON
//! values directly; they go through [`values_equal`] and [`compare`].

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Looks up a (possibly dotted) field path in a record.
pub fn lookup<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = record;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Equality with `null` matching a missing field.
pub fn field_equals(field: Option<&Value>, expected: &Value) -> bool {
    match field {
        None => expected.is_null(),
        Some(actual) => values_equal(actual, expected),
    }
}

pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare(a, b) == Some(Ordering::Equal),
        (Value::String(x), Value::String(y)) => {
            x == y || matches!((instant(x), instant(y)), (Some(l), Some(r)) if l == r)
        }
        _ => a == b,
    }
}

/// Orders two scalars of the same kind. Mismatched kinds and non-scalars
/// never compare.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(l), Some(r)) = (x.as_i64(), y.as_i64()) {
                Some(l.cmp(&r))
            } else {
                x.as_f64()?.partial_cmp(&y.as_f64()?)
            }
        }
        (Value::String(x), Value::String(y)) => match (instant(x), instant(y)) {
            (Some(l), Some(r)) => Some(l.cmp(&r)),
            _ => Some(x.cmp(y)),
        },
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn instant(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
