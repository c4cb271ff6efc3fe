//! Ordering and string forms of item values.
//!
//! Filters need a partial order (incomparable kinds never match) while
//! comparators need a total one (incomparable kinds are ranked by kind), so
//! both are provided here.

use std::cmp::Ordering;

use serde_json::Value;

/// Compares two values of the same kind.
///
/// Integers compare exactly, other numbers as `f64`, strings lexically and
/// booleans with `false < true`. Any other pairing is incomparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Returns true if the values are equal, comparing numbers numerically.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match compare_values(a, b) {
        Some(ordering) => ordering == Ordering::Equal,
        None => a == b,
    }
}

/// Total order used for sorting.
pub fn total_cmp(a: &Value, b: &Value) -> Ordering {
    compare_values(a, b).unwrap_or_else(|| {
        kind_rank(a)
            .cmp(&kind_rank(b))
            .then_with(|| a.to_string().cmp(&b.to_string()))
    })
}

fn kind_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Returns the string form used by `contains`, `startswith` and `endswith`.
pub fn string_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Returns the value if present and not null.
pub fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}
