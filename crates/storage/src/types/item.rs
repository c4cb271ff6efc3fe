//! The item record type.

use serde_json::Value;

/// An externally shaped record: a map of field name to value.
///
/// Items are transient and constructed per operation; they carry no identity
/// beyond the key their storage's [`KeyConfig`](crate::meta::KeyConfig)
/// extracts from them.
pub type Item = serde_json::Map<String, Value>;

/// Returns a short name for the JSON kind of a value, used in error messages.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
