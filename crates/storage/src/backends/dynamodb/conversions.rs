//! Conversions between JSON items and DynamoDB items.

use serde_json::{Number, Value};

use super::client::{DynamoItem, DynamoValue, ScalarType};
use crate::meta::AttrType;
use crate::types::Item;

/// Converts a JSON value to an attribute value.
pub fn to_dynamo(value: &Value) -> DynamoValue {
    match value {
        Value::Null => DynamoValue::Null,
        Value::Bool(b) => DynamoValue::Bool(*b),
        Value::Number(n) => DynamoValue::N(n.to_string()),
        Value::String(s) => DynamoValue::S(s.clone()),
        Value::Array(values) => DynamoValue::L(values.iter().map(to_dynamo).collect()),
        Value::Object(map) => DynamoValue::M(
            map.iter()
                .map(|(k, v)| (k.clone(), to_dynamo(v)))
                .collect(),
        ),
    }
}

/// Converts an attribute value back to JSON.
///
/// Numbers that fit an `i64` come back as integers.
pub fn from_dynamo(value: &DynamoValue) -> Value {
    match value {
        DynamoValue::Null => Value::Null,
        DynamoValue::Bool(b) => Value::Bool(*b),
        DynamoValue::N(n) => parse_number(n).map(Value::Number).unwrap_or(Value::Null),
        DynamoValue::S(s) => Value::String(s.clone()),
        DynamoValue::L(values) => Value::Array(values.iter().map(from_dynamo).collect()),
        DynamoValue::M(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), from_dynamo(v)))
                .collect(),
        ),
    }
}

fn parse_number(n: &str) -> Option<Number> {
    if let Ok(i) = n.parse::<i64>() {
        return Some(Number::from(i));
    }
    n.parse::<f64>().ok().and_then(Number::from_f64)
}

/// Converts an item for storage, omitting null attributes.
pub fn item_to_dynamo(item: &Item) -> DynamoItem {
    item.iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.clone(), to_dynamo(v)))
        .collect()
}

/// Converts a stored item back to JSON.
pub fn item_from_dynamo(item: &DynamoItem) -> Item {
    item.iter()
        .map(|(k, v)| (k.clone(), from_dynamo(v)))
        .collect()
}

/// Returns the key scalar type for an attribute type, if it can be a key.
pub fn scalar_type(attr_type: AttrType) -> Option<ScalarType> {
    match attr_type {
        AttrType::String | AttrType::Datetime | AttrType::Uuid => Some(ScalarType::S),
        AttrType::Int | AttrType::Float => Some(ScalarType::N),
        AttrType::Bool | AttrType::Json => None,
    }
}

/// Returns true if `value` has the scalar type `scalar`.
pub fn is_scalar_of(value: &Value, scalar: ScalarType) -> bool {
    match scalar {
        ScalarType::S => value.is_string(),
        ScalarType::N => value.is_number(),
    }
}
