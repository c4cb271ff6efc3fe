//! Primary key strategies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::meta::{Attr, AttrType};
use crate::types::Item;

const SEPARATOR: char = '/';

/// How a storage extracts and assigns the primary key of an item.
///
/// Keys are always strings at the API surface. For every strategy
/// `get_key(set_key(item, k)) == k`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KeyConfig {
    /// The key is the string form of one attribute.
    Attr {
        /// Key attribute.
        attr_name: String,
    },
    /// Like `Attr`, but a random UUID is generated when the attribute is absent.
    Uuid {
        /// Key attribute.
        attr_name: String,
    },
    /// The key joins several attributes with `/`, escaping each component.
    Composite {
        /// Key attributes, in key order.
        attr_names: Vec<String>,
    },
}

impl KeyConfig {
    /// Key taken from a single attribute.
    pub fn attr(attr_name: impl Into<String>) -> Self {
        KeyConfig::Attr {
            attr_name: attr_name.into(),
        }
    }

    /// UUID key generated on create.
    pub fn uuid(attr_name: impl Into<String>) -> Self {
        KeyConfig::Uuid {
            attr_name: attr_name.into(),
        }
    }

    /// Composite key over several attributes.
    pub fn composite<I, S>(attr_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        KeyConfig::Composite {
            attr_names: attr_names.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the names of the attributes making up the key.
    pub fn attr_names(&self) -> Vec<&str> {
        match self {
            KeyConfig::Attr { attr_name } | KeyConfig::Uuid { attr_name } => {
                vec![attr_name.as_str()]
            }
            KeyConfig::Composite { attr_names } => attr_names.iter().map(String::as_str).collect(),
        }
    }

    /// Returns true if `name` is part of the key.
    pub fn is_key_attr(&self, name: &str) -> bool {
        self.attr_names().contains(&name)
    }

    /// Returns true if the key is generated when absent.
    pub fn generates_key(&self) -> bool {
        matches!(self, KeyConfig::Uuid { .. })
    }

    /// Assigns a generated key to the item if this strategy generates one.
    pub fn generate_key(&self, item: &mut Item) {
        if let KeyConfig::Uuid { attr_name } = self {
            let missing = item.get(attr_name).is_none_or(Value::is_null);
            if missing {
                item.insert(
                    attr_name.clone(),
                    Value::String(uuid::Uuid::new_v4().to_string()),
                );
            }
        }
    }

    /// Extracts the key from an item; `None` if any key attribute is absent.
    pub fn get_key(&self, item: &Item) -> Option<String> {
        match self {
            KeyConfig::Attr { attr_name } | KeyConfig::Uuid { attr_name } => {
                item.get(attr_name).and_then(key_component)
            }
            KeyConfig::Composite { attr_names } => {
                let parts = attr_names
                    .iter()
                    .map(|name| item.get(name).and_then(key_component).map(|c| escape(&c)))
                    .collect::<Option<Vec<_>>>()?;
                Some(parts.join(&SEPARATOR.to_string()))
            }
        }
    }

    /// Converts a key back into typed key attribute values.
    ///
    /// Returns `None` if the key cannot be parsed for the attribute types.
    pub fn key_values(&self, key: &str, attrs: &[Attr]) -> Option<Item> {
        let names = self.attr_names();
        let components: Vec<String> = match self {
            KeyConfig::Composite { .. } => key.split(SEPARATOR).map(unescape).collect(),
            _ => vec![key.to_string()],
        };
        if components.len() != names.len() {
            return None;
        }

        let mut values = Item::new();
        for (name, component) in names.into_iter().zip(components) {
            let attr_type = attrs
                .iter()
                .find(|a| a.name == name)
                .map(Attr::attr_type)
                .unwrap_or(AttrType::String);
            values.insert(name.to_string(), typed_component(&component, attr_type)?);
        }
        Some(values)
    }

    /// Writes the key attributes for `key` into the item.
    pub fn set_key(&self, key: &str, item: &mut Item, attrs: &[Attr]) -> bool {
        match self.key_values(key, attrs) {
            Some(values) => {
                item.extend(values);
                true
            }
            None => false,
        }
    }
}

fn key_component(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn typed_component(component: &str, attr_type: AttrType) -> Option<Value> {
    match attr_type {
        AttrType::Int => component.parse::<i64>().ok().map(Value::from),
        AttrType::Float => component
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
        AttrType::Bool => component.parse::<bool>().ok().map(Value::Bool),
        _ => Some(Value::String(component.to_string())),
    }
}

fn escape(component: &str) -> String {
    component.replace('%', "%25").replace(SEPARATOR, "%2F")
}

fn unescape(component: &str) -> String {
    component.replace("%2F", "/").replace("%25", "%")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(value: Value) -> Item {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_attr_key_round_trip_keeps_type() {
        let attrs = vec![Attr::int("id")];
        let config = KeyConfig::attr("id");

        let mut target = Item::new();
        assert!(config.set_key("42", &mut target, &attrs));
        assert_eq!(target["id"], json!(42));
        assert_eq!(config.get_key(&target).as_deref(), Some("42"));

        assert!(!config.set_key("forty-two", &mut Item::new(), &attrs));
    }

    #[test]
    fn test_composite_key_escapes_separator() {
        let attrs = vec![Attr::string("customer_id"), Attr::int("order_no")];
        let config = KeyConfig::composite(["customer_id", "order_no"]);

        let source = item(json!({"customer_id": "a/b%c", "order_no": 7}));
        let key = config.get_key(&source).unwrap();
        assert_eq!(key, "a%2Fb%25c/7");

        let mut target = Item::new();
        assert!(config.set_key(&key, &mut target, &attrs));
        assert_eq!(target, source);
        assert_eq!(config.get_key(&target).unwrap(), key);
    }

    #[test]
    fn test_missing_key_attr() {
        let config = KeyConfig::composite(["a", "b"]);
        assert!(config.get_key(&item(json!({"a": "x"}))).is_none());
    }

    #[test]
    fn test_uuid_generation_only_when_absent() {
        let config = KeyConfig::uuid("id");
        let mut generated = Item::new();
        config.generate_key(&mut generated);
        assert!(uuid::Uuid::parse_str(generated["id"].as_str().unwrap()).is_ok());

        let mut explicit = item(json!({"id": "mine"}));
        config.generate_key(&mut explicit);
        assert_eq!(explicit["id"], json!("mine"));
    }
}
