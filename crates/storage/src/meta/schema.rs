//! Operation-specific item schemas derived from attribute metadata.

use crate::error::{Operation, ValidationError};
use crate::meta::{AttrSchema, StorageMeta};
use crate::types::Item;

#[derive(Debug, Clone)]
struct FieldRule {
    name: String,
    schema: AttrSchema,
    writable: bool,
    required: bool,
}

/// The input schema for one write operation.
///
/// Create and update schemas differ: generated attributes are optional on
/// create, key attributes are always required on update, and each operation
/// only accepts the attributes flagged writable for it.
#[derive(Debug, Clone)]
pub struct ItemSchema {
    storage: String,
    operation: Operation,
    rules: Vec<FieldRule>,
}

impl ItemSchema {
    /// Derives the create input schema.
    pub fn for_create(meta: &StorageMeta) -> Self {
        let key_config = meta.key_config();
        let rules = meta
            .attrs()
            .iter()
            .map(|attr| {
                let generated = attr.create_generator.is_some()
                    || (key_config.is_key_attr(&attr.name) && key_config.generates_key());
                FieldRule {
                    name: attr.name.clone(),
                    schema: attr.schema.clone(),
                    writable: attr.creatable,
                    required: attr.creatable && !generated && !attr.schema.nullable,
                }
            })
            .collect();
        Self {
            storage: meta.name().to_string(),
            operation: Operation::Create,
            rules,
        }
    }

    /// Derives the update input schema.
    pub fn for_update(meta: &StorageMeta) -> Self {
        let key_config = meta.key_config();
        let rules = meta
            .attrs()
            .iter()
            .map(|attr| {
                let is_key = key_config.is_key_attr(&attr.name);
                FieldRule {
                    name: attr.name.clone(),
                    schema: attr.schema.clone(),
                    writable: is_key || attr.updatable,
                    required: is_key
                        || (attr.updatable
                            && attr.update_generator.is_none()
                            && !attr.schema.nullable),
                }
            })
            .collect();
        Self {
            storage: meta.name().to_string(),
            operation: Operation::Update,
            rules,
        }
    }

    /// Returns the names of the required attributes.
    pub fn required(&self) -> impl Iterator<Item = &str> {
        self.rules
            .iter()
            .filter(|r| r.required)
            .map(|r| r.name.as_str())
    }

    /// Validates an item, reporting the first violation found.
    pub fn validate(&self, item: &Item) -> Result<(), ValidationError> {
        for (name, value) in item {
            let Some(rule) = self.rules.iter().find(|r| &r.name == name) else {
                return Err(ValidationError::UnknownField {
                    storage: self.storage.clone(),
                    field: name.clone(),
                });
            };
            if !rule.writable {
                return Err(ValidationError::ReadOnlyField {
                    storage: self.storage.clone(),
                    field: name.clone(),
                    operation: self.operation,
                });
            }
            rule.schema.validate(&self.storage, name, value)?;
        }

        for rule in self.rules.iter().filter(|r| r.required) {
            if item.get(&rule.name).is_none_or(|v| v.is_null()) {
                return Err(ValidationError::MissingField {
                    storage: self.storage.clone(),
                    field: rule.name.clone(),
                });
            }
        }
        Ok(())
    }
}
