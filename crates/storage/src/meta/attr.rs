//! Attribute descriptors.
//!
//! Attributes are plain data resolved once when a [`StorageMeta`] is built;
//! generic CRUD code looks them up by name rather than through any per-field
//! dispatch.
//!
//! [`StorageMeta`]: crate::meta::StorageMeta

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::{Clock, format_timestamp};
use crate::error::ValidationError;
use crate::types::value_kind;

/// The declared type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrType {
    /// UTF-8 string.
    String,
    /// 64-bit signed integer.
    Int,
    /// Floating point number.
    Float,
    /// Boolean.
    Bool,
    /// RFC 3339 timestamp stored as a string.
    Datetime,
    /// UUID stored as its hyphenated string form.
    Uuid,
    /// Arbitrary JSON (objects, arrays).
    Json,
}

impl AttrType {
    /// Returns the lower-case type name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            AttrType::String => "string",
            AttrType::Int => "integer",
            AttrType::Float => "float",
            AttrType::Bool => "boolean",
            AttrType::Datetime => "datetime",
            AttrType::Uuid => "uuid",
            AttrType::Json => "json",
        }
    }
}

/// Value constraints for one attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttrSchema {
    /// The declared type.
    pub attr_type: AttrType,

    /// Maximum number of characters for string values.
    #[serde(default)]
    pub max_length: Option<usize>,

    /// Whether `null` (or absence) is acceptable.
    #[serde(default)]
    pub nullable: bool,
}

impl AttrSchema {
    /// Creates a non-nullable schema of the given type.
    pub fn new(attr_type: AttrType) -> Self {
        Self {
            attr_type,
            max_length: None,
            nullable: false,
        }
    }

    /// Checks one value against this schema.
    pub fn validate(&self, storage: &str, field: &str, value: &Value) -> Result<(), ValidationError> {
        let mismatch = || ValidationError::TypeMismatch {
            storage: storage.to_string(),
            field: field.to_string(),
            expected: self.attr_type.name().to_string(),
            actual: value_kind(value).to_string(),
        };

        if value.is_null() {
            return if self.nullable { Ok(()) } else { Err(mismatch()) };
        }

        let ok = match self.attr_type {
            AttrType::String => value.is_string(),
            AttrType::Int => value.is_i64() || value.is_u64(),
            AttrType::Float => value.is_number(),
            AttrType::Bool => value.is_boolean(),
            AttrType::Datetime => value
                .as_str()
                .is_some_and(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok()),
            AttrType::Uuid => value
                .as_str()
                .is_some_and(|s| uuid::Uuid::parse_str(s).is_ok()),
            AttrType::Json => true,
        };
        if !ok {
            return Err(mismatch());
        }

        if let (Some(max_length), Some(s)) = (self.max_length, value.as_str()) {
            if s.chars().count() > max_length {
                return Err(ValidationError::TooLong {
                    storage: storage.to_string(),
                    field: field.to_string(),
                    max_length,
                });
            }
        }
        Ok(())
    }
}

/// A write-time value transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AttrGenerator {
    /// A random v4 UUID, only if the value is absent.
    Uuid,
    /// The current time, always overwriting.
    Timestamp,
    /// A fixed value, only if the value is absent.
    Default(Value),
    /// A value assigned by the backend (integer sequences).
    Sequence,
}

impl AttrGenerator {
    /// Applies the generator to `current`, returning the value to store.
    ///
    /// Returns `None` when the backend itself is responsible for the value.
    pub fn generate(&self, current: Option<&Value>, clock: &dyn Clock) -> Option<Value> {
        let present = current.filter(|v| !v.is_null());
        match self {
            AttrGenerator::Uuid => Some(
                present
                    .cloned()
                    .unwrap_or_else(|| Value::String(uuid::Uuid::new_v4().to_string())),
            ),
            AttrGenerator::Timestamp => Some(Value::String(format_timestamp(clock.now()))),
            AttrGenerator::Default(default) => {
                Some(present.cloned().unwrap_or_else(|| default.clone()))
            }
            AttrGenerator::Sequence => present.cloned(),
        }
    }
}

/// Metadata for one attribute of a storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attr {
    /// Field name in items.
    pub name: String,

    /// Value constraints.
    pub schema: AttrSchema,

    /// May be supplied on create.
    #[serde(default = "default_true")]
    pub creatable: bool,

    /// May be supplied on update.
    #[serde(default = "default_true")]
    pub updatable: bool,

    /// Returned on read.
    #[serde(default = "default_true")]
    pub readable: bool,

    /// May be referenced by filters.
    #[serde(default = "default_true")]
    pub searchable: bool,

    /// May be referenced by comparators.
    #[serde(default = "default_true")]
    pub sortable: bool,

    /// Transform applied on create.
    #[serde(default)]
    pub create_generator: Option<AttrGenerator>,

    /// Transform applied on update.
    #[serde(default)]
    pub update_generator: Option<AttrGenerator>,
}

fn default_true() -> bool {
    true
}

impl Attr {
    /// Creates a fully accessible, non-nullable attribute.
    pub fn new(name: impl Into<String>, attr_type: AttrType) -> Self {
        Self {
            name: name.into(),
            schema: AttrSchema::new(attr_type),
            creatable: true,
            updatable: true,
            readable: true,
            searchable: true,
            sortable: true,
            create_generator: None,
            update_generator: None,
        }
    }

    /// Shorthand for a string attribute.
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, AttrType::String)
    }

    /// Shorthand for an integer attribute.
    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, AttrType::Int)
    }

    /// Shorthand for a datetime attribute.
    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, AttrType::Datetime)
    }

    /// Bounds the length of string values.
    pub fn max_length(mut self, max_length: usize) -> Self {
        self.schema.max_length = Some(max_length);
        self
    }

    /// Allows the attribute to be null or absent.
    pub fn nullable(mut self) -> Self {
        self.schema.nullable = true;
        self
    }

    /// Sets the create-time generator.
    pub fn with_create_generator(mut self, generator: AttrGenerator) -> Self {
        self.create_generator = Some(generator);
        self
    }

    /// Sets the update-time generator.
    pub fn with_update_generator(mut self, generator: AttrGenerator) -> Self {
        self.update_generator = Some(generator);
        self
    }

    /// Prevents filters from referencing this attribute.
    pub fn not_searchable(mut self) -> Self {
        self.searchable = false;
        self
    }

    /// Prevents comparators from referencing this attribute.
    pub fn not_sortable(mut self) -> Self {
        self.sortable = false;
        self
    }

    /// Makes the attribute writable by the storage only.
    pub fn read_only(mut self) -> Self {
        self.creatable = false;
        self.updatable = false;
        self
    }

    /// Returns the declared type.
    pub fn attr_type(&self) -> AttrType {
        self.schema.attr_type
    }

    /// True for readable string attributes that free-text queries scan.
    ///
    /// Identifier-like names (ending in `id`) are excluded.
    pub fn is_text_searchable(&self) -> bool {
        self.readable
            && self.schema.attr_type == AttrType::String
            && !self.name.to_lowercase().ends_with("id")
    }
}
