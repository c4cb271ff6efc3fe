//! Storage metadata.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::{StorageError, StorageResult, ValidationError};
use crate::meta::{AccessControl, Attr, AttrGenerator, CacheControl, ItemSchema, KeyConfig};
use crate::types::{CacheHeader, Item};

const DEFAULT_BATCH_SIZE: usize = 100;

/// Immutable description of a storage: its attributes, key strategy,
/// capabilities, cache policy and maximum page size.
///
/// Wrappers never mutate the meta of their delegate; they derive a new one
/// with the `derive_*` methods, which only touch the field named.
///
/// # Examples
///
/// ```
/// use persisty_storage::meta::{Attr, KeyConfig, StorageMeta};
///
/// let meta = StorageMeta::builder("books")
///     .attr(Attr::string("id"))
///     .attr(Attr::string("title"))
///     .attr(Attr::int("year"))
///     .key_config(KeyConfig::attr("id"))
///     .batch_size(50)
///     .build()
///     .unwrap();
///
/// assert_eq!(meta.attr("year").unwrap().name, "year");
/// assert_eq!(meta.batch_size(), 50);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageMeta {
    name: String,
    attrs: Vec<Attr>,
    key_config: KeyConfig,
    #[serde(default)]
    access_control: AccessControl,
    #[serde(default)]
    cache_control: CacheControl,
    #[serde(default = "default_batch_size")]
    batch_size: usize,
    #[serde(default)]
    description: Option<String>,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

impl StorageMeta {
    /// Starts building a meta with the given storage name.
    pub fn builder(name: impl Into<String>) -> StorageMetaBuilder {
        StorageMetaBuilder {
            name: name.into(),
            attrs: Vec::new(),
            key_config: None,
            access_control: AccessControl::ALL_ACCESS,
            cache_control: CacheControl::SecureHash,
            batch_size: DEFAULT_BATCH_SIZE,
            description: None,
        }
    }

    /// Returns the storage name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the attributes, in declaration order.
    pub fn attrs(&self) -> &[Attr] {
        &self.attrs
    }

    /// Looks up an attribute by name.
    pub fn attr(&self, name: &str) -> Option<&Attr> {
        self.attrs.iter().find(|a| a.name == name)
    }

    /// Returns the key strategy.
    pub fn key_config(&self) -> &KeyConfig {
        &self.key_config
    }

    /// Returns the capabilities.
    pub fn access_control(&self) -> AccessControl {
        self.access_control
    }

    /// Returns the cache policy.
    pub fn cache_control(&self) -> &CacheControl {
        &self.cache_control
    }

    /// Returns the maximum page size.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Returns the optional description.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Derives a meta with different capabilities.
    pub fn derive_access_control(&self, access_control: AccessControl) -> Self {
        Self {
            access_control,
            ..self.clone()
        }
    }

    /// Derives a meta with a different cache policy.
    pub fn derive_cache_control(&self, cache_control: CacheControl) -> Self {
        Self {
            cache_control,
            ..self.clone()
        }
    }

    /// Derives a meta with the given attributes replaced by name.
    pub fn derive_attrs<F>(&self, mut rewrite: F) -> Self
    where
        F: FnMut(&Attr) -> Attr,
    {
        Self {
            attrs: self.attrs.iter().map(&mut rewrite).collect(),
            ..self.clone()
        }
    }

    /// Extracts the key of an item.
    pub fn key_of(&self, item: &Item) -> StorageResult<String> {
        self.key_config.get_key(item).ok_or_else(|| {
            let field = self
                .key_config
                .attr_names()
                .into_iter()
                .find(|name| item.get(*name).is_none_or(|v| v.is_null()))
                .unwrap_or_default()
                .to_string();
            StorageError::Validation(ValidationError::MissingField {
                storage: self.name.clone(),
                field,
            })
        })
    }

    /// Converts a key into its typed key attributes.
    pub fn key_item(&self, key: &str) -> StorageResult<Item> {
        self.key_config
            .key_values(key, &self.attrs)
            .ok_or_else(|| StorageError::missing(&self.name, key))
    }

    /// Writes the key attributes for `key` into the item.
    pub fn set_key(&self, key: &str, item: &mut Item) -> StorageResult<()> {
        if self.key_config.set_key(key, item, &self.attrs) {
            Ok(())
        } else {
            Err(StorageError::missing(&self.name, key))
        }
    }

    /// Resolves a requested page size, defaulting to the batch size.
    pub fn check_limit(&self, limit: Option<usize>) -> StorageResult<usize> {
        let limit = limit.unwrap_or(self.batch_size);
        if limit == 0 || limit > self.batch_size {
            return Err(StorageError::InvalidLimit {
                storage: self.name.clone(),
                limit,
                max: self.batch_size,
            });
        }
        Ok(limit)
    }

    /// Applies key generation and create generators to a new item.
    pub fn apply_create_generators(&self, item: &mut Item, clock: &dyn Clock) {
        self.key_config.generate_key(item);
        for attr in &self.attrs {
            if let Some(generator) = &attr.create_generator {
                apply_generator(item, &attr.name, generator, clock);
            }
        }
    }

    /// Applies update generators to a replacement item.
    pub fn apply_update_generators(&self, item: &mut Item, clock: &dyn Clock) {
        for attr in &self.attrs {
            if let Some(generator) = &attr.update_generator {
                apply_generator(item, &attr.name, generator, clock);
            }
        }
    }

    /// Returns the attribute assigned by a backend sequence, if any.
    pub fn sequence_attr(&self) -> Option<&Attr> {
        self.attrs
            .iter()
            .find(|a| matches!(a.create_generator, Some(AttrGenerator::Sequence)))
    }

    /// Derives the create input schema.
    pub fn create_schema(&self) -> ItemSchema {
        ItemSchema::for_create(self)
    }

    /// Derives the update input schema.
    pub fn update_schema(&self) -> ItemSchema {
        ItemSchema::for_update(self)
    }

    /// Builds the cache header for one item.
    pub fn cache_header(&self, item: &Item, clock: &dyn Clock) -> StorageResult<CacheHeader> {
        let key = self.key_of(item)?;
        Ok(self.cache_control.header(&key, item, clock))
    }

    /// Removes attributes that are not readable from an item.
    pub fn strip_unreadable(&self, item: &mut Item) {
        for attr in self.attrs.iter().filter(|a| !a.readable) {
            item.remove(&attr.name);
        }
    }
}

fn apply_generator(item: &mut Item, name: &str, generator: &AttrGenerator, clock: &dyn Clock) {
    if let Some(value) = generator.generate(item.get(name), clock) {
        item.insert(name.to_string(), value);
    }
}

/// Builder for [`StorageMeta`].
#[derive(Debug, Clone)]
pub struct StorageMetaBuilder {
    name: String,
    attrs: Vec<Attr>,
    key_config: Option<KeyConfig>,
    access_control: AccessControl,
    cache_control: CacheControl,
    batch_size: usize,
    description: Option<String>,
}

impl StorageMetaBuilder {
    /// Adds an attribute.
    pub fn attr(mut self, attr: Attr) -> Self {
        self.attrs.push(attr);
        self
    }

    /// Adds several attributes.
    pub fn attrs(mut self, attrs: impl IntoIterator<Item = Attr>) -> Self {
        self.attrs.extend(attrs);
        self
    }

    /// Sets the key strategy. Defaults to the first attribute.
    pub fn key_config(mut self, key_config: KeyConfig) -> Self {
        self.key_config = Some(key_config);
        self
    }

    /// Sets the capabilities.
    pub fn access_control(mut self, access_control: AccessControl) -> Self {
        self.access_control = access_control;
        self
    }

    /// Sets the cache policy.
    pub fn cache_control(mut self, cache_control: CacheControl) -> Self {
        self.cache_control = cache_control;
        self
    }

    /// Sets the maximum page size.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Validates and builds the meta.
    pub fn build(self) -> Result<StorageMeta, ValidationError> {
        let invalid = |message: String| ValidationError::InvalidMeta {
            storage: self.name.clone(),
            message,
        };

        let mut seen = HashSet::new();
        for attr in &self.attrs {
            if !seen.insert(attr.name.as_str()) {
                return Err(invalid(format!("duplicate attribute '{}'", attr.name)));
            }
        }

        let key_config = match self.key_config.clone() {
            Some(key_config) => key_config,
            None => {
                let first = self
                    .attrs
                    .first()
                    .ok_or_else(|| invalid("no attributes declared".to_string()))?;
                KeyConfig::attr(first.name.clone())
            }
        };
        for name in key_config.attr_names() {
            if !seen.contains(name) {
                return Err(invalid(format!("key attribute '{name}' is not declared")));
            }
        }

        if self.batch_size == 0 {
            return Err(invalid("batch size must be positive".to_string()));
        }

        let mut control = &self.cache_control;
        while let CacheControl::Ttl { inner, .. } = control {
            control = inner;
        }
        if let CacheControl::Timestamp { updated_at_attr } = control {
            if !seen.contains(updated_at_attr.as_str()) {
                return Err(invalid(format!(
                    "cache attribute '{updated_at_attr}' is not declared"
                )));
            }
        }

        Ok(StorageMeta {
            name: self.name,
            attrs: self.attrs,
            key_config,
            access_control: self.access_control,
            cache_control: self.cache_control,
            batch_size: self.batch_size,
            description: self.description,
        })
    }
}
