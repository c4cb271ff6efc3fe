//! Declarative storage configuration.
//!
//! A [`StorageConfig`] names a meta, a backend and a wrapper stack. It is
//! plain serde data, so whole deployments can be described in JSON:
//!
//! ```
//! use persisty_storage::config::StorageConfig;
//! use persisty_storage::registry::StorageRegistry;
//! use serde_json::json;
//!
//! let config: StorageConfig = serde_json::from_value(json!({
//!     "meta": {
//!         "name": "books",
//!         "attrs": [
//!             {"name": "id", "schema": {"attr_type": "string"}},
//!             {"name": "genre", "schema": {"attr_type": "string"}}
//!         ]
//!     },
//!     "backend": {"kind": "memory"},
//!     "wrappers": [
//!         {"kind": "validate"},
//!         {"kind": "filter", "filter": {"attr": {"name": "genre", "op": "eq", "value": "poetry"}}},
//!         {"kind": "logging"}
//!     ]
//! }))
//! .unwrap();
//!
//! let registry = StorageRegistry::new();
//! let books = registry.register_config(&config).unwrap();
//! assert_eq!(books.meta().name(), "books");
//! ```
//!
//! Wrappers are applied in list order, so the first entry is the innermost
//! layer.

use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backends::memory::MemStorage;
use crate::clock::{Clock, SystemClock};
use crate::error::{StorageResult, ValidationError};
use crate::filter::Filter;
use crate::meta::{AccessControl, Attr, CacheControl, KeyConfig, StorageMeta};
use crate::registry::{DynStorage, StorageRegistry};
use crate::wrappers::{
    AccessFilteredStorage, DEFAULT_CREATED_AT, DEFAULT_UPDATED_AT, FilteredStorage,
    LoggingStorage, SchemaValidatedStorage, TimestampedStorage, TtlCacheStorage,
};

#[cfg(feature = "sqlite")]
use crate::backends::sqlite::{SqlStorage, SqlStorageConfig};

#[cfg(feature = "dynamodb")]
use crate::backends::dynamodb::{DynamoStorage, DynamoStorageConfig, LocalDynamoClient};

/// Complete description of one storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Attributes and policies.
    pub meta: MetaConfig,

    /// Where items are kept.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Wrappers, innermost first.
    #[serde(default)]
    pub wrappers: Vec<WrapperConfig>,
}

impl StorageConfig {
    /// Parses a configuration from JSON.
    pub fn from_json(json: &str) -> StorageResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Builds the storage using the system clock.
    pub fn build(&self) -> StorageResult<DynStorage> {
        self.build_with_clock(Arc::new(SystemClock))
    }

    /// Builds the storage, handing `clock` to the backend and to every
    /// wrapper that reads the time.
    pub fn build_with_clock(&self, clock: Arc<dyn Clock>) -> StorageResult<DynStorage> {
        let meta = self.meta.build()?;
        let mut storage = self.backend.build(meta, clock.clone())?;
        for wrapper in &self.wrappers {
            storage = wrapper.apply(storage, clock.clone())?;
        }
        debug!(
            storage = %self.meta.name,
            wrappers = self.wrappers.len(),
            "built storage from config"
        );
        Ok(storage)
    }
}

/// Serializable form of a [`StorageMeta`], validated through its builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaConfig {
    /// Storage name.
    pub name: String,

    /// Attributes, in declaration order.
    pub attrs: Vec<Attr>,

    /// Key strategy; defaults to the first attribute.
    #[serde(default)]
    pub key_config: Option<KeyConfig>,

    /// Capabilities; defaults to full access.
    #[serde(default)]
    pub access_control: Option<AccessControl>,

    /// Cache policy; defaults to a secure hash.
    #[serde(default)]
    pub cache_control: Option<CacheControl>,

    /// Maximum page size.
    #[serde(default)]
    pub batch_size: Option<usize>,

    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
}

impl MetaConfig {
    /// Validates and builds the meta.
    pub fn build(&self) -> Result<StorageMeta, ValidationError> {
        let mut builder = StorageMeta::builder(self.name.clone()).attrs(self.attrs.iter().cloned());
        if let Some(key_config) = &self.key_config {
            builder = builder.key_config(key_config.clone());
        }
        if let Some(access_control) = self.access_control {
            builder = builder.access_control(access_control);
        }
        if let Some(cache_control) = &self.cache_control {
            builder = builder.cache_control(cache_control.clone());
        }
        if let Some(batch_size) = self.batch_size {
            builder = builder.batch_size(batch_size);
        }
        if let Some(description) = &self.description {
            builder = builder.description(description.clone());
        }
        builder.build()
    }
}

/// Which DynamoDB client a configured storage talks to.
#[cfg(feature = "dynamodb")]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DynamoClientKind {
    /// The in-process emulator.
    #[default]
    Local,
    /// The AWS SDK client (requires the `dynamodb-aws` feature).
    Aws,
}

/// Backend selection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// In-process map.
    #[default]
    Memory,

    /// SQLite database.
    #[cfg(feature = "sqlite")]
    Sqlite(SqlStorageConfig),

    /// DynamoDB table.
    #[cfg(feature = "dynamodb")]
    Dynamodb {
        /// Client implementation.
        #[serde(default)]
        client: DynamoClientKind,
        /// Table settings.
        #[serde(flatten)]
        config: DynamoStorageConfig,
    },
}

impl BackendConfig {
    /// Opens the backend for `meta`.
    pub fn build(&self, meta: StorageMeta, clock: Arc<dyn Clock>) -> StorageResult<DynStorage> {
        match self {
            BackendConfig::Memory => Ok(Arc::new(MemStorage::with_clock(meta, clock))),
            #[cfg(feature = "sqlite")]
            BackendConfig::Sqlite(config) => {
                Ok(Arc::new(SqlStorage::new(meta, config.clone())?.with_clock(clock)))
            }
            #[cfg(feature = "dynamodb")]
            BackendConfig::Dynamodb { client, config } => {
                build_dynamo(meta, *client, config, clock)
            }
        }
    }
}

#[cfg(feature = "dynamodb")]
fn build_dynamo(
    meta: StorageMeta,
    client: DynamoClientKind,
    config: &DynamoStorageConfig,
    clock: Arc<dyn Clock>,
) -> StorageResult<DynStorage> {
    let storage = match client {
        DynamoClientKind::Local => {
            // A fresh emulator is empty, so its table always has to be created.
            let config = DynamoStorageConfig {
                create_table: true,
                ..config.clone()
            };
            DynamoStorage::new(meta, Arc::new(LocalDynamoClient::new()), config)?
        }
        #[cfg(feature = "dynamodb-aws")]
        DynamoClientKind::Aws => {
            let aws = crate::backends::dynamodb::AwsDynamoClient::connect(config)?;
            DynamoStorage::new(meta, Arc::new(aws), config.clone())?
        }
        #[cfg(not(feature = "dynamodb-aws"))]
        DynamoClientKind::Aws => {
            return Err(ValidationError::InvalidMeta {
                storage: meta.name().to_string(),
                message: "the aws dynamodb client requires the dynamodb-aws feature".to_string(),
            }
            .into());
        }
    };
    Ok(Arc::new(storage.with_clock(clock)))
}

/// Settings for [`TtlCacheStorage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlCacheConfig {
    /// Time to live of a cached item in milliseconds.
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,
}

fn default_ttl_ms() -> u64 {
    30_000
}

impl Default for TtlCacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_ttl_ms(),
        }
    }
}

impl TtlCacheConfig {
    /// Returns the time to live as a duration.
    pub fn ttl(&self) -> Duration {
        Duration::milliseconds(i64::try_from(self.ttl_ms).unwrap_or(i64::MAX))
    }
}

fn default_created_at() -> String {
    DEFAULT_CREATED_AT.to_string()
}

fn default_updated_at() -> String {
    DEFAULT_UPDATED_AT.to_string()
}

/// One layer of a wrapper stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WrapperConfig {
    /// [`AccessFilteredStorage`].
    Access(AccessControl),

    /// [`FilteredStorage`].
    Filter {
        /// Items outside this filter are invisible.
        filter: Filter,
    },

    /// [`TimestampedStorage`].
    Timestamp {
        /// Creation time attribute.
        #[serde(default = "default_created_at")]
        created_at: String,
        /// Update time attribute.
        #[serde(default = "default_updated_at")]
        updated_at: String,
    },

    /// [`SchemaValidatedStorage`].
    Validate,

    /// [`TtlCacheStorage`].
    TtlCache(TtlCacheConfig),

    /// [`LoggingStorage`].
    Logging,
}

impl WrapperConfig {
    /// Wraps `inner` in this layer.
    pub fn apply(&self, inner: DynStorage, clock: Arc<dyn Clock>) -> StorageResult<DynStorage> {
        let wrapped: DynStorage = match self {
            WrapperConfig::Access(access_control) => {
                Arc::new(AccessFilteredStorage::new(inner, *access_control))
            }
            WrapperConfig::Filter { filter } => {
                Arc::new(FilteredStorage::new(inner, filter.clone()))
            }
            WrapperConfig::Timestamp {
                created_at,
                updated_at,
            } => Arc::new(TimestampedStorage::with_attr_names(
                inner,
                created_at.as_str(),
                updated_at.as_str(),
                clock,
            )?),
            WrapperConfig::Validate => Arc::new(SchemaValidatedStorage::new(inner)),
            WrapperConfig::TtlCache(config) => {
                Arc::new(TtlCacheStorage::with_clock(inner, config.ttl(), clock))
            }
            WrapperConfig::Logging => Arc::new(LoggingStorage::new(inner)),
        };
        Ok(wrapped)
    }
}

impl StorageRegistry {
    /// Builds a storage from `config` and registers it.
    ///
    /// # Returns
    ///
    /// The registered storage.
    pub fn register_config(&self, config: &StorageConfig) -> StorageResult<DynStorage> {
        let storage = config.build()?;
        self.register(storage.clone())?;
        Ok(storage)
    }

    /// Builds and registers every configuration, stopping at the first error.
    pub fn register_configs<'a, I>(&self, configs: I) -> StorageResult<()>
    where
        I: IntoIterator<Item = &'a StorageConfig>,
    {
        for config in configs {
            self.register_config(config)?;
        }
        Ok(())
    }
}
