//! The DynamoDB API surface used by [`DynamoStorage`](super::DynamoStorage).
//!
//! Requests carry structured key conditions and filter conditions rather than
//! expression strings, so an in-process emulator can evaluate them directly
//! and the SDK client renders them at the wire boundary.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::expression::{Condition, KeyCondition};
use super::index::DynamoIndex;
use crate::error::{BackendError, StorageError};

pub(crate) const BACKEND_NAME: &str = "dynamodb";

/// An attribute value in DynamoDB's type system.
#[derive(Debug, Clone, PartialEq)]
pub enum DynamoValue {
    /// String.
    S(String),
    /// Number, in its decimal string form.
    N(String),
    /// Boolean.
    Bool(bool),
    /// Explicit null.
    Null,
    /// List.
    L(Vec<DynamoValue>),
    /// Map.
    M(BTreeMap<String, DynamoValue>),
}

impl DynamoValue {
    /// Returns the single-letter type descriptor.
    pub fn type_name(&self) -> &'static str {
        match self {
            DynamoValue::S(_) => "S",
            DynamoValue::N(_) => "N",
            DynamoValue::Bool(_) => "BOOL",
            DynamoValue::Null => "NULL",
            DynamoValue::L(_) => "L",
            DynamoValue::M(_) => "M",
        }
    }

    /// Returns true for `S` and `N`, the only types valid in key attributes.
    pub fn is_key_scalar(&self) -> bool {
        matches!(self, DynamoValue::S(_) | DynamoValue::N(_))
    }
}

/// An item as stored in a table.
pub type DynamoItem = BTreeMap<String, DynamoValue>;

/// Scalar type of a key attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarType {
    /// String.
    S,
    /// Number.
    N,
}

/// Role of an attribute in a key schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum KeyType {
    /// Partition key.
    Hash,
    /// Sort key.
    Range,
}

/// One entry of a key schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KeySchemaElement {
    /// Attribute name.
    pub attribute_name: String,
    /// Hash or range.
    pub key_type: KeyType,
}

/// Everything needed to create a table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDefinition {
    /// Table name.
    pub table_name: String,
    /// Primary index.
    pub primary: DynamoIndex,
    /// Global secondary indexes.
    pub global_secondary_indexes: Vec<DynamoIndex>,
    /// Scalar types of every attribute used in any key schema.
    pub attribute_definitions: BTreeMap<String, ScalarType>,
}

/// Guard evaluated atomically with a write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteCondition {
    /// The write succeeds only if no item has this key.
    NotExists(String),
    /// The write succeeds only if an item has this key.
    Exists(String),
}

/// A conditional put.
#[derive(Debug, Clone, PartialEq)]
pub struct PutRequest {
    /// Target table.
    pub table_name: String,
    /// Full replacement item.
    pub item: DynamoItem,
    /// Optional guard.
    pub condition: Option<WriteCondition>,
}

/// A query on one index, or a scan when `key_condition` is `None`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReadRequest {
    /// Target table.
    pub table_name: String,
    /// GSI name; `None` reads the primary index.
    pub index_name: Option<String>,
    /// Key condition; `None` means scan.
    pub key_condition: Option<KeyCondition>,
    /// Server-side filter.
    pub filter: Option<Condition>,
    /// Resume after this key.
    pub exclusive_start_key: Option<DynamoItem>,
    /// Maximum number of items evaluated.
    pub limit: Option<usize>,
    /// Sort key direction for queries.
    pub scan_forward: bool,
    /// Return only the count.
    pub select_count: bool,
}

/// One page of a query or scan.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReadOutput {
    /// Matching items, empty when counting.
    pub items: Vec<DynamoItem>,
    /// Number of matching items in this page.
    pub count: usize,
    /// Resume key, present if more items may follow.
    pub last_evaluated_key: Option<DynamoItem>,
}

/// One round of a batch get.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchGetOutput {
    /// Items found, in no particular order.
    pub items: Vec<DynamoItem>,
    /// Keys the service did not process this round.
    pub unprocessed_keys: Vec<DynamoItem>,
}

/// Errors returned by a [`DynamoApi`] implementation.
#[derive(Error, Debug)]
pub enum DynamoClientError {
    /// A write condition was not met.
    #[error("conditional check failed")]
    ConditionalCheckFailed,

    /// The table or index does not exist.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// The request was rejected as malformed.
    #[error("validation error: {0}")]
    Validation(String),

    /// Any other service or transport failure.
    #[error("service error: {0}")]
    Service(String),
}

/// Result type for [`DynamoApi`] calls.
pub type DynamoClientResult<T> = Result<T, DynamoClientError>;

impl From<DynamoClientError> for StorageError {
    fn from(err: DynamoClientError) -> Self {
        match err {
            DynamoClientError::Service(message) => {
                StorageError::Backend(BackendError::ConnectionFailed {
                    backend_name: BACKEND_NAME.to_string(),
                    message,
                })
            }
            other => StorageError::Backend(BackendError::Internal {
                backend_name: BACKEND_NAME.to_string(),
                message: other.to_string(),
                source: Some(Box::new(other)),
            }),
        }
    }
}

/// Blocking access to a DynamoDB-compatible service.
///
/// Implementations hold process-lifetime client handles and are shared
/// between storages through `Arc`.
pub trait DynamoApi: Send + Sync + fmt::Debug {
    /// Creates a table, returning false if it already exists.
    fn create_table(&self, definition: &TableDefinition) -> DynamoClientResult<bool>;

    /// Reads one item by its full primary key.
    fn get_item(&self, table_name: &str, key: &DynamoItem) -> DynamoClientResult<Option<DynamoItem>>;

    /// Writes one item.
    fn put_item(&self, request: PutRequest) -> DynamoClientResult<()>;

    /// Deletes one item, returning its previous value.
    fn delete_item(&self, table_name: &str, key: &DynamoItem) -> DynamoClientResult<Option<DynamoItem>>;

    /// Reads up to 100 items by key.
    fn batch_get_item(&self, table_name: &str, keys: &[DynamoItem]) -> DynamoClientResult<BatchGetOutput>;

    /// Runs one page of a query or scan.
    fn read(&self, request: &ReadRequest) -> DynamoClientResult<ReadOutput>;
}
