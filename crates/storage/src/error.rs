//! Error types for the storage layer.
//!
//! This module defines the error taxonomy shared by every backend and wrapper.
//! Access and validation failures are raised before any backend call is made;
//! driver failures are caught at the translation boundary (SQL, DynamoDB) and
//! rewrapped as [`BackendError`] so no driver-specific type leaks out.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use std::fmt;

use thiserror::Error;

/// The primary error type for all storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// A capability check failed.
    #[error("access denied: {operation} on {storage}{}", key_suffix(.key))]
    AccessDenied {
        storage: String,
        operation: Operation,
        key: Option<String>,
    },

    /// A create collided with an existing record.
    #[error("duplicate key: {storage}/{key}")]
    DuplicateKey { storage: String, key: String },

    /// An update, destroy or strict read_all referenced an absent key.
    #[error("missing item: {storage}/{key}")]
    MissingItem { storage: String, key: String },

    /// The requested page size is outside `1..=max`.
    #[error("invalid limit for {storage}: {limit} (maximum is {max})")]
    InvalidLimit {
        storage: String,
        limit: usize,
        max: usize,
    },

    /// The page key does not belong to the current search or dataset.
    #[error("invalid page key for {storage}: {page_key}")]
    InvalidPageKey { storage: String, page_key: String },

    /// Schema / filter validation errors.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Backend-specific errors.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

fn key_suffix(key: &Option<String>) -> String {
    key.as_ref().map(|k| format!("/{k}")).unwrap_or_default()
}

impl StorageError {
    /// Creates an access denied error for an operation without a key.
    pub fn access_denied(storage: impl Into<String>, operation: Operation) -> Self {
        StorageError::AccessDenied {
            storage: storage.into(),
            operation,
            key: None,
        }
    }

    /// Creates a missing item error.
    pub fn missing(storage: impl Into<String>, key: impl Into<String>) -> Self {
        StorageError::MissingItem {
            storage: storage.into(),
            key: key.into(),
        }
    }

    /// Creates a duplicate key error.
    pub fn duplicate(storage: impl Into<String>, key: impl Into<String>) -> Self {
        StorageError::DuplicateKey {
            storage: storage.into(),
            key: key.into(),
        }
    }

    /// Returns true if this is a missing item error.
    pub fn is_missing(&self) -> bool {
        matches!(self, StorageError::MissingItem { .. })
    }
}

/// Operations guarded by access control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Create new items.
    Create,
    /// Read items by key.
    Read,
    /// Replace existing items.
    Update,
    /// Delete items.
    Destroy,
    /// Search / count / paged search.
    Search,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => write!(f, "create"),
            Operation::Read => write!(f, "read"),
            Operation::Update => write!(f, "update"),
            Operation::Destroy => write!(f, "destroy"),
            Operation::Search => write!(f, "search"),
        }
    }
}

/// Errors raised when an item, filter or meta fails a schema check.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A required attribute is absent.
    #[error("{storage}: missing required field '{field}'")]
    MissingField { storage: String, field: String },

    /// The item carries an attribute the storage does not declare.
    #[error("{storage}: unknown field '{field}'")]
    UnknownField { storage: String, field: String },

    /// The attribute may not be supplied for this operation.
    #[error("{storage}: field '{field}' is not writable on {operation}")]
    ReadOnlyField {
        storage: String,
        field: String,
        operation: Operation,
    },

    /// The value does not match the declared attribute type.
    #[error("{storage}: field '{field}' expected {expected}, got {actual}")]
    TypeMismatch {
        storage: String,
        field: String,
        expected: String,
        actual: String,
    },

    /// A bounded string exceeded its maximum length.
    #[error("{storage}: field '{field}' exceeds maximum length {max_length}")]
    TooLong {
        storage: String,
        field: String,
        max_length: usize,
    },

    /// A filter references an attribute that cannot be searched.
    #[error("{storage}: field '{field}' is not searchable")]
    NotSearchable { storage: String, field: String },

    /// A comparator references an attribute that cannot be sorted.
    #[error("{storage}: field '{field}' is not sortable")]
    NotSortable { storage: String, field: String },

    /// The item was rejected by a storage-level filter.
    #[error("{storage}: item{} is outside the permitted filter", key_suffix(.key))]
    FilterRejected { storage: String, key: Option<String> },

    /// The storage metadata itself is inconsistent.
    #[error("invalid storage meta '{storage}': {message}")]
    InvalidMeta { storage: String, message: String },
}

/// Errors originating from a database driver or remote service.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Connection to the backend failed.
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    /// Connection pool exhausted.
    #[error("connection pool exhausted for {backend_name}")]
    PoolExhausted { backend_name: String },

    /// Query execution error.
    #[error("query execution failed in {backend_name}: {message}")]
    Query {
        backend_name: String,
        message: String,
    },

    /// Internal backend error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {message}")]
    Serialization { message: String },
}

impl BackendError {
    /// Creates a query error for the given backend.
    pub fn query(backend_name: &str, message: impl Into<String>) -> Self {
        BackendError::Query {
            backend_name: backend_name.to_string(),
            message: message.into(),
        }
    }
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Backend(BackendError::Serialization {
            message: err.to_string(),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Backend(BackendError::Internal {
            backend_name: "sqlite".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<r2d2::Error> for StorageError {
    fn from(_err: r2d2::Error) -> Self {
        StorageError::Backend(BackendError::PoolExhausted {
            backend_name: "sqlite".to_string(),
        })
    }
}
