//! DynamoDB backend implementation.
//!
//! # Architecture
//!
//! - [`index`] - index model and scoring; picks the index a search queries
//! - [`expression`] - splits a filter into a key condition and a filter
//!   condition, flagging what must be re-checked client-side
//! - [`cursor`] - page keys wrapping `LastEvaluatedKey`
//! - [`DynamoApi`] - the blocking client seam, implemented by
//!   [`LocalDynamoClient`] and, with the `dynamodb-aws` feature,
//!   `AwsDynamoClient`
//!
//! # Example
//!
//! ```
//! use persisty_storage::backends::dynamodb::{DynamoIndex, DynamoStorage};
//! use persisty_storage::core::Storage;
//! use persisty_storage::filter::{SearchFilter, attr};
//! use persisty_storage::meta::{Attr, StorageMeta};
//! use serde_json::json;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let meta = StorageMeta::builder("orders")
//!     .attr(Attr::string("id"))
//!     .attr(Attr::string("status"))
//!     .attr(Attr::datetime("created_at"))
//!     .build()?;
//! let gsi1 = DynamoIndex::global("gsi1", "status", Some("created_at"));
//! let storage = DynamoStorage::local(meta, vec![gsi1])?;
//!
//! let order = json!({"id": "o-1", "status": "shipped", "created_at": "2024-03-01T00:00:00Z"});
//! storage.create(order.as_object().cloned().unwrap())?;
//!
//! let search = SearchFilter::new(
//!     attr("status").eq("shipped") & attr("created_at").gt("2024-01-01"),
//! );
//! let page = storage.paged_search(&search, None, None)?;
//! assert_eq!(page.len(), 1);
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "dynamodb-aws")]
mod aws;
mod client;
mod conversions;
pub mod cursor;
pub mod expression;
pub mod index;
mod local;
mod storage;

#[cfg(feature = "dynamodb-aws")]
pub use aws::AwsDynamoClient;
pub use client::{
    BatchGetOutput, DynamoApi, DynamoClientError, DynamoClientResult, DynamoItem, DynamoValue,
    KeySchemaElement, KeyType, PutRequest, ReadOutput, ReadRequest, ScalarType, TableDefinition,
    WriteCondition,
};
pub use conversions::{from_dynamo, item_from_dynamo, item_to_dynamo, to_dynamo};
pub use expression::{Condition, KeyCondition, RenderedExpressions, SplitFilter, split_filter};
pub use index::{DynamoIndex, IndexChoice, select_index};
pub use local::LocalDynamoClient;
pub use storage::{DynamoStorage, DynamoStorageConfig};
