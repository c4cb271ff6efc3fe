//! Page keys for DynamoDB searches.
//!
//! A native page key wraps DynamoDB's `LastEvaluatedKey`: the table key
//! attributes plus, when reading a global secondary index, that index's key
//! attributes. Searches that had to be sorted client-side use offset page
//! keys instead, see [`offset_page`](crate::core::offset_page).

use super::client::DynamoItem;
use super::conversions::{item_from_dynamo, item_to_dynamo};
use super::index::DynamoIndex;
use crate::error::{StorageError, StorageResult};
use crate::meta::StorageMeta;
use crate::types::PageCursor;

/// Encodes a resume key as an opaque page key bound to a search.
pub fn encode_start_key(key: &DynamoItem, fingerprint: String) -> String {
    PageCursor::after_key(item_from_dynamo(key), Some(fingerprint)).encode()
}

/// Decodes a page key issued by [`encode_start_key`] for the same search.
///
/// The key must carry every key attribute of the table and of `index`.
pub fn decode_start_key(
    meta: &StorageMeta,
    table_index: &DynamoIndex,
    index: Option<&DynamoIndex>,
    page_key: &str,
    fingerprint: &str,
) -> StorageResult<DynamoItem> {
    let invalid = || StorageError::InvalidPageKey {
        storage: meta.name().to_string(),
        page_key: page_key.to_string(),
    };

    let cursor = PageCursor::decode_for(page_key, meta.name(), Some(fingerprint))?;
    let key = cursor.key_value().ok_or_else(invalid)?;
    let complete = table_index
        .key_attrs()
        .into_iter()
        .chain(index.map(DynamoIndex::key_attrs).unwrap_or_default())
        .all(|name| key.contains_key(name));
    if !complete {
        return Err(invalid());
    }
    Ok(item_to_dynamo(key))
}

/// Projects an item onto the attributes DynamoDB needs to resume after it.
pub fn start_key_of(item: &DynamoItem, table_index: &DynamoIndex, index: Option<&DynamoIndex>) -> DynamoItem {
    let mut names = table_index.key_attrs();
    if let Some(index) = index {
        names.extend(index.key_attrs());
    }
    names
        .into_iter()
        .filter_map(|name| item.get(name).map(|v| (name.to_string(), v.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::dynamodb::client::DynamoValue;
    use crate::meta::Attr;

    fn meta() -> StorageMeta {
        StorageMeta::builder("orders")
            .attr(Attr::string("id"))
            .attr(Attr::string("status"))
            .attr(Attr::int("total"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_start_key_round_trip_on_gsi() {
        let table = DynamoIndex::primary("id", None);
        let gsi = DynamoIndex::global("by_status", "status", Some("total"));
        let item: DynamoItem = [
            ("id", DynamoValue::S("o-1".to_string())),
            ("status", DynamoValue::S("open".to_string())),
            ("total", DynamoValue::N("12".to_string())),
            ("note", DynamoValue::S("gift".to_string())),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let start = start_key_of(&item, &table, Some(&gsi));
        assert_eq!(start.len(), 3);
        assert!(!start.contains_key("note"));

        let page_key = encode_start_key(&start, "f".to_string());
        let decoded = decode_start_key(&meta(), &table, Some(&gsi), &page_key, "f").unwrap();
        assert_eq!(decoded, start);
    }

    #[test]
    fn test_incomplete_or_foreign_keys_are_rejected() {
        let table = DynamoIndex::primary("id", None);
        let gsi = DynamoIndex::global("by_status", "status", None);
        let start: DynamoItem = [("id".to_string(), DynamoValue::S("o-1".to_string()))]
            .into_iter()
            .collect();
        let page_key = encode_start_key(&start, "f".to_string());

        let err = decode_start_key(&meta(), &table, Some(&gsi), &page_key, "f").unwrap_err();
        assert!(matches!(err, StorageError::InvalidPageKey { .. }));

        let err = decode_start_key(&meta(), &table, None, &page_key, "g").unwrap_err();
        assert!(matches!(err, StorageError::InvalidPageKey { .. }));

        let offset = PageCursor::offset(3, Some("f".to_string())).encode();
        assert!(decode_start_key(&meta(), &table, None, &offset, "f").is_err());
    }
}
