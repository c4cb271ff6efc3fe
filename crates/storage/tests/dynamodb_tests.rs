//! DynamoDB backend integration tests over the local emulator.
//!
//! The emulator is capped at a couple of items per query page so every
//! search has to follow `LastEvaluatedKey` through several internal pages.

#![cfg(feature = "dynamodb")]

mod common;

use std::sync::Arc;

use persisty_storage::backends::dynamodb::{
    DynamoIndex, DynamoStorage, DynamoStorageConfig, LocalDynamoClient, ScalarType,
};
use persisty_storage::core::Storage;
use persisty_storage::filter::{Comparator, Filter, SearchFilter, attr};

use common::*;

fn books_over(client: Arc<LocalDynamoClient>, max_internal_pages: usize) -> DynamoStorage {
    let config = DynamoStorageConfig {
        indexes: vec![DynamoIndex::global("by_genre", "genre", Some("year"))],
        create_table: true,
        batch_read_size: 3,
        max_internal_pages,
        ..DynamoStorageConfig::default()
    };
    let storage = DynamoStorage::new(books_meta(4), client, config).unwrap();
    for book in books() {
        storage.create(book.to_item()).unwrap();
    }
    storage
}

fn small_pages() -> Arc<LocalDynamoClient> {
    Arc::new(LocalDynamoClient::new().with_page_size(2))
}

#[test]
fn test_table_definition() {
    let storage = books_over(small_pages(), 10);
    let definition = storage.table_definition();
    assert_eq!(definition.table_name, "books");
    assert_eq!(definition.primary, DynamoIndex::primary("id", None));
    assert_eq!(definition.global_secondary_indexes.len(), 1);
    assert_eq!(definition.attribute_definitions["id"], ScalarType::S);
    assert_eq!(definition.attribute_definitions["genre"], ScalarType::S);
    assert_eq!(definition.attribute_definitions["year"], ScalarType::N);
    assert!(!definition.attribute_definitions.contains_key("rating"));
}

#[test]
fn test_tables_share_one_client() {
    let client = small_pages();
    let books = books_over(Arc::clone(&client), 10);
    let years = DynamoStorage::new(
        years_meta(),
        client.clone(),
        DynamoStorageConfig {
            create_table: true,
            ..DynamoStorageConfig::default()
        },
    )
    .unwrap();
    for item in common::years() {
        years.create(item).unwrap();
    }

    assert_eq!(client.item_count("books"), 10);
    assert_eq!(client.item_count("years"), 3);
    assert!(books.destroy("b01").unwrap());
    assert_eq!(client.item_count("books"), 9);
    assert_eq!(client.item_count("years"), 3);
}

#[test]
fn test_searches_follow_internal_pages() {
    let storage = books_over(small_pages(), 10);
    let reference = seeded_books(BackendKind::Memory, 4);
    for search in [
        SearchFilter::all(),
        SearchFilter::new(attr("genre").eq("scifi")),
        SearchFilter::new(attr("genre").eq("scifi") & attr("year").gt(1965)),
        SearchFilter::new(attr("title").contains("e")),
    ] {
        let expected = search_ids(reference.as_ref(), &search);
        assert_same_set(&search_ids(&storage, &search), &expected, &format!("{search:?}"));
        assert_eq!(
            storage.count(&search.filter).unwrap(),
            expected.len() as u64,
            "{search:?}"
        );
    }
}

#[test]
fn test_short_internal_budget_still_pages_everything() {
    // With one internal read per page, pages may come back short but must
    // still chain through the whole result.
    let storage = books_over(small_pages(), 1);
    let search = SearchFilter::new(attr("genre").eq("scifi")).order_by(attr("year").desc());
    for limit in 1..=4 {
        let (ids, _) = page_through(&storage, &search, limit);
        assert_eq!(ids, vec!["b02", "b05", "b07", "b01", "b09"], "limit {limit}");
    }

    let scan = SearchFilter::new(attr("year").gt(1900));
    let (ids, _) = page_through(&storage, &scan, 3);
    assert_eq!(ids.len(), 9);
}

#[test]
fn test_client_side_order_pages() {
    let storage = books_over(small_pages(), 10);
    let search = SearchFilter::all().order_by(Comparator::multi([
        attr("rating").desc(),
        attr("id").asc(),
    ]));
    let (ids, pages) = page_through(&storage, &search, 4);
    assert_eq!(pages, 3);
    assert_eq!(&ids[..3], &["b03", "b01", "b05"]);
}

#[test]
fn test_read_all_batches() {
    let storage = books_over(small_pages(), 10);
    let mut keys: Vec<String> = books().iter().map(|b| b.id.to_string()).collect();
    keys.reverse();
    keys.push("missing".to_string());

    let items = storage.read_all(&keys, false).unwrap();
    assert_eq!(items.len(), 11);
    assert_eq!(items[0].as_ref().unwrap()["id"], "b10");
    assert_eq!(items[9].as_ref().unwrap()["id"], "b01");
    assert!(items[10].is_none());
    assert!(storage.read_all(&keys, true).unwrap_err().is_missing());
}

#[test]
fn test_sparse_index_skips_items_without_genre() {
    let storage = books_over(small_pages(), 10);
    assert_eq!(storage.count(&attr("genre").exists()).unwrap(), 8);
    let search = SearchFilter::new(Filter::negate(attr("genre").exists()));
    let mut ids = search_ids(&storage, &search);
    ids.sort();
    assert_eq!(ids, vec!["b04", "b08"]);
}
