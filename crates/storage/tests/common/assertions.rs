//! Assertion helpers over keys and pages.

use persisty_storage::core::Storage;
use persisty_storage::filter::SearchFilter;
use persisty_storage::types::Item;

/// Returns the `id` of each item.
pub fn ids(items: &[Item]) -> Vec<String> {
    items
        .iter()
        .map(|item| item["id"].as_str().unwrap_or_default().to_string())
        .collect()
}

/// Runs a streaming search and returns the ids in result order.
pub fn search_ids(storage: &dyn Storage, search: &SearchFilter) -> Vec<String> {
    let items: Vec<Item> = storage
        .search(search)
        .expect("start search")
        .collect::<Result<_, _>>()
        .expect("search results");
    ids(&items)
}

/// Follows `next_page_key` until exhausted, returning ids and page count.
pub fn page_through(storage: &dyn Storage, search: &SearchFilter, limit: usize) -> (Vec<String>, usize) {
    let mut collected = Vec::new();
    let mut pages = 0;
    let mut page_key: Option<String> = None;
    loop {
        let page = storage
            .paged_search(search, page_key.as_deref(), Some(limit))
            .expect("paged search");
        pages += 1;
        assert!(page.len() <= limit, "page of {} exceeds limit {limit}", page.len());
        collected.extend(ids(&page.items));
        match page.next_page_key {
            Some(next) => page_key = Some(next),
            None => break,
        }
        assert!(pages <= 1000, "pagination did not terminate");
    }
    (collected, pages)
}

/// Asserts two id lists hold the same set of ids.
pub fn assert_same_set(actual: &[String], expected: &[String], context: &str) {
    let mut actual = actual.to_vec();
    let mut expected = expected.to_vec();
    actual.sort();
    expected.sort();
    assert_eq!(actual, expected, "{context}");
}
