//! Backend parity tests.
//!
//! Every backend must return the same items as `MemStorage` for the same
//! filter, comparator and dataset.

mod common;

use persisty_storage::filter::{Comparator, Filter, SearchFilter, attr};

use common::*;

fn filters() -> Vec<(&'static str, Filter)> {
    vec![
        ("include all", Filter::IncludeAll),
        ("exclude all", Filter::ExcludeAll),
        ("year gte", attr("year").gte(1970)),
        ("year lt", attr("year").lt(1950)),
        ("year eq", attr("year").eq(1965)),
        ("genre eq", attr("genre").eq("scifi")),
        ("genre ne", attr("genre").ne("scifi")),
        ("genre exists", attr("genre").exists()),
        ("genre not exists", attr("genre").not_exists()),
        ("title startswith", attr("title").startswith("The")),
        ("title contains", attr("title").contains("an")),
        ("title endswith", attr("title").endswith("a")),
        ("author one of", attr("author").one_of(["Frank Herbert", "George Eliot", "Nobody"])),
        ("rating gt", attr("rating").gt(4.2)),
        ("type mismatch", attr("year").eq("1965")),
        ("gsi range", attr("genre").eq("scifi") & attr("year").gte(1965)),
        ("gsi between", attr("genre").eq("fantasy") & attr("year").gt(1940) & attr("year").lt(1970)),
        ("or", attr("genre").eq("fantasy") | attr("year").gt(1980)),
        ("not", !attr("genre").eq("scifi")),
        ("not or", !(attr("genre").eq("scifi") | attr("year").lt(1900))),
        ("query", Filter::query("DUNE")),
        ("query and", Filter::query("k") & attr("year").gt(1960)),
        ("endswith in or", attr("title").endswith("s") | attr("genre").not_exists()),
    ]
}

#[test]
fn test_search_sets_match_memory() {
    let reference = seeded_books(BackendKind::Memory, 100);
    for kind in backend_kinds() {
        let storage = seeded_books(kind, 100);
        for (name, filter) in filters() {
            let search = SearchFilter::new(filter.clone());
            let expected = search_ids(reference.as_ref(), &search);
            let actual = search_ids(storage.as_ref(), &search);
            assert_same_set(&actual, &expected, &format!("{kind}: {name}"));
        }
    }
}

#[test]
fn test_counts_match_memory() {
    let reference = seeded_books(BackendKind::Memory, 100);
    for kind in backend_kinds() {
        let storage = seeded_books(kind, 100);
        for (name, filter) in filters() {
            assert_eq!(
                storage.count(&filter).unwrap(),
                reference.count(&filter).unwrap(),
                "{kind}: {name}"
            );
        }
    }
}

#[test]
fn test_ordered_results_match_memory() {
    let orders = vec![
        ("year asc", Comparator::multi([attr("year").asc(), attr("id").asc()])),
        ("rating desc", Comparator::multi([attr("rating").desc(), attr("id").asc()])),
        (
            "genre then year",
            Comparator::multi([attr("genre").asc(), attr("year").desc(), attr("id").asc()]),
        ),
        ("genre desc", Comparator::multi([attr("genre").desc(), attr("id").desc()])),
    ];
    let reference = seeded_books(BackendKind::Memory, 100);
    for kind in backend_kinds() {
        let storage = seeded_books(kind, 100);
        for (name, order) in &orders {
            for (filter_name, filter) in [
                ("all", Filter::IncludeAll),
                ("scifi", attr("genre").eq("scifi")),
                ("recent", attr("year").gte(1960)),
            ] {
                let search = SearchFilter::new(filter).order_by(order.clone());
                assert_eq!(
                    search_ids(storage.as_ref(), &search),
                    search_ids(reference.as_ref(), &search),
                    "{kind}: {name} / {filter_name}"
                );
            }
        }
    }
}

#[test]
fn test_single_sort_key_orders_match() {
    let search = SearchFilter::new(attr("genre").eq("scifi")).order_by(attr("year").desc());
    let reference = seeded_books(BackendKind::Memory, 100);
    let expected = search_ids(reference.as_ref(), &search);
    assert_eq!(expected, vec!["b02", "b05", "b07", "b01", "b09"]);

    for kind in backend_kinds() {
        let storage = seeded_books(kind, 100);
        assert_eq!(search_ids(storage.as_ref(), &search), expected, "{kind}");
    }
}

#[test]
fn test_read_all_matches_memory() {
    let keys: Vec<String> = ["b03", "zz", "b01", "b03"].iter().map(|k| k.to_string()).collect();
    for kind in backend_kinds() {
        let storage = seeded_books(kind, 100);
        let items = storage.read_all(&keys, false).unwrap();
        let found: Vec<Option<String>> = items
            .iter()
            .map(|item| item.as_ref().map(|i| i["id"].as_str().unwrap().to_string()))
            .collect();
        assert_eq!(
            found,
            vec![Some("b03".into()), None, Some("b01".into()), Some("b03".into())],
            "{kind}"
        );
        let err = storage.read_all(&keys, true).unwrap_err();
        assert!(err.is_missing(), "{kind}");
    }
}
