//! Property tests for the filter algebra.
//!
//! Random filter trees over a small item domain must keep their meaning
//! through normalisation, and every backend must select the same items.

mod common;

use std::sync::OnceLock;

use proptest::prelude::*;
use serde_json::json;

use persisty_storage::backends::memory::MemStorage;
use persisty_storage::core::Storage;
use persisty_storage::filter::{Filter, SearchFilter, attr};
use persisty_storage::meta::{Attr, StorageMeta};
use persisty_storage::types::Item;

use common::*;

fn meta() -> StorageMeta {
    StorageMeta::builder("cells")
        .attr(Attr::string("id"))
        .attr(Attr::int("n").nullable())
        .attr(Attr::string("s").nullable())
        .build()
        .unwrap()
}

const CELLS: usize = 25;

/// Every combination of `n` in {missing, 0..=3} and `s` in
/// {missing, a, b, ab, \u{c1}B}.
fn dataset() -> Vec<Item> {
    let numbers = [None, Some(0), Some(1), Some(2), Some(3)];
    let strings = [None, Some("a"), Some("b"), Some("ab"), Some("\u{c1}B")];
    let mut items = Vec::new();
    for (i, n) in numbers.iter().enumerate() {
        for (j, s) in strings.iter().enumerate() {
            let mut cell = item(json!({"id": format!("c{i}{j}")}));
            if let Some(n) = n {
                cell.insert("n".into(), json!(n));
            }
            if let Some(s) = s {
                cell.insert("s".into(), json!(s));
            }
            items.push(cell);
        }
    }
    items
}

fn leaf() -> impl Strategy<Value = Filter> {
    prop_oneof![
        Just(Filter::IncludeAll),
        Just(Filter::ExcludeAll),
        (0i64..4).prop_map(|v| attr("n").eq(v)),
        (0i64..4).prop_map(|v| attr("n").ne(v)),
        (0i64..4).prop_map(|v| attr("n").gt(v)),
        (0i64..4).prop_map(|v| attr("n").lte(v)),
        (0i64..4).prop_map(|v| attr("n").lt(v)),
        (0i64..4).prop_map(|v| attr("n").gte(v)),
        prop::sample::subsequence(vec![0i64, 1, 2, 3], 0..=3).prop_map(|vs| attr("n").one_of(vs)),
        Just(attr("n").exists()),
        Just(attr("n").not_exists()),
        Just(attr("s").not_exists()),
        prop::sample::select(vec!["a", "b", "ab", "\u{c1}B"]).prop_map(|v| attr("s").eq(v)),
        prop::sample::select(vec!["a", "b"]).prop_map(|v| attr("s").startswith(v)),
        prop::sample::select(vec!["a", "b", "B"]).prop_map(|v| attr("s").endswith(v)),
        prop::sample::select(vec!["a", "b"]).prop_map(|v| attr("s").contains(v)),
        prop::sample::select(vec!["a", "AB", "\u{e1}b", "\u{c1}", "z"]).prop_map(|v| Filter::query(v)),
    ]
}

fn filter() -> impl Strategy<Value = Filter> {
    leaf().prop_recursive(3, 24, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..3).prop_map(Filter::And),
            prop::collection::vec(inner.clone(), 0..3).prop_map(Filter::Or),
            inner.prop_map(|f| Filter::Not(Box::new(f))),
        ]
    })
}

fn selected(filter: &Filter) -> Vec<String> {
    let attrs = meta();
    dataset()
        .into_iter()
        .filter(|cell| filter.matches(cell, attrs.attrs()))
        .map(|cell| cell["id"].as_str().unwrap_or_default().to_string())
        .collect()
}

struct Backends {
    storages: Vec<(String, Box<dyn Storage>)>,
}

fn backends() -> &'static Backends {
    static BACKENDS: OnceLock<Backends> = OnceLock::new();
    BACKENDS.get_or_init(|| {
        let storages = backend_kinds()
            .into_iter()
            .map(|kind| {
                let storage = open(kind, meta());
                for cell in dataset() {
                    storage.create(cell).unwrap();
                }
                (kind.to_string(), storage)
            })
            .collect();
        Backends { storages }
    })
}

#[test]
fn test_empty_connectives() {
    let reference = MemStorage::new(meta());
    for cell in dataset() {
        reference.create(cell).unwrap();
    }
    assert_eq!(reference.count(&Filter::And(Vec::new())).unwrap(), CELLS as u64);
    assert_eq!(reference.count(&Filter::Or(Vec::new())).unwrap(), 0);
    assert_eq!(
        reference
            .count(&Filter::Not(Box::new(Filter::Or(Vec::new()))))
            .unwrap(),
        CELLS as u64
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_double_negation_cancels(f in filter()) {
        prop_assert_eq!(selected(&!!f.clone()), selected(&f));
        let wrapped = Filter::Not(Box::new(Filter::Not(Box::new(f.clone()))));
        prop_assert_eq!(selected(&wrapped), selected(&f));
    }

    #[test]
    fn prop_negating_a_leaf_is_an_involution(f in leaf()) {
        prop_assert_eq!(!!f.clone(), f);
    }

    #[test]
    fn prop_negation_complements(f in filter()) {
        let mut both = selected(&f);
        both.extend(selected(&!f.clone()));
        both.sort();
        prop_assert_eq!(both.len(), CELLS);
        both.dedup();
        prop_assert_eq!(both.len(), CELLS);
    }

    #[test]
    fn prop_builders_preserve_meaning(a in filter(), b in filter()) {
        prop_assert_eq!(
            selected(&(a.clone() & b.clone())),
            selected(&Filter::And(vec![a.clone(), b.clone()]))
        );
        prop_assert_eq!(
            selected(&(a.clone() | b.clone())),
            selected(&Filter::Or(vec![a.clone(), b.clone()]))
        );
    }

    #[test]
    fn prop_de_morgan(a in filter(), b in filter()) {
        prop_assert_eq!(
            selected(&!(a.clone() & b.clone())),
            selected(&(!a.clone() | !b.clone()))
        );
        prop_assert_eq!(
            selected(&!(a.clone() | b.clone())),
            selected(&(!a & !b))
        );
    }

    #[test]
    fn prop_backends_agree(f in filter()) {
        let mut expected = selected(&f);
        expected.sort();
        let search = SearchFilter::new(f.clone());
        for (name, storage) in &backends().storages {
            let mut actual = search_ids(storage.as_ref(), &search);
            actual.sort();
            prop_assert_eq!(&actual, &expected, "{} {:?}", name, f);
            prop_assert_eq!(storage.count(&f).unwrap(), expected.len() as u64, "{} count", name);
        }
    }
}
