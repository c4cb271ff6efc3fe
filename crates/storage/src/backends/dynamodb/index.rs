//! Index model and index selection.
//!
//! A search is served by a `Query` on the index whose key attributes the
//! filter pins down best, or by a `Scan` when no index has a usable
//! partition key condition.
//!
//! # Scoring
//!
//! | Condition                                        | Score        |
//! |--------------------------------------------------|--------------|
//! | no equality on the partition key                 | 0            |
//! | equality on the partition key                    | 1            |
//! | index is the primary index                       | +1           |
//! | equality on the sort key                         | +5, final    |
//! | `gt`/`gte`/`lt`/`lte`/`startswith` on sort key   | +2           |
//!
//! Only top-level conjuncts count. A global secondary index with a sort key
//! also needs a condition on that sort key: such indexes are sparse and omit
//! items lacking it, which would drop matches.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::client::{KeySchemaElement, KeyType};
use super::conversions::{is_scalar_of, scalar_type};
use crate::error::{StorageResult, ValidationError};
use crate::filter::{AttrFilter, Filter, FilterOp};
use crate::meta::{Attr, KeyConfig, StorageMeta};

const PRIMARY_BONUS: u32 = 1;
const SORT_KEY_EQ_BONUS: u32 = 5;
const SORT_KEY_RANGE_BONUS: u32 = 2;

/// Key attributes of the primary index or of a global secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamoIndex {
    /// Index name; `None` for the primary index.
    #[serde(default)]
    pub name: Option<String>,
    /// Partition (hash) key attribute.
    pub partition_key: String,
    /// Sort (range) key attribute.
    #[serde(default)]
    pub sort_key: Option<String>,
}

impl DynamoIndex {
    /// The primary index.
    pub fn primary(partition_key: impl Into<String>, sort_key: Option<&str>) -> Self {
        Self {
            name: None,
            partition_key: partition_key.into(),
            sort_key: sort_key.map(str::to_string),
        }
    }

    /// A global secondary index.
    pub fn global(
        name: impl Into<String>,
        partition_key: impl Into<String>,
        sort_key: Option<&str>,
    ) -> Self {
        Self {
            name: Some(name.into()),
            partition_key: partition_key.into(),
            sort_key: sort_key.map(str::to_string),
        }
    }

    /// Derives the primary index from a storage's key configuration.
    ///
    /// Composite keys map their first attribute to the partition key and the
    /// second to the sort key; longer composites cannot be expressed.
    pub fn from_meta(meta: &StorageMeta) -> StorageResult<Self> {
        let names = meta.key_config().attr_names();
        match (meta.key_config(), names.as_slice()) {
            (KeyConfig::Composite { .. }, [pk, sk]) => Ok(Self::primary(*pk, Some(sk))),
            (_, [pk]) => Ok(Self::primary(*pk, None)),
            _ => Err(ValidationError::InvalidMeta {
                storage: meta.name().to_string(),
                message: format!(
                    "a DynamoDB key has at most two attributes, got {}",
                    names.len()
                ),
            }
            .into()),
        }
    }

    /// Returns true for the primary index.
    pub fn is_primary(&self) -> bool {
        self.name.is_none()
    }

    /// Returns the partition key and, if any, the sort key.
    pub fn key_attrs(&self) -> Vec<&str> {
        std::iter::once(self.partition_key.as_str())
            .chain(self.sort_key.as_deref())
            .collect()
    }

    /// Returns true if `name` is one of this index's key attributes.
    pub fn is_key_attr(&self, name: &str) -> bool {
        self.partition_key == name || self.sort_key.as_deref() == Some(name)
    }

    /// Returns the key schema of this index.
    pub fn key_schema(&self) -> Vec<KeySchemaElement> {
        let mut schema = vec![KeySchemaElement {
            attribute_name: self.partition_key.clone(),
            key_type: KeyType::Hash,
        }];
        if let Some(sort_key) = &self.sort_key {
            schema.push(KeySchemaElement {
                attribute_name: sort_key.clone(),
                key_type: KeyType::Range,
            });
        }
        schema
    }

    /// Scores how well `conjuncts` pin down this index's keys.
    pub fn score(&self, conjuncts: &[&AttrFilter], attrs: &[Attr]) -> u32 {
        let has_pk = conjuncts
            .iter()
            .any(|f| f.name == self.partition_key && key_equality(f, attrs).is_some());
        if !has_pk {
            return 0;
        }

        let mut score = 1;
        if self.is_primary() {
            score += PRIMARY_BONUS;
        }

        let Some(sort_key) = &self.sort_key else {
            return score;
        };
        let on_sort_key = conjuncts.iter().filter(|f| &f.name == sort_key);
        let mut has_range = false;
        for filter in on_sort_key {
            if key_equality(filter, attrs).is_some() {
                return score + SORT_KEY_EQ_BONUS;
            }
            has_range |= key_range(filter, attrs);
        }

        if has_range {
            score + SORT_KEY_RANGE_BONUS
        } else if self.is_primary() {
            score
        } else {
            0
        }
    }
}

/// The index chosen for a filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexChoice<'a> {
    /// The selected index.
    pub index: &'a DynamoIndex,
    /// Its score.
    pub score: u32,
}

/// Picks the best index for `filter`, or `None` if a scan is required.
///
/// Ties go to the index listed first. A secondary index with a sort key but
/// no condition on it scores 0 rather than the base score of 1, since items
/// lacking the sort key are absent from the index.
pub fn select_index<'a>(
    indexes: &'a [DynamoIndex],
    filter: &Filter,
    attrs: &[Attr],
) -> Option<IndexChoice<'a>> {
    let conjuncts = conjuncts(filter);
    let mut best: Option<IndexChoice<'a>> = None;
    for index in indexes {
        let score = index.score(&conjuncts, attrs);
        if score > 0 && best.is_none_or(|b| score > b.score) {
            best = Some(IndexChoice { index, score });
        }
    }
    best
}

/// Returns the attribute filters that are top-level conjuncts of `filter`.
pub fn conjuncts(filter: &Filter) -> Vec<&AttrFilter> {
    match filter {
        Filter::Attr(f) => vec![f],
        Filter::And(children) => children
            .iter()
            .filter_map(|c| match c {
                Filter::Attr(f) => Some(f),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Returns the operand if `filter` is an equality usable in a key condition.
pub(crate) fn key_equality<'f>(filter: &'f AttrFilter, attrs: &[Attr]) -> Option<&'f Value> {
    filter
        .equality_value()
        .filter(|v| key_value_usable(&filter.name, v, attrs))
}

/// Returns true if `filter` is a one-sided range usable in a key condition.
pub(crate) fn key_range(filter: &AttrFilter, attrs: &[Attr]) -> bool {
    match filter.op {
        op if op.is_range() => key_value_usable(&filter.name, &filter.value, attrs),
        FilterOp::StartsWith => {
            filter.value.is_string() && key_value_usable(&filter.name, &filter.value, attrs)
        }
        _ => false,
    }
}

fn key_value_usable(name: &str, value: &Value, attrs: &[Attr]) -> bool {
    match attrs.iter().find(|a| a.name == name) {
        Some(attr) => scalar_type(attr.attr_type()).is_some_and(|s| is_scalar_of(value, s)),
        None => value.is_string() || value.is_number(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::attr;

    fn orders() -> (Vec<DynamoIndex>, Vec<Attr>) {
        let indexes = vec![
            DynamoIndex::primary("customer_id", None),
            DynamoIndex::global("gsi1", "status", Some("created_at")),
        ];
        let attrs = vec![
            Attr::string("customer_id"),
            Attr::string("status"),
            Attr::datetime("created_at"),
        ];
        (indexes, attrs)
    }

    #[test]
    fn test_range_on_gsi_sort_key_selects_gsi() {
        let (indexes, attrs) = orders();
        let filter = attr("status").eq("shipped") & attr("created_at").gt("2024-01-01");

        let conj = conjuncts(&filter);
        assert_eq!(indexes[0].score(&conj, &attrs), 0);
        assert!(indexes[1].score(&conj, &attrs) >= 2);

        let choice = select_index(&indexes, &filter, &attrs).unwrap();
        assert_eq!(choice.index.name.as_deref(), Some("gsi1"));
        assert_eq!(choice.score, 3);
    }

    #[test]
    fn test_primary_bias_and_full_key_bonus() {
        let indexes = vec![
            DynamoIndex::primary("customer_id", Some("order_id")),
            DynamoIndex::global("by_customer", "customer_id", Some("total")),
        ];
        let attrs = vec![
            Attr::string("customer_id"),
            Attr::int("order_id"),
            Attr::int("total"),
        ];

        let filter = attr("customer_id").eq("c-1") & attr("total").gt(10);
        let choice = select_index(&indexes, &filter, &attrs).unwrap();
        assert_eq!(choice.index.name.as_deref(), Some("by_customer"));
        assert_eq!(choice.score, 3);

        let filter = attr("customer_id").eq("c-1") & attr("order_id").one_of([7]);
        let choice = select_index(&indexes, &filter, &attrs).unwrap();
        assert!(choice.index.is_primary());
        assert_eq!(choice.score, 7);

        let filter = attr("customer_id").eq("c-1");
        assert!(select_index(&indexes, &filter, &attrs).unwrap().index.is_primary());
    }

    #[test]
    fn test_no_partition_key_equality_means_scan() {
        let (indexes, attrs) = orders();
        assert!(select_index(&indexes, &attr("created_at").gt("2024"), &attrs).is_none());
        assert!(select_index(&indexes, &attr("status").ne("open"), &attrs).is_none());
        assert!(select_index(&indexes, &attr("customer_id").one_of(["a", "b"]), &attrs).is_none());

        let disjunction = attr("customer_id").eq("a") | attr("customer_id").eq("b");
        assert!(select_index(&indexes, &disjunction, &attrs).is_none());
    }

    #[test]
    fn test_sparse_gsi_needs_sort_key_condition() {
        let (indexes, attrs) = orders();
        let filter = attr("status").eq("shipped");
        assert!(select_index(&indexes, &filter, &attrs).is_none());
    }

    #[test]
    fn test_key_value_type_must_match() {
        let (indexes, attrs) = orders();
        let filter = attr("customer_id").eq(42);
        assert!(select_index(&indexes, &filter, &attrs).is_none());
    }

    #[test]
    fn test_from_meta() {
        let meta = StorageMeta::builder("orders")
            .attr(Attr::string("customer_id"))
            .attr(Attr::int("order_id"))
            .key_config(KeyConfig::composite(["customer_id", "order_id"]))
            .build()
            .unwrap();
        let index = DynamoIndex::from_meta(&meta).unwrap();
        assert_eq!(index.key_attrs(), vec!["customer_id", "order_id"]);
        assert_eq!(index.key_schema()[1].key_type, KeyType::Range);
    }
}
