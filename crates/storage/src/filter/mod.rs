//! Backend-independent filter and ordering model.
//!
//! A [`Filter`] is a boolean predicate tree evaluated against one item; a
//! [`Comparator`] orders items and never includes or excludes them. Backends
//! translate both into native query mechanics where they can and fall back to
//! [`Filter::matches`] / [`Comparator::sort`] where they cannot, so every
//! backend returns the same results for the same tree.
//!
//! Filters are normalised as they are built:
//!
//! ```
//! use persisty_storage::filter::{Filter, attr};
//!
//! let a = attr("year").gte(1970);
//! let b = attr("title").startswith("D");
//!
//! assert_eq!(Filter::and([]), Filter::IncludeAll);
//! assert_eq!(Filter::or([]), Filter::ExcludeAll);
//! assert_eq!(!!a.clone(), a);
//! assert_eq!(
//!     (a.clone() & b.clone()) & a.clone(),
//!     Filter::And(vec![a.clone(), b, a]),
//! );
//! ```

mod comparator;
mod op;
mod search_filter;
pub(crate) mod value;

use std::collections::BTreeSet;
use std::ops::{BitAnd, BitOr, Not};

use serde::{Deserialize, Serialize};

pub use comparator::Comparator;
pub use op::{AttrFilter, AttrRef, FilterOp, attr};
pub use search_filter::SearchFilter;

use crate::error::ValidationError;
use crate::meta::{Attr, StorageMeta};
use crate::types::Item;

/// A boolean predicate tree over items.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    /// All children match.
    And(Vec<Filter>),
    /// At least one child matches.
    Or(Vec<Filter>),
    /// The child does not match.
    Not(Box<Filter>),
    /// An attribute comparison.
    Attr(AttrFilter),
    /// Case-insensitive free-text search over readable string attributes.
    Query(String),
    /// Matches every item.
    #[default]
    IncludeAll,
    /// Matches no item.
    ExcludeAll,
}

impl Filter {
    /// Conjunction of `filters`, flattened and simplified.
    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Filter {
        let mut children = Vec::new();
        for filter in filters {
            match filter {
                Filter::IncludeAll => {}
                Filter::ExcludeAll => return Filter::ExcludeAll,
                Filter::And(nested) => children.extend(nested),
                other => children.push(other),
            }
        }
        match children.len() {
            0 => Filter::IncludeAll,
            1 => children.remove(0),
            _ => Filter::And(children),
        }
    }

    /// Disjunction of `filters`, flattened and simplified.
    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Filter {
        let mut children = Vec::new();
        for filter in filters {
            match filter {
                Filter::ExcludeAll => {}
                Filter::IncludeAll => return Filter::IncludeAll,
                Filter::Or(nested) => children.extend(nested),
                other => children.push(other),
            }
        }
        match children.len() {
            0 => Filter::ExcludeAll,
            1 => children.remove(0),
            _ => Filter::Or(children),
        }
    }

    /// Negation of `filter`; double negation cancels.
    pub fn negate(filter: Filter) -> Filter {
        match filter {
            Filter::Not(inner) => *inner,
            Filter::IncludeAll => Filter::ExcludeAll,
            Filter::ExcludeAll => Filter::IncludeAll,
            other => Filter::Not(Box::new(other)),
        }
    }

    /// Free-text query filter.
    pub fn query(text: impl Into<String>) -> Filter {
        Filter::Query(text.into())
    }

    /// Evaluates the filter against an item.
    ///
    /// `attrs` are consulted only by [`Filter::Query`], which scans the
    /// text-searchable attributes among them.
    pub fn matches(&self, item: &Item, attrs: &[Attr]) -> bool {
        match self {
            Filter::And(children) => children.iter().all(|f| f.matches(item, attrs)),
            Filter::Or(children) => children.iter().any(|f| f.matches(item, attrs)),
            Filter::Not(inner) => !inner.matches(item, attrs),
            Filter::Attr(filter) => filter.matches(item),
            Filter::Query(text) => {
                let needle = text.to_lowercase();
                attrs
                    .iter()
                    .filter(|a| a.is_text_searchable())
                    .filter_map(|a| item.get(&a.name).and_then(|v| v.as_str()))
                    .any(|value| value.to_lowercase().contains(&needle))
            }
            Filter::IncludeAll => true,
            Filter::ExcludeAll => false,
        }
    }

    /// Returns the attribute names referenced by attribute filters.
    pub fn attr_names(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        self.collect_names(&mut names);
        names
    }

    fn collect_names<'a>(&'a self, names: &mut BTreeSet<&'a str>) {
        match self {
            Filter::And(children) | Filter::Or(children) => {
                children.iter().for_each(|f| f.collect_names(names))
            }
            Filter::Not(inner) => inner.collect_names(names),
            Filter::Attr(filter) => {
                names.insert(filter.name.as_str());
            }
            Filter::Query(_) | Filter::IncludeAll | Filter::ExcludeAll => {}
        }
    }

    /// Rejects references to unknown or non-searchable attributes.
    pub fn validate(&self, meta: &StorageMeta) -> Result<(), ValidationError> {
        for name in self.attr_names() {
            match meta.attr(name) {
                None => {
                    return Err(ValidationError::UnknownField {
                        storage: meta.name().to_string(),
                        field: name.to_string(),
                    });
                }
                Some(attr) if !attr.searchable => {
                    return Err(ValidationError::NotSearchable {
                        storage: meta.name().to_string(),
                        field: name.to_string(),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

impl BitAnd for Filter {
    type Output = Filter;

    fn bitand(self, rhs: Filter) -> Filter {
        Filter::and([self, rhs])
    }
}

impl BitOr for Filter {
    type Output = Filter;

    fn bitor(self, rhs: Filter) -> Filter {
        Filter::or([self, rhs])
    }
}

impl Not for Filter {
    type Output = Filter;

    fn not(self) -> Filter {
        Filter::negate(self)
    }
}

impl From<AttrFilter> for Filter {
    fn from(filter: AttrFilter) -> Self {
        Filter::Attr(filter)
    }
}
