use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::value::{present, total_cmp};
use crate::error::ValidationError;
use crate::meta::StorageMeta;
use crate::types::Item;

/// Ordering over items.
///
/// Items missing the sort attribute (or holding `null`) sort after items that
/// have it; a descending comparator reverses the whole order, so they come
/// first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    /// Order by one attribute.
    Attr {
        /// Attribute name.
        name: String,
        /// Reverse the order.
        #[serde(default)]
        desc: bool,
    },
    /// Lexicographic composition; later comparators break ties.
    Multi(Vec<Comparator>),
}

impl Comparator {
    /// Ascending order on `name`.
    pub fn asc(name: impl Into<String>) -> Self {
        Comparator::Attr {
            name: name.into(),
            desc: false,
        }
    }

    /// Descending order on `name`.
    pub fn desc(name: impl Into<String>) -> Self {
        Comparator::Attr {
            name: name.into(),
            desc: true,
        }
    }

    /// Composes comparators, flattening nested compositions.
    pub fn multi(comparators: impl IntoIterator<Item = Comparator>) -> Self {
        let mut terms = Vec::new();
        for comparator in comparators {
            match comparator {
                Comparator::Multi(nested) => terms.extend(nested),
                attr => terms.push(attr),
            }
        }
        if terms.len() == 1 {
            terms.remove(0)
        } else {
            Comparator::Multi(terms)
        }
    }

    /// Compares two items.
    pub fn compare(&self, a: &Item, b: &Item) -> Ordering {
        match self {
            Comparator::Attr { name, desc } => {
                let ordering = match (present(a.get(name)), present(b.get(name))) {
                    (Some(x), Some(y)) => total_cmp(x, y),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                };
                if *desc { ordering.reverse() } else { ordering }
            }
            Comparator::Multi(terms) => terms
                .iter()
                .map(|c| c.compare(a, b))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal),
        }
    }

    /// Stable sort of `items`.
    pub fn sort(&self, items: &mut [Item]) {
        items.sort_by(|a, b| self.compare(a, b));
    }

    /// Flattened `(name, desc)` terms in priority order.
    pub fn terms(&self) -> Vec<(&str, bool)> {
        match self {
            Comparator::Attr { name, desc } => vec![(name.as_str(), *desc)],
            Comparator::Multi(terms) => terms.iter().flat_map(|c| c.terms()).collect(),
        }
    }

    /// Rejects references to unknown or non-sortable attributes.
    pub fn validate(&self, meta: &StorageMeta) -> Result<(), ValidationError> {
        for (name, _) in self.terms() {
            let attr = meta.attr(name).ok_or_else(|| ValidationError::UnknownField {
                storage: meta.name().to_string(),
                field: name.to_string(),
            })?;
            if !attr.sortable {
                return Err(ValidationError::NotSortable {
                    storage: meta.name().to_string(),
                    field: name.to_string(),
                });
            }
        }
        Ok(())
    }
}
