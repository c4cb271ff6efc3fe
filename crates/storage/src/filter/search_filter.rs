use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{Comparator, Filter};
use crate::error::ValidationError;
use crate::meta::StorageMeta;
use crate::types::{Item, hex};

/// A filter plus an optional ordering.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchFilter {
    /// Inclusion predicate; defaults to [`Filter::IncludeAll`].
    #[serde(default)]
    pub filter: Filter,
    /// Result ordering; `None` leaves the order to the backend's key order.
    #[serde(default)]
    pub order: Option<Comparator>,
}

impl SearchFilter {
    /// Search matching `filter` in key order.
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            order: None,
        }
    }

    /// Search matching every item.
    pub fn all() -> Self {
        Self::default()
    }

    /// Sets the ordering.
    pub fn order_by(mut self, order: Comparator) -> Self {
        self.order = Some(order);
        self
    }

    /// Returns a copy with `extra` conjoined onto the filter.
    pub fn and_filter(&self, extra: &Filter) -> Self {
        Self {
            filter: Filter::and([self.filter.clone(), extra.clone()]),
            order: self.order.clone(),
        }
    }

    /// Sorts items by the ordering, if any.
    pub fn sort(&self, items: &mut [Item]) {
        if let Some(order) = &self.order {
            order.sort(items);
        }
    }

    /// Short digest identifying this search, embedded in page keys so a page
    /// key is rejected if replayed against a different search.
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        let digest = Sha256::digest(&json);
        hex(&digest[..8])
    }

    /// Validates both the filter and the ordering.
    pub fn validate(&self, meta: &StorageMeta) -> Result<(), ValidationError> {
        self.filter.validate(meta)?;
        if let Some(order) = &self.order {
            order.validate(meta)?;
        }
        Ok(())
    }
}

impl From<Filter> for SearchFilter {
    fn from(filter: Filter) -> Self {
        SearchFilter::new(filter)
    }
}
