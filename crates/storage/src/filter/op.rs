//! Attribute filters and their operators.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::value::{compare_values, present, string_form, values_equal};
use super::{Comparator, Filter};
use crate::types::Item;

/// Operators an [`AttrFilter`] can apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// String form contains the operand.
    Contains,
    /// String form starts with the operand.
    #[serde(rename = "startswith")]
    StartsWith,
    /// String form ends with the operand.
    #[serde(rename = "endswith")]
    EndsWith,
    /// Value is one of the operand's elements.
    #[serde(rename = "oneof")]
    OneOf,
    /// Attribute is present and not null.
    Exists,
    /// Attribute is absent or null.
    NotExists,
}

impl FilterOp {
    /// Returns true for `gt`, `gte`, `lt` and `lte`.
    pub fn is_range(&self) -> bool {
        matches!(
            self,
            FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte
        )
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilterOp::Eq => "eq",
            FilterOp::Ne => "ne",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
            FilterOp::Contains => "contains",
            FilterOp::StartsWith => "startswith",
            FilterOp::EndsWith => "endswith",
            FilterOp::OneOf => "oneof",
            FilterOp::Exists => "exists",
            FilterOp::NotExists => "not_exists",
        };
        f.write_str(name)
    }
}

/// A comparison between one attribute and a constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttrFilter {
    /// Attribute name.
    pub name: String,
    /// Operator.
    pub op: FilterOp,
    /// Operand; an array for `oneof`, ignored by `exists` / `not_exists`.
    #[serde(default)]
    pub value: Value,
}

impl AttrFilter {
    /// Creates an attribute filter.
    pub fn new(name: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            op,
            value: value.into(),
        }
    }

    /// Evaluates the filter against an item.
    ///
    /// A missing attribute never matches, except for `not_exists`; values of
    /// incomparable kinds never match an ordering operator.
    pub fn matches(&self, item: &Item) -> bool {
        let actual = present(item.get(&self.name));
        match self.op {
            FilterOp::Exists => actual.is_some(),
            FilterOp::NotExists => actual.is_none(),
            _ => actual.is_some_and(|actual| self.compare(actual)),
        }
    }

    fn compare(&self, actual: &Value) -> bool {
        match self.op {
            FilterOp::Eq => values_equal(actual, &self.value),
            FilterOp::Ne => !values_equal(actual, &self.value),
            FilterOp::Gt => compare_values(actual, &self.value).is_some_and(|o| o.is_gt()),
            FilterOp::Gte => compare_values(actual, &self.value).is_some_and(|o| o.is_ge()),
            FilterOp::Lt => compare_values(actual, &self.value).is_some_and(|o| o.is_lt()),
            FilterOp::Lte => compare_values(actual, &self.value).is_some_and(|o| o.is_le()),
            FilterOp::Contains => string_form(actual).contains(&string_form(&self.value)),
            FilterOp::StartsWith => string_form(actual).starts_with(&string_form(&self.value)),
            FilterOp::EndsWith => string_form(actual).ends_with(&string_form(&self.value)),
            FilterOp::OneOf => match &self.value {
                Value::Array(options) => options.iter().any(|o| values_equal(actual, o)),
                single => values_equal(actual, single),
            },
            FilterOp::Exists => true,
            FilterOp::NotExists => false,
        }
    }

    /// Returns the single equality operand, for `eq` or a one-element `oneof`.
    pub fn equality_value(&self) -> Option<&Value> {
        match (self.op, &self.value) {
            (FilterOp::Eq, value) => Some(value),
            (FilterOp::OneOf, Value::Array(values)) if values.len() == 1 => values.first(),
            _ => None,
        }
    }
}

/// Fluent builder for filters and comparators on one attribute.
///
/// ```
/// use persisty_storage::filter::attr;
/// use serde_json::json;
///
/// let filter = attr("year").gte(1970) & attr("title").startswith("D");
/// let item = json!({"year": 1980, "title": "Dune"}).as_object().cloned().unwrap();
/// assert!(filter.matches(&item, &[]));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrRef {
    name: String,
}

/// Starts a filter or comparator on the named attribute.
pub fn attr(name: impl Into<String>) -> AttrRef {
    AttrRef { name: name.into() }
}

macro_rules! attr_ops {
    ($($(#[$doc:meta])* $fn_name:ident => $op:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            pub fn $fn_name(&self, value: impl Into<Value>) -> Filter {
                Filter::Attr(AttrFilter::new(self.name.clone(), FilterOp::$op, value))
            }
        )*
    };
}

impl AttrRef {
    attr_ops! {
        /// `attr == value`
        eq => Eq,
        /// `attr != value`
        ne => Ne,
        /// `attr > value`
        gt => Gt,
        /// `attr >= value`
        gte => Gte,
        /// `attr < value`
        lt => Lt,
        /// `attr <= value`
        lte => Lte,
        /// String form of `attr` contains `value`.
        contains => Contains,
        /// String form of `attr` starts with `value`.
        startswith => StartsWith,
        /// String form of `attr` ends with `value`.
        endswith => EndsWith,
    }

    /// `attr` is one of `values`.
    pub fn one_of<I, V>(&self, values: I) -> Filter
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        Filter::Attr(AttrFilter::new(
            self.name.clone(),
            FilterOp::OneOf,
            Value::Array(values),
        ))
    }

    /// `attr` is present.
    pub fn exists(&self) -> Filter {
        Filter::Attr(AttrFilter::new(self.name.clone(), FilterOp::Exists, Value::Null))
    }

    /// `attr` is absent.
    pub fn not_exists(&self) -> Filter {
        Filter::Attr(AttrFilter::new(
            self.name.clone(),
            FilterOp::NotExists,
            Value::Null,
        ))
    }

    /// Ascending order on `attr`.
    pub fn asc(&self) -> Comparator {
        Comparator::asc(self.name.clone())
    }

    /// Descending order on `attr`.
    pub fn desc(&self) -> Comparator {
        Comparator::desc(self.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(value: Value) -> Item {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_missing_attribute_fails_closed() {
        let empty = Item::new();
        for op in [
            FilterOp::Eq,
            FilterOp::Ne,
            FilterOp::Gt,
            FilterOp::Contains,
            FilterOp::OneOf,
            FilterOp::Exists,
        ] {
            assert!(!AttrFilter::new("year", op, json!(1)).matches(&empty), "{op}");
        }
        assert!(AttrFilter::new("year", FilterOp::NotExists, Value::Null).matches(&empty));
        assert!(
            AttrFilter::new("year", FilterOp::NotExists, Value::Null)
                .matches(&item(json!({"year": null})))
        );
    }

    #[test]
    fn test_type_mismatch_is_non_match() {
        let book = item(json!({"year": 1970}));
        assert!(!attr("year").gt("1960").matches(&book, &[]));
        assert!(!attr("year").eq("1970").matches(&book, &[]));
        assert!(attr("year").ne("1970").matches(&book, &[]));
    }

    #[test]
    fn test_string_operators_use_string_form() {
        let book = item(json!({"title": "Dune", "year": 1965}));
        assert!(attr("title").contains("un").matches(&book, &[]));
        assert!(attr("title").startswith("Du").matches(&book, &[]));
        assert!(attr("title").endswith("ne").matches(&book, &[]));
        assert!(attr("year").startswith("19").matches(&book, &[]));
        assert!(!attr("title").contains("UN").matches(&book, &[]));
    }

    #[test]
    fn test_one_of() {
        let book = item(json!({"genre": "scifi"}));
        assert!(attr("genre").one_of(["scifi", "fantasy"]).matches(&book, &[]));
        assert!(!attr("genre").one_of(["horror"]).matches(&book, &[]));
    }

    #[test]
    fn test_equality_value() {
        let single = AttrFilter::new("a", FilterOp::OneOf, json!(["x"]));
        assert_eq!(single.equality_value(), Some(&json!("x")));
        let multi = AttrFilter::new("a", FilterOp::OneOf, json!(["x", "y"]));
        assert_eq!(multi.equality_value(), None);
        let range = AttrFilter::new("a", FilterOp::Gt, json!(1));
        assert_eq!(range.equality_value(), None);
    }

    #[test]
    fn test_op_serde_names() {
        assert_eq!(
            serde_json::to_string(&FilterOp::StartsWith).unwrap(),
            "\"startswith\""
        );
        assert_eq!(
            serde_json::from_str::<FilterOp>("\"not_exists\"").unwrap(),
            FilterOp::NotExists
        );
    }
}
