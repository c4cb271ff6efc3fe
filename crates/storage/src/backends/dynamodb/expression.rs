//! Key conditions, filter conditions, and the split between them.
//!
//! [`split_filter`] turns a [`Filter`] into the native pieces of a DynamoDB
//! request. Whatever cannot be expressed is dropped from the request and
//! reported through `handled = false`, so the caller re-applies
//! [`Filter::matches`] to the returned items.

use std::collections::BTreeMap;

use serde_json::Value;

use super::client::{DynamoItem, DynamoValue};
use super::conversions::{from_dynamo, to_dynamo};
use super::index::{DynamoIndex, key_equality, key_range};
use crate::filter::value::{compare_values, values_equal};
use crate::filter::{AttrFilter, Filter, FilterOp};
use crate::meta::{Attr, AttrType};

/// Maximum number of operands DynamoDB accepts in an `IN` list.
const MAX_IN_OPERANDS: usize = 100;

/// Comparison operators of the condition expression language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CompareOp {
    fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    fn from_filter_op(op: FilterOp) -> Option<Self> {
        match op {
            FilterOp::Eq => Some(CompareOp::Eq),
            FilterOp::Ne => Some(CompareOp::Ne),
            FilterOp::Gt => Some(CompareOp::Gt),
            FilterOp::Gte => Some(CompareOp::Ge),
            FilterOp::Lt => Some(CompareOp::Lt),
            FilterOp::Lte => Some(CompareOp::Le),
            _ => None,
        }
    }
}

/// A condition expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `#n <op> :v`
    Compare {
        /// Attribute name.
        name: String,
        /// Operator.
        op: CompareOp,
        /// Operand.
        value: DynamoValue,
    },
    /// `begins_with(#n, :v)`
    BeginsWith {
        /// Attribute name.
        name: String,
        /// Prefix.
        value: DynamoValue,
    },
    /// `contains(#n, :v)`
    Contains {
        /// Attribute name.
        name: String,
        /// Substring or element.
        value: DynamoValue,
    },
    /// `attribute_exists(#n)`
    Exists(String),
    /// `attribute_not_exists(#n)`
    NotExists(String),
    /// `#n IN (:v0, :v1, ...)`
    In {
        /// Attribute name.
        name: String,
        /// Candidates.
        values: Vec<DynamoValue>,
    },
    /// Conjunction.
    And(Vec<Condition>),
    /// Disjunction.
    Or(Vec<Condition>),
    /// Negation.
    Not(Box<Condition>),
}

impl Condition {
    fn and(mut conditions: Vec<Condition>) -> Option<Condition> {
        match conditions.len() {
            0 => None,
            1 => conditions.pop(),
            _ => Some(Condition::And(conditions)),
        }
    }

    /// Evaluates the condition the way DynamoDB does.
    ///
    /// Comparisons against a missing attribute or a value of another type
    /// are false, except `<>` against a present value of another type.
    pub fn evaluate(&self, item: &DynamoItem) -> bool {
        let get = |name: &str| item.get(name).map(from_dynamo);
        match self {
            Condition::Compare { name, op, value } => {
                let Some(actual) = get(name) else {
                    return false;
                };
                let expected = from_dynamo(value);
                match op {
                    CompareOp::Eq => values_equal(&actual, &expected),
                    CompareOp::Ne => !values_equal(&actual, &expected),
                    CompareOp::Lt => compare_values(&actual, &expected).is_some_and(|o| o.is_lt()),
                    CompareOp::Le => compare_values(&actual, &expected).is_some_and(|o| o.is_le()),
                    CompareOp::Gt => compare_values(&actual, &expected).is_some_and(|o| o.is_gt()),
                    CompareOp::Ge => compare_values(&actual, &expected).is_some_and(|o| o.is_ge()),
                }
            }
            Condition::BeginsWith { name, value } => match (item.get(name), value) {
                (Some(DynamoValue::S(actual)), DynamoValue::S(prefix)) => actual.starts_with(prefix),
                _ => false,
            },
            Condition::Contains { name, value } => match (item.get(name), value) {
                (Some(DynamoValue::S(actual)), DynamoValue::S(needle)) => actual.contains(needle),
                (Some(DynamoValue::L(values)), needle) => values.contains(needle),
                _ => false,
            },
            Condition::Exists(name) => item.contains_key(name),
            Condition::NotExists(name) => !item.contains_key(name),
            Condition::In { name, values } => get(name).is_some_and(|actual| {
                values
                    .iter()
                    .any(|candidate| values_equal(&actual, &from_dynamo(candidate)))
            }),
            Condition::And(conditions) => conditions.iter().all(|c| c.evaluate(item)),
            Condition::Or(conditions) => conditions.iter().any(|c| c.evaluate(item)),
            Condition::Not(inner) => !inner.evaluate(item),
        }
    }

    fn render(&self, placeholders: &mut Placeholders) -> String {
        match self {
            Condition::Compare { name, op, value } => format!(
                "{} {} {}",
                placeholders.name(name),
                op.symbol(),
                placeholders.value(value)
            ),
            Condition::BeginsWith { name, value } => format!(
                "begins_with({}, {})",
                placeholders.name(name),
                placeholders.value(value)
            ),
            Condition::Contains { name, value } => format!(
                "contains({}, {})",
                placeholders.name(name),
                placeholders.value(value)
            ),
            Condition::Exists(name) => format!("attribute_exists({})", placeholders.name(name)),
            Condition::NotExists(name) => {
                format!("attribute_not_exists({})", placeholders.name(name))
            }
            Condition::In { name, values } => {
                let name = placeholders.name(name);
                let values: Vec<String> = values.iter().map(|v| placeholders.value(v)).collect();
                format!("{name} IN ({})", values.join(", "))
            }
            Condition::And(conditions) => join(conditions, " AND ", placeholders),
            Condition::Or(conditions) => join(conditions, " OR ", placeholders),
            Condition::Not(inner) => format!("NOT ({})", inner.render(placeholders)),
        }
    }
}

fn join(conditions: &[Condition], separator: &str, placeholders: &mut Placeholders) -> String {
    conditions
        .iter()
        .map(|c| format!("({})", c.render(placeholders)))
        .collect::<Vec<_>>()
        .join(separator)
}

/// A `KeyConditionExpression`: partition key equality plus an optional
/// condition on the sort key.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyCondition {
    /// Partition key attribute.
    pub partition_key: String,
    /// Required partition key value.
    pub partition_value: DynamoValue,
    /// `=`, a one-sided range, or `begins_with` on the sort key.
    pub sort: Option<Condition>,
}

impl KeyCondition {
    /// Evaluates the key condition against an item.
    pub fn evaluate(&self, item: &DynamoItem) -> bool {
        let partition_matches = item
            .get(&self.partition_key)
            .is_some_and(|v| values_equal(&from_dynamo(v), &from_dynamo(&self.partition_value)));
        partition_matches && self.sort.as_ref().is_none_or(|c| c.evaluate(item))
    }

    fn render(&self, placeholders: &mut Placeholders) -> String {
        let partition = Condition::Compare {
            name: self.partition_key.clone(),
            op: CompareOp::Eq,
            value: self.partition_value.clone(),
        };
        match &self.sort {
            Some(sort) => format!(
                "{} AND {}",
                partition.render(placeholders),
                sort.render(placeholders)
            ),
            None => partition.render(placeholders),
        }
    }
}

/// Expression strings with their attribute name and value placeholders.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderedExpressions {
    /// `KeyConditionExpression`.
    pub key_condition: Option<String>,
    /// `FilterExpression` or `ConditionExpression`.
    pub condition: Option<String>,
    /// `ExpressionAttributeNames`.
    pub names: BTreeMap<String, String>,
    /// `ExpressionAttributeValues`.
    pub values: BTreeMap<String, DynamoValue>,
}

impl RenderedExpressions {
    /// Renders a key condition and a filter sharing one placeholder space.
    pub fn render(key_condition: Option<&KeyCondition>, condition: Option<&Condition>) -> Self {
        let mut placeholders = Placeholders::default();
        let key_condition = key_condition.map(|k| k.render(&mut placeholders));
        let condition = condition.map(|c| c.render(&mut placeholders));
        Self {
            key_condition,
            condition,
            names: placeholders.names,
            values: placeholders.values,
        }
    }
}

#[derive(Default)]
struct Placeholders {
    by_attr: BTreeMap<String, String>,
    names: BTreeMap<String, String>,
    values: BTreeMap<String, DynamoValue>,
}

impl Placeholders {
    fn name(&mut self, attr: &str) -> String {
        if let Some(placeholder) = self.by_attr.get(attr) {
            return placeholder.clone();
        }
        let placeholder = format!("#n{}", self.by_attr.len());
        self.by_attr.insert(attr.to_string(), placeholder.clone());
        self.names.insert(placeholder.clone(), attr.to_string());
        placeholder
    }

    fn value(&mut self, value: &DynamoValue) -> String {
        let placeholder = format!(":v{}", self.values.len());
        self.values.insert(placeholder.clone(), value.clone());
        placeholder
    }
}

/// The native parts of a request derived from a filter.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitFilter {
    /// Key condition when querying an index; `None` for a scan.
    pub key_condition: Option<KeyCondition>,
    /// Server-side filter over the remaining conditions.
    pub filter: Option<Condition>,
    /// False if the returned items must be re-checked client-side.
    pub handled: bool,
}

/// Splits `filter` into a key condition on `index` and a filter condition.
///
/// With `index = None` the whole filter becomes the scan filter. Conjuncts
/// used for the key condition are removed from the filter; any other
/// conjunct touching the index's key attributes is left to the client, as
/// query filters may not reference key attributes.
pub fn split_filter(filter: &Filter, index: Option<&DynamoIndex>, attrs: &[Attr]) -> SplitFilter {
    let Some(index) = index else {
        let (filter, handled) = translate(filter, attrs);
        return SplitFilter {
            key_condition: None,
            filter,
            handled,
        };
    };

    let mut remaining: Vec<&Filter> = match filter {
        Filter::And(children) => children.iter().collect(),
        other => vec![other],
    };

    let partition = take_conjunct(&mut remaining, |f| {
        f.name == index.partition_key && key_equality(f, attrs).is_some()
    });
    let Some(partition) = partition else {
        return split_filter(filter, None, attrs);
    };

    let sort = index.sort_key.as_ref().and_then(|sort_key| {
        take_conjunct(&mut remaining, |f| {
            &f.name == sort_key && key_equality(f, attrs).is_some()
        })
        .or_else(|| take_conjunct(&mut remaining, |f| &f.name == sort_key && key_range(f, attrs)))
    });

    let mut handled = true;
    let mut conditions = Vec::new();
    for conjunct in remaining {
        if conjunct.attr_names().iter().any(|n| index.is_key_attr(n)) {
            handled = false;
            continue;
        }
        let (condition, conjunct_handled) = translate(conjunct, attrs);
        handled &= conjunct_handled;
        conditions.extend(condition);
    }

    SplitFilter {
        key_condition: Some(KeyCondition {
            partition_key: partition.name.clone(),
            partition_value: to_dynamo(key_equality(partition, attrs).unwrap_or(&partition.value)),
            sort: sort.and_then(|f| sort_condition(f, attrs)),
        }),
        filter: Condition::and(conditions),
        handled,
    }
}

fn take_conjunct<'f>(
    remaining: &mut Vec<&'f Filter>,
    predicate: impl Fn(&AttrFilter) -> bool,
) -> Option<&'f AttrFilter> {
    let position = remaining
        .iter()
        .position(|f| matches!(f, Filter::Attr(a) if predicate(a)))?;
    match remaining.remove(position) {
        Filter::Attr(f) => Some(f),
        _ => None,
    }
}

fn sort_condition(filter: &AttrFilter, attrs: &[Attr]) -> Option<Condition> {
    if let Some(value) = key_equality(filter, attrs) {
        return Some(Condition::Compare {
            name: filter.name.clone(),
            op: CompareOp::Eq,
            value: to_dynamo(value),
        });
    }
    match filter.op {
        FilterOp::StartsWith => Some(Condition::BeginsWith {
            name: filter.name.clone(),
            value: to_dynamo(&filter.value),
        }),
        op => CompareOp::from_filter_op(op).map(|op| Condition::Compare {
            name: filter.name.clone(),
            op,
            value: to_dynamo(&filter.value),
        }),
    }
}

/// Translates a filter into a condition.
///
/// Returns `(None, true)` for a filter matching everything and
/// `(None, false)` when nothing could be pushed down.
fn translate(filter: &Filter, attrs: &[Attr]) -> (Option<Condition>, bool) {
    match filter {
        Filter::IncludeAll => (None, true),
        Filter::ExcludeAll | Filter::Query(_) => (None, false),
        Filter::Attr(f) => match translate_attr(f, attrs) {
            Some(condition) => (Some(condition), true),
            None => (None, false),
        },
        Filter::And(children) => {
            let mut handled = true;
            let mut conditions = Vec::new();
            for child in children {
                let (condition, child_handled) = translate(child, attrs);
                handled &= child_handled;
                conditions.extend(condition);
            }
            (Condition::and(conditions), handled)
        }
        Filter::Or(children) => {
            let translated: Vec<_> = children.iter().map(|c| translate(c, attrs)).collect();
            // An empty disjunction has no expression form.
            if translated.is_empty() || translated.iter().any(|(_, handled)| !handled) {
                return (None, false);
            }
            let conditions: Option<Vec<Condition>> =
                translated.into_iter().map(|(c, _)| c).collect();
            match conditions {
                Some(conditions) => (Some(Condition::Or(conditions)), true),
                None => (None, true),
            }
        }
        Filter::Not(inner) => match translate(inner, attrs) {
            (Some(condition), true) => (Some(Condition::Not(Box::new(condition))), true),
            _ => (None, false),
        },
    }
}

fn translate_attr(filter: &AttrFilter, attrs: &[Attr]) -> Option<Condition> {
    let name = filter.name.clone();
    let value = &filter.value;
    match filter.op {
        FilterOp::Exists => Some(Condition::Exists(name)),
        FilterOp::NotExists => Some(Condition::NotExists(name)),
        FilterOp::Eq if is_scalar(value) => Some(Condition::Compare {
            name,
            op: CompareOp::Eq,
            value: to_dynamo(value),
        }),
        FilterOp::Ne if is_scalar(value) => Some(Condition::And(vec![
            Condition::Exists(name.clone()),
            Condition::Compare {
                name,
                op: CompareOp::Ne,
                value: to_dynamo(value),
            },
        ])),
        op if op.is_range() && (value.is_string() || value.is_number()) => {
            CompareOp::from_filter_op(op).map(|op| Condition::Compare {
                name,
                op,
                value: to_dynamo(value),
            })
        }
        FilterOp::Contains if value.is_string() && is_string_attr(&name, attrs) => {
            Some(Condition::Contains {
                name,
                value: to_dynamo(value),
            })
        }
        FilterOp::StartsWith if value.is_string() && is_string_attr(&name, attrs) => {
            Some(Condition::BeginsWith {
                name,
                value: to_dynamo(value),
            })
        }
        FilterOp::OneOf => match value {
            Value::Array(values)
                if !values.is_empty()
                    && values.len() <= MAX_IN_OPERANDS
                    && values.iter().all(is_scalar) =>
            {
                Some(Condition::In {
                    name,
                    values: values.iter().map(to_dynamo).collect(),
                })
            }
            single if is_scalar(single) => Some(Condition::Compare {
                name,
                op: CompareOp::Eq,
                value: to_dynamo(single),
            }),
            _ => None,
        },
        _ => None,
    }
}

fn is_scalar(value: &Value) -> bool {
    value.is_string() || value.is_number() || value.is_boolean()
}

fn is_string_attr(name: &str, attrs: &[Attr]) -> bool {
    attrs.iter().find(|a| a.name == name).is_some_and(|a| {
        matches!(
            a.attr_type(),
            AttrType::String | AttrType::Datetime | AttrType::Uuid
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::dynamodb::conversions::item_from_dynamo;
    use crate::filter::attr;

    fn attrs() -> Vec<Attr> {
        vec![
            Attr::string("customer_id"),
            Attr::string("status"),
            Attr::datetime("created_at"),
            Attr::int("total"),
            Attr::string("note"),
        ]
    }

    fn gsi() -> DynamoIndex {
        DynamoIndex::global("gsi1", "status", Some("created_at"))
    }

    fn item(pairs: &[(&str, DynamoValue)]) -> DynamoItem {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_split_moves_key_conjuncts_to_key_condition() {
        let filter = attr("status").eq("shipped")
            & attr("created_at").gt("2024-01-01")
            & attr("total").gte(100);
        let index = gsi();
        let split = split_filter(&filter, Some(&index), &attrs());

        let key = split.key_condition.unwrap();
        assert_eq!(key.partition_key, "status");
        assert!(matches!(
            key.sort,
            Some(Condition::Compare { op: CompareOp::Gt, .. })
        ));
        assert!(matches!(
            split.filter,
            Some(Condition::Compare { ref name, op: CompareOp::Ge, .. }) if name == "total"
        ));
        assert!(split.handled);
    }

    #[test]
    fn test_second_key_range_is_left_to_client() {
        let filter = attr("status").eq("shipped")
            & attr("created_at").gt("2024-01-01")
            & attr("created_at").lt("2025-01-01");
        let index = gsi();
        let split = split_filter(&filter, Some(&index), &attrs());
        assert!(split.filter.is_none());
        assert!(!split.handled);
    }

    #[test]
    fn test_unmappable_operators_are_unhandled() {
        let split = split_filter(&attr("note").endswith("x"), None, &attrs());
        assert!(split.filter.is_none());
        assert!(!split.handled);

        let split = split_filter(&Filter::query("dune"), None, &attrs());
        assert!(!split.handled);

        let filter = attr("total").gt(1) & attr("note").endswith("x");
        let split = split_filter(&filter, None, &attrs());
        assert!(split.filter.is_some());
        assert!(!split.handled);

        let filter = attr("total").gt(1) | attr("note").endswith("x");
        let split = split_filter(&filter, None, &attrs());
        assert!(split.filter.is_none());
        assert!(!split.handled);

        let split = split_filter(&!attr("note").endswith("x"), None, &attrs());
        assert!(split.filter.is_none());
        assert!(!split.handled);
    }

    #[test]
    fn test_contains_needs_string_attribute() {
        let split = split_filter(&attr("total").contains("9"), None, &attrs());
        assert!(!split.handled);
        let split = split_filter(&attr("note").contains("gift"), None, &attrs());
        assert!(split.handled);
    }

    #[test]
    fn test_render_shares_placeholders() {
        let key = KeyCondition {
            partition_key: "status".to_string(),
            partition_value: DynamoValue::S("shipped".to_string()),
            sort: Some(Condition::BeginsWith {
                name: "created_at".to_string(),
                value: DynamoValue::S("2024".to_string()),
            }),
        };
        let filter = Condition::Or(vec![
            Condition::Exists("note".to_string()),
            Condition::In {
                name: "status".to_string(),
                values: vec![DynamoValue::S("a".to_string()), DynamoValue::S("b".to_string())],
            },
        ]);
        let rendered = RenderedExpressions::render(Some(&key), Some(&filter));
        assert_eq!(
            rendered.key_condition.as_deref(),
            Some("#n0 = :v0 AND begins_with(#n1, :v1)")
        );
        assert_eq!(
            rendered.condition.as_deref(),
            Some("(attribute_exists(#n2)) OR (#n0 IN (:v2, :v3))")
        );
        assert_eq!(rendered.names["#n0"], "status");
        assert_eq!(rendered.values.len(), 4);
    }

    #[test]
    fn test_evaluate_matches_filter_semantics() {
        let shipped = item(&[
            ("status", DynamoValue::S("shipped".to_string())),
            ("total", DynamoValue::N("120".to_string())),
        ]);
        let filters = [
            attr("total").gte(100),
            attr("total").ne("120"),
            attr("note").ne("x"),
            !attr("note").eq("x"),
            attr("status").one_of(["open", "shipped"]),
            attr("status").startswith("ship"),
            attr("note").not_exists(),
        ];
        let json = item_from_dynamo(&shipped);
        for filter in filters {
            let split = split_filter(&filter, None, &attrs());
            assert!(split.handled, "{filter:?}");
            let server = split.filter.as_ref().is_none_or(|c| c.evaluate(&shipped));
            assert_eq!(server, filter.matches(&json, &attrs()), "{filter:?}");
        }
    }
}
