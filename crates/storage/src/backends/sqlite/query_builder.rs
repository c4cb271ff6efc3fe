//! SQL query builder.
//!
//! Translates filter and comparator trees into `WHERE` and `ORDER BY`
//! clauses, and builds the parameterized CRUD statements. Every translated
//! filter reports whether it is fully handled; a partially handled filter is
//! an over-approximation the caller re-checks with
//! [`Filter::matches`](crate::filter::Filter::matches).
//!
//! Attribute comparisons are null-guarded (`"col" IS NOT NULL AND ...`) so
//! they evaluate to false rather than `NULL` for missing values, which keeps
//! `NOT` consistent with in-memory matching.

use rusqlite::ToSql;
use rusqlite::types::ToSqlOutput;
use serde_json::Value;
use tracing::warn;

use super::table::{Column, Table};
use crate::filter::{AttrFilter, Comparator, Filter, FilterOp};
use crate::filter::value::string_form;
use crate::error::ValidationError;
use crate::meta::{Attr, AttrType};
use crate::types::{Item, value_kind};

/// A fragment of SQL with bound parameters.
///
/// An empty fragment places no constraint on the rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlFragment {
    /// The SQL clause.
    pub sql: String,
    /// Bound parameter values, in placeholder order.
    pub params: Vec<SqlParam>,
}

/// A bound SQL parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    /// String parameter.
    String(String),
    /// Integer parameter.
    Integer(i64),
    /// Float parameter.
    Float(f64),
    /// Null parameter.
    Null,
}

impl SqlParam {
    /// Creates a string parameter.
    pub fn string(s: impl Into<String>) -> Self {
        SqlParam::String(s.into())
    }
}

impl ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        use rusqlite::types::Value as Sql;
        Ok(ToSqlOutput::Owned(match self {
            SqlParam::String(s) => Sql::Text(s.clone()),
            SqlParam::Integer(i) => Sql::Integer(*i),
            SqlParam::Float(f) => Sql::Real(*f),
            SqlParam::Null => Sql::Null,
        }))
    }
}

impl SqlFragment {
    /// Creates a new SQL fragment.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Creates a fragment with parameters.
    pub fn with_params(sql: impl Into<String>, params: Vec<SqlParam>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// A fragment matching no row.
    pub fn never() -> Self {
        Self::new("0")
    }

    /// Combines with another fragment using AND.
    pub fn and(mut self, other: SqlFragment) -> Self {
        if !self.sql.is_empty() && !other.sql.is_empty() {
            self.sql = format!("({}) AND ({})", self.sql, other.sql);
        } else if !other.sql.is_empty() {
            self.sql = other.sql;
        }
        self.params.extend(other.params);
        self
    }

    /// Combines with another fragment using OR.
    ///
    /// Both fragments must be non-empty.
    pub fn or(mut self, other: SqlFragment) -> Self {
        self.sql = format!("({}) OR ({})", self.sql, other.sql);
        self.params.extend(other.params);
        self
    }

    /// Returns true if this fragment is empty.
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    /// Renders ` WHERE ...`, or nothing for an empty fragment.
    pub fn where_clause(&self) -> String {
        if self.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.sql)
        }
    }
}

/// A translated filter.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    /// The condition.
    pub fragment: SqlFragment,
    /// True if the condition alone decides the result.
    pub handled: bool,
}

impl WhereClause {
    fn handled(fragment: SqlFragment) -> Self {
        Self {
            fragment,
            handled: true,
        }
    }

    fn unhandled() -> Self {
        Self {
            fragment: SqlFragment::default(),
            handled: false,
        }
    }
}

/// Builds SQL statements for one table.
#[derive(Debug, Clone)]
pub struct QueryBuilder<'a> {
    table: &'a Table,
    attrs: &'a [Attr],
}

impl<'a> QueryBuilder<'a> {
    /// Creates a builder for `table`, whose attributes are `attrs`.
    pub fn new(table: &'a Table, attrs: &'a [Attr]) -> Self {
        Self { table, attrs }
    }

    /// Translates a filter into a `WHERE` condition.
    pub fn build_where(&self, filter: &Filter) -> WhereClause {
        match filter {
            Filter::IncludeAll => WhereClause::handled(SqlFragment::default()),
            Filter::ExcludeAll => WhereClause::handled(SqlFragment::never()),
            Filter::And(children) => {
                let mut fragment = SqlFragment::default();
                let mut handled = true;
                for child in children {
                    let clause = self.build_where(child);
                    handled &= clause.handled;
                    fragment = fragment.and(clause.fragment);
                }
                WhereClause { fragment, handled }
            }
            Filter::Or(children) => {
                let mut combined: Option<SqlFragment> = None;
                for child in children {
                    let clause = self.build_where(child);
                    if !clause.handled {
                        return WhereClause::unhandled();
                    }
                    if clause.fragment.is_empty() {
                        return WhereClause::handled(SqlFragment::default());
                    }
                    combined = Some(match combined {
                        Some(acc) => acc.or(clause.fragment),
                        None => clause.fragment,
                    });
                }
                WhereClause::handled(combined.unwrap_or_else(SqlFragment::never))
            }
            Filter::Not(inner) => {
                let clause = self.build_where(inner);
                if !clause.handled {
                    WhereClause::unhandled()
                } else if clause.fragment.is_empty() {
                    WhereClause::handled(SqlFragment::never())
                } else {
                    WhereClause::handled(SqlFragment::with_params(
                        format!("NOT ({})", clause.fragment.sql),
                        clause.fragment.params,
                    ))
                }
            }
            Filter::Attr(filter) => match self.attr_condition(filter) {
                Some(fragment) => WhereClause::handled(fragment),
                None => WhereClause::unhandled(),
            },
            Filter::Query(text) => match self.query_condition(text) {
                Some(fragment) => WhereClause {
                    fragment,
                    handled: false,
                },
                None => WhereClause::unhandled(),
            },
        }
    }

    fn attr_condition(&self, filter: &AttrFilter) -> Option<SqlFragment> {
        let column = self.table.column(&filter.name)?;
        let ident = column.ident();
        let guarded = |condition: String, params: Vec<SqlParam>| {
            SqlFragment::with_params(format!("{ident} IS NOT NULL AND {condition}"), params)
        };

        let fragment = match filter.op {
            FilterOp::Exists => SqlFragment::new(format!("{ident} IS NOT NULL")),
            FilterOp::NotExists => SqlFragment::new(format!("{ident} IS NULL")),
            FilterOp::Eq
            | FilterOp::Ne
            | FilterOp::Gt
            | FilterOp::Gte
            | FilterOp::Lt
            | FilterOp::Lte => {
                if column.attr_type == AttrType::Json {
                    return None;
                }
                let param = column.param(&filter.value)?;
                if param == SqlParam::Null {
                    // Nothing equals, or orders against, a null operand.
                    return Some(match filter.op {
                        FilterOp::Ne => SqlFragment::new(format!("{ident} IS NOT NULL")),
                        _ => SqlFragment::never(),
                    });
                }
                guarded(format!("{ident} {} ?", comparison(filter.op)), vec![param])
            }
            FilterOp::Contains | FilterOp::StartsWith | FilterOp::EndsWith => {
                if !column.supports_like() {
                    return None;
                }
                let operand = escape_like(&string_form(&filter.value));
                let pattern = match filter.op {
                    FilterOp::Contains => format!("%{operand}%"),
                    FilterOp::StartsWith => format!("{operand}%"),
                    _ => format!("%{operand}"),
                };
                guarded(
                    format!("{ident} LIKE ? ESCAPE '\\'"),
                    vec![SqlParam::String(pattern)],
                )
            }
            FilterOp::OneOf => {
                if column.attr_type == AttrType::Json {
                    return None;
                }
                let values: Vec<&Value> = match &filter.value {
                    Value::Array(values) => values.iter().collect(),
                    single => vec![single],
                };
                let params = values
                    .into_iter()
                    .filter(|v| !v.is_null())
                    .map(|v| column.param(v))
                    .collect::<Option<Vec<_>>>()?;
                if params.is_empty() {
                    return Some(SqlFragment::never());
                }
                let placeholders = vec!["?"; params.len()].join(", ");
                guarded(format!("{ident} IN ({placeholders})"), params)
            }
        };
        Some(fragment)
    }

    /// Narrows a free-text query to rows that may match.
    ///
    /// SQLite's `LOWER` only folds ASCII, so rows holding any non-ASCII
    /// character pass through to the client-side check. A needle that is
    /// still non-ASCII after folding has no SQL form.
    fn query_condition(&self, text: &str) -> Option<SqlFragment> {
        let needle = text.to_lowercase();
        if !needle.is_ascii() {
            return None;
        }
        let pattern = format!("%{}%", escape_like(&needle));
        let mut combined: Option<SqlFragment> = None;
        for attr in self.attrs.iter().filter(|a| a.is_text_searchable()) {
            let Some(column) = self.table.column(&attr.name) else {
                continue;
            };
            let ident = column.ident();
            let condition = SqlFragment::with_params(
                format!(
                    "{ident} IS NOT NULL AND (LOWER({ident}) LIKE ? ESCAPE '\\' OR {ident} GLOB ?)"
                ),
                vec![
                    SqlParam::String(pattern.clone()),
                    SqlParam::string(NON_ASCII_GLOB),
                ],
            );
            combined = Some(match combined {
                Some(acc) => acc.or(condition),
                None => condition,
            });
        }
        Some(combined.unwrap_or_else(SqlFragment::never))
    }

    /// Translates a comparator into `ORDER BY` terms, always ending with the
    /// primary key so pages are stable.
    ///
    /// Terms naming an attribute without a column are dropped with a warning.
    pub fn build_order(&self, order: Option<&Comparator>) -> String {
        let mut terms = Vec::new();
        if let Some(order) = order {
            for (name, desc) in order.terms() {
                let Some(column) = self.table.column(name) else {
                    warn!(
                        table = %self.table.name(),
                        attr = %name,
                        "dropping ORDER BY term without a column"
                    );
                    continue;
                };
                let ident = column.ident();
                if desc {
                    terms.push(format!("{ident} IS NULL DESC, {ident} DESC"));
                } else {
                    terms.push(format!("{ident} IS NULL, {ident} ASC"));
                }
            }
        }
        terms.extend(self.table.key_columns().map(|c| format!("{} ASC", c.ident())));
        format!(" ORDER BY {}", terms.join(", "))
    }

    /// `SELECT` of all columns, with a condition and ordering.
    pub fn select(&self, condition: &SqlFragment, order: Option<&Comparator>) -> String {
        format!(
            "SELECT {} FROM {}{}{}",
            self.table.column_list(),
            self.table.ident(),
            condition.where_clause(),
            self.build_order(order)
        )
    }

    /// `SELECT COUNT(*)` with a condition.
    pub fn count(&self, condition: &SqlFragment) -> String {
        format!(
            "SELECT COUNT(*) FROM {}{}",
            self.table.ident(),
            condition.where_clause()
        )
    }

    /// Condition selecting one row by its key attribute values.
    pub fn key_condition(&self, key_values: &Item) -> Option<SqlFragment> {
        let mut fragment = SqlFragment::default();
        for column in self.table.key_columns() {
            let param = column.param(key_values.get(&column.name)?)?;
            fragment = fragment.and(SqlFragment::with_params(
                format!("{} = ?", column.ident()),
                vec![param],
            ));
        }
        Some(fragment)
    }

    /// `INSERT` of the columns present in `item`.
    pub fn insert(&self, item: &Item) -> Result<SqlFragment, ValidationError> {
        let mut names = Vec::new();
        let mut params = Vec::new();
        for column in self.table.columns() {
            if let Some(value) = item.get(&column.name).filter(|v| !v.is_null()) {
                names.push(column.ident());
                params.push(self.bind(column, value)?);
            }
        }
        let sql = if names.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", self.table.ident())
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.table.ident(),
                names.join(", "),
                vec!["?"; names.len()].join(", ")
            )
        };
        Ok(SqlFragment::with_params(sql, params))
    }

    /// Full-replace `UPDATE` of every non-key column; absent values become
    /// `NULL`.
    pub fn update(&self, item: &Item, key: &SqlFragment) -> Result<SqlFragment, ValidationError> {
        let mut sets = Vec::new();
        let mut params = Vec::new();
        for column in self.table.columns().iter().filter(|c| !c.primary_key) {
            sets.push(format!("{} = ?", column.ident()));
            params.push(match item.get(&column.name) {
                Some(value) => self.bind(column, value)?,
                None => SqlParam::Null,
            });
        }
        if sets.is_empty() {
            // Key-only table: a no-op assignment still reports the affected row.
            if let Some(first) = self.table.key_columns().next() {
                sets.push(format!("{0} = {0}", first.ident()));
            }
        }
        params.extend(key.params.iter().cloned());
        Ok(SqlFragment::with_params(
            format!(
                "UPDATE {} SET {} WHERE {}",
                self.table.ident(),
                sets.join(", "),
                key.sql
            ),
            params,
        ))
    }

    fn bind(&self, column: &Column, value: &Value) -> Result<SqlParam, ValidationError> {
        column.param(value).ok_or_else(|| ValidationError::TypeMismatch {
            storage: self.table.name().to_string(),
            field: column.name.clone(),
            expected: column.attr_type.name().to_string(),
            actual: value_kind(value).to_string(),
        })
    }

    /// `DELETE` by key.
    pub fn delete(&self, key: &SqlFragment) -> SqlFragment {
        SqlFragment::with_params(
            format!("DELETE FROM {} WHERE {}", self.table.ident(), key.sql),
            key.params.clone(),
        )
    }
}

fn comparison(op: FilterOp) -> &'static str {
    match op {
        FilterOp::Eq => "=",
        FilterOp::Ne => "<>",
        FilterOp::Gt => ">",
        FilterOp::Gte => ">=",
        FilterOp::Lt => "<",
        _ => "<=",
    }
}

/// Matches any string containing a character outside ASCII.
const NON_ASCII_GLOB: &str = "*[^\u{1}-\u{7f}]*";

/// Escapes `\`, `%` and `_` for a `LIKE ... ESCAPE '\'` pattern.
pub fn escape_like(operand: &str) -> String {
    let mut escaped = String::with_capacity(operand.len());
    for c in operand.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
