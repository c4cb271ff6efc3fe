//! Table and column derivation from storage metadata.

use rusqlite::types::ValueRef;
use serde_json::{Number, Value};

use super::query_builder::SqlParam;
use crate::meta::{AttrGenerator, AttrType, StorageMeta};
use crate::types::Item;

/// Longest bounded string stored as `VARCHAR(n)`; longer ones use `TEXT`.
const MAX_VARCHAR: usize = 255;

/// A column derived from one attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Column (and attribute) name.
    pub name: String,
    /// Declared attribute type.
    pub attr_type: AttrType,
    /// SQL column type.
    pub sql_type: String,
    /// Part of the primary key.
    pub primary_key: bool,
    /// Integer key assigned by SQLite.
    pub autoincrement: bool,
}

impl Column {
    /// Returns the quoted column identifier.
    pub fn ident(&self) -> String {
        quote_ident(&self.name)
    }

    /// Whether string operators can run server-side with identical results.
    pub fn supports_like(&self) -> bool {
        matches!(
            self.attr_type,
            AttrType::String | AttrType::Datetime | AttrType::Uuid | AttrType::Int
        )
    }

    /// Converts a filter operand or item value to a bound parameter.
    ///
    /// Returns `None` when the value's kind differs from the column's, since
    /// SQLite's type affinity would then compare differently from items.
    pub fn param(&self, value: &Value) -> Option<SqlParam> {
        match (self.attr_type, value) {
            (_, Value::Null) => Some(SqlParam::Null),
            (AttrType::Json, value) => Some(SqlParam::String(value.to_string())),
            (AttrType::Int | AttrType::Float, Value::Number(n)) => Some(match n.as_i64() {
                Some(i) => SqlParam::Integer(i),
                None => SqlParam::Float(n.as_f64()?),
            }),
            (AttrType::Bool, Value::Bool(b)) => Some(SqlParam::Integer(i64::from(*b))),
            (AttrType::String | AttrType::Datetime | AttrType::Uuid, Value::String(s)) => {
                Some(SqlParam::String(s.clone()))
            }
            _ => None,
        }
    }

    /// Converts a stored value back into an item value.
    pub fn read_value(&self, raw: ValueRef<'_>) -> Option<Value> {
        match raw {
            ValueRef::Null => None,
            ValueRef::Integer(i) => Some(match self.attr_type {
                AttrType::Bool => Value::Bool(i != 0),
                AttrType::Float => Number::from_f64(i as f64).map_or(Value::from(i), Value::Number),
                _ => Value::from(i),
            }),
            ValueRef::Real(f) => Number::from_f64(f).map(Value::Number),
            ValueRef::Text(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                match self.attr_type {
                    AttrType::Json => serde_json::from_str(&text).ok(),
                    _ => Some(Value::String(text.into_owned())),
                }
            }
            ValueRef::Blob(_) => None,
        }
    }

    fn definition(&self, single_key: bool) -> String {
        let mut def = format!("{} {}", self.ident(), self.sql_type);
        if self.primary_key {
            def.push_str(" NOT NULL");
        }
        if self.primary_key && single_key {
            def.push_str(" PRIMARY KEY");
            if self.autoincrement {
                def.push_str(" AUTOINCREMENT");
            }
        }
        def
    }
}

/// The table backing one storage.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
}

impl Table {
    /// Derives the table layout from storage metadata.
    pub fn from_meta(meta: &StorageMeta) -> Self {
        let key_config = meta.key_config();
        let single_key = key_config.attr_names().len() == 1;
        let columns = meta
            .attrs()
            .iter()
            .map(|attr| {
                let primary_key = key_config.is_key_attr(&attr.name);
                let attr_type = attr.attr_type();
                Column {
                    name: attr.name.clone(),
                    attr_type,
                    sql_type: sql_type(attr_type, attr.schema.max_length),
                    primary_key,
                    autoincrement: primary_key
                        && single_key
                        && attr_type == AttrType::Int
                        && attr.create_generator == Some(AttrGenerator::Sequence),
                }
            })
            .collect();
        Self {
            name: meta.name().to_string(),
            columns,
        }
    }

    /// Returns the table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the quoted table identifier.
    pub fn ident(&self) -> String {
        quote_ident(&self.name)
    }

    /// Returns all columns in attribute order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Looks up a column by attribute name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Returns the primary key columns.
    pub fn key_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.primary_key)
    }

    /// Returns the autoincrement column, if any.
    pub fn autoincrement_column(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.autoincrement)
    }

    /// Comma-separated quoted column list.
    pub fn column_list(&self) -> String {
        self.columns
            .iter()
            .map(Column::ident)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Builds the `CREATE TABLE` statement.
    pub fn create_sql(&self) -> String {
        let key_names: Vec<String> = self.key_columns().map(Column::ident).collect();
        let single_key = key_names.len() == 1;
        let mut parts: Vec<String> = self
            .columns
            .iter()
            .map(|c| c.definition(single_key))
            .collect();
        if !single_key && !key_names.is_empty() {
            parts.push(format!("PRIMARY KEY ({})", key_names.join(", ")));
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.ident(),
            parts.join(", ")
        )
    }

    /// Rebuilds an item from one row selected with [`Table::column_list`].
    pub fn read_row(&self, row: &rusqlite::Row<'_>) -> rusqlite::Result<Item> {
        let mut item = Item::new();
        for (index, column) in self.columns.iter().enumerate() {
            if let Some(value) = column.read_value(row.get_ref(index)?) {
                item.insert(column.name.clone(), value);
            }
        }
        Ok(item)
    }
}

fn sql_type(attr_type: AttrType, max_length: Option<usize>) -> String {
    match attr_type {
        AttrType::Int => "INTEGER".to_string(),
        AttrType::Float => "FLOAT".to_string(),
        AttrType::Bool => "BOOLEAN".to_string(),
        AttrType::Datetime => "DATETIME".to_string(),
        AttrType::Uuid => "VARCHAR(36)".to_string(),
        AttrType::String => match max_length {
            Some(n) if n <= MAX_VARCHAR => format!("VARCHAR({n})"),
            _ => "TEXT".to_string(),
        },
        AttrType::Json => "TEXT".to_string(),
    }
}

/// Quotes an SQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{Attr, KeyConfig};
    use serde_json::json;

    #[test]
    fn test_create_sql_single_key() {
        let meta = StorageMeta::builder("books")
            .attr(Attr::string("id").max_length(36))
            .attr(Attr::string("title"))
            .attr(Attr::int("year").nullable())
            .attr(Attr::new("price", AttrType::Float))
            .attr(Attr::new("in_print", AttrType::Bool))
            .attr(Attr::datetime("updated_at"))
            .build()
            .unwrap();
        let table = Table::from_meta(&meta);
        assert_eq!(
            table.create_sql(),
            "CREATE TABLE IF NOT EXISTS \"books\" (\"id\" VARCHAR(36) NOT NULL PRIMARY KEY, \
             \"title\" TEXT, \"year\" INTEGER, \"price\" FLOAT, \"in_print\" BOOLEAN, \
             \"updated_at\" DATETIME)"
        );
    }

    #[test]
    fn test_create_sql_autoincrement_and_composite() {
        let meta = StorageMeta::builder("events")
            .attr(Attr::int("id").with_create_generator(AttrGenerator::Sequence))
            .build()
            .unwrap();
        assert!(
            Table::from_meta(&meta)
                .create_sql()
                .contains("\"id\" INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT")
        );

        let meta = StorageMeta::builder("lines")
            .attr(Attr::string("order_id"))
            .attr(Attr::int("line"))
            .key_config(KeyConfig::composite(["order_id", "line"]))
            .build()
            .unwrap();
        assert!(
            Table::from_meta(&meta)
                .create_sql()
                .ends_with("PRIMARY KEY (\"order_id\", \"line\"))")
        );
    }

    #[test]
    fn test_param_kind_mismatch() {
        let meta = StorageMeta::builder("books")
            .attr(Attr::string("id"))
            .attr(Attr::int("year"))
            .build()
            .unwrap();
        let table = Table::from_meta(&meta);
        let year = table.column("year").unwrap();
        assert_eq!(year.param(&json!(1970)), Some(SqlParam::Integer(1970)));
        assert_eq!(year.param(&json!("1970")), None);
        assert_eq!(table.column("id").unwrap().param(&json!(1)), None);
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
