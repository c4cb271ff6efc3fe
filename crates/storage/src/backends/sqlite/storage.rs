//! Storage implementation for the SQLite backend.

use std::fmt::Debug;
use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, ErrorCode, params_from_iter};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::backend::{SqlStorageConfig, get_connection, open_pool};
use super::query_builder::{QueryBuilder, SqlParam, WhereClause};
use super::table::{Table, quote_ident};
use crate::clock::{Clock, SystemClock};
use crate::core::{ItemIter, Storage, decode_offset, look_ahead_page, offset_page};
use crate::error::{StorageError, StorageResult};
use crate::filter::{Filter, SearchFilter};
use crate::meta::StorageMeta;
use crate::types::{Item, Page};

/// Storage backed by one SQLite table.
///
/// Filters are translated into `WHERE` clauses; whatever cannot be translated
/// exactly is re-checked client-side after the rows are loaded. Each call
/// checks out one pooled connection and returns it on every exit path.
pub struct SqlStorage {
    meta: StorageMeta,
    table: Table,
    pool: Pool<SqliteConnectionManager>,
    config: SqlStorageConfig,
    clock: Arc<dyn Clock>,
}

impl Debug for SqlStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlStorage")
            .field("table", &self.table.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SqlStorage {
    /// Opens a storage over a private in-memory database.
    pub fn in_memory(meta: StorageMeta) -> StorageResult<Self> {
        Self::new(meta, SqlStorageConfig::default())
    }

    /// Opens a storage with custom configuration, creating its table unless
    /// disabled.
    pub fn new(meta: StorageMeta, config: SqlStorageConfig) -> StorageResult<Self> {
        let pool = open_pool(&config)?;
        let storage = Self {
            table: Table::from_meta(&meta),
            meta,
            pool,
            config,
            clock: Arc::new(SystemClock),
        };
        if storage.config.create_table {
            storage.create_table()?;
        }
        Ok(storage)
    }

    /// Replaces the clock used by attribute generators.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the derived table layout.
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Returns the backend configuration.
    pub fn config(&self) -> &SqlStorageConfig {
        &self.config
    }

    /// Creates the table if it does not exist.
    pub fn create_table(&self) -> StorageResult<()> {
        let conn = get_connection(&self.pool)?;
        let sql = self.table.create_sql();
        conn.execute(&sql, [])?;
        info!(table = %self.table.name(), %sql, "created sqlite table");
        Ok(())
    }

    /// Runs a statement outside the storage, e.g. to mutate rows directly.
    pub fn execute(&self, sql: &str, params: &[SqlParam]) -> StorageResult<usize> {
        let conn = get_connection(&self.pool)?;
        Ok(conn.execute(sql, params_from_iter(params.iter()))?)
    }

    fn builder(&self) -> QueryBuilder<'_> {
        QueryBuilder::new(&self.table, self.meta.attrs())
    }

    fn query_items(&self, conn: &Connection, sql: &str, params: &[SqlParam]) -> StorageResult<Vec<Item>> {
        debug!(table = %self.table.name(), %sql, params = params.len(), "sqlite query");
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
            self.table.read_row(row)
        })?;
        let items = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    /// Loads all rows the clause selects, re-checking the filter when the
    /// clause is only an approximation.
    fn load_matching(&self, clause: &WhereClause, search: &SearchFilter) -> StorageResult<Vec<Item>> {
        let conn = get_connection(&self.pool)?;
        let sql = self.builder().select(&clause.fragment, search.order.as_ref());
        let items = self.query_items(&conn, &sql, &clause.fragment.params)?;
        if clause.handled {
            return Ok(items);
        }
        let attrs = self.meta.attrs();
        Ok(items
            .into_iter()
            .filter(|item| search.filter.matches(item, attrs))
            .collect())
    }

    fn insert(&self, conn: &Connection, item: &Item, key_hint: &str) -> StorageResult<()> {
        let insert = self.builder().insert(item)?;
        debug!(table = %self.table.name(), sql = %insert.sql, "sqlite insert");
        match conn.execute(&insert.sql, params_from_iter(insert.params.iter())) {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(StorageError::duplicate(self.meta.name(), key_hint))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn next_sequence_value(&self, conn: &Connection, name: &str) -> StorageResult<i64> {
        let sql = format!(
            "SELECT COALESCE(MAX({}), 0) + 1 FROM {}",
            quote_ident(name),
            self.table.ident()
        );
        Ok(conn.query_row(&sql, [], |row| row.get(0))?)
    }
}

impl Storage for SqlStorage {
    fn meta(&self) -> &StorageMeta {
        &self.meta
    }

    fn create(&self, mut item: Item) -> StorageResult<String> {
        self.meta.apply_create_generators(&mut item, self.clock.as_ref());
        let conn = get_connection(&self.pool)?;

        let absent = |item: &Item, name: &str| item.get(name).is_none_or(Value::is_null);
        let autoincrement = self
            .table
            .autoincrement_column()
            .filter(|c| absent(&item, &c.name))
            .map(|c| c.name.clone());

        if let Some(column) = autoincrement {
            self.insert(&conn, &item, "")?;
            item.insert(column, Value::from(conn.last_insert_rowid()));
            return self.meta.key_of(&item);
        }

        if let Some(attr) = self.meta.sequence_attr() {
            if absent(&item, &attr.name) {
                let next = self.next_sequence_value(&conn, &attr.name)?;
                item.insert(attr.name.clone(), Value::from(next));
            }
        }
        let key = self.meta.key_of(&item)?;
        self.insert(&conn, &item, &key)?;
        Ok(key)
    }

    fn read(&self, key: &str) -> StorageResult<Option<Item>> {
        let Ok(key_values) = self.meta.key_item(key) else {
            return Ok(None);
        };
        let Some(condition) = self.builder().key_condition(&key_values) else {
            return Ok(None);
        };
        let conn = get_connection(&self.pool)?;
        let sql = self.builder().select(&condition, None);
        Ok(self
            .query_items(&conn, &sql, &condition.params)?
            .into_iter()
            .next())
    }

    fn update(&self, mut item: Item) -> StorageResult<Item> {
        self.meta.apply_update_generators(&mut item, self.clock.as_ref());
        let key = self.meta.key_of(&item)?;
        let Some(condition) = self.builder().key_condition(&item) else {
            return Err(StorageError::missing(self.meta.name(), key));
        };

        let update = self.builder().update(&item, &condition)?;
        let conn = get_connection(&self.pool)?;
        debug!(table = %self.table.name(), sql = %update.sql, "sqlite update");
        let affected = conn.execute(&update.sql, params_from_iter(update.params.iter()))?;
        if affected == 0 {
            return Err(StorageError::missing(self.meta.name(), key));
        }
        Ok(item)
    }

    fn destroy(&self, key: &str) -> StorageResult<bool> {
        let Ok(key_values) = self.meta.key_item(key) else {
            return Ok(false);
        };
        let Some(condition) = self.builder().key_condition(&key_values) else {
            return Ok(false);
        };
        let delete = self.builder().delete(&condition);
        let conn = get_connection(&self.pool)?;
        let affected = conn.execute(&delete.sql, params_from_iter(delete.params.iter()))?;
        Ok(affected > 0)
    }

    fn search(&self, search: &SearchFilter) -> StorageResult<ItemIter<'_>> {
        let clause = self.builder().build_where(&search.filter);
        let items = self.load_matching(&clause, search)?;
        Ok(Box::new(items.into_iter().map(Ok)))
    }

    fn count(&self, filter: &Filter) -> StorageResult<u64> {
        let clause = self.builder().build_where(filter);
        if !clause.handled {
            warn!(
                table = %self.table.name(),
                "filter not fully handled by sql, counting client-side"
            );
            let items = self.load_matching(&clause, &SearchFilter::new(filter.clone()))?;
            return Ok(items.len() as u64);
        }
        let conn = get_connection(&self.pool)?;
        let sql = self.builder().count(&clause.fragment);
        debug!(table = %self.table.name(), %sql, "sqlite count");
        let count: i64 = conn.query_row(&sql, params_from_iter(clause.fragment.params.iter()), |row| {
            row.get(0)
        })?;
        Ok(count.max(0) as u64)
    }

    fn paged_search(
        &self,
        search: &SearchFilter,
        page_key: Option<&str>,
        limit: Option<usize>,
    ) -> StorageResult<Page> {
        let limit = self.meta.check_limit(limit)?;
        let clause = self.builder().build_where(&search.filter);
        if !clause.handled {
            debug!(
                table = %self.table.name(),
                "filter not fully handled by sql, paging client-side"
            );
            let items = self.load_matching(&clause, search)?;
            return offset_page(&self.meta, search, items, page_key, Some(limit));
        }

        let fingerprint = search.fingerprint();
        let offset = decode_offset(&self.meta, page_key, &fingerprint)?;
        let sql = format!(
            "{} LIMIT ? OFFSET ?",
            self.builder().select(&clause.fragment, search.order.as_ref())
        );
        let mut params = clause.fragment.params;
        params.push(SqlParam::Integer((limit + 1) as i64));
        params.push(SqlParam::Integer(offset as i64));

        let conn = get_connection(&self.pool)?;
        let items = self.query_items(&conn, &sql, &params)?;
        Ok(look_ahead_page(items, offset, limit, fingerprint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Comparator, attr};
    use crate::meta::{Attr, AttrGenerator, KeyConfig};
    use serde_json::json;

    fn item(value: Value) -> Item {
        value.as_object().cloned().unwrap()
    }

    fn books() -> SqlStorage {
        let meta = StorageMeta::builder("books")
            .attr(Attr::string("id"))
            .attr(Attr::string("title"))
            .attr(Attr::int("year").nullable())
            .build()
            .unwrap();
        SqlStorage::in_memory(meta).unwrap()
    }

    #[test]
    fn test_crud_roundtrip() {
        let storage = books();
        storage
            .create(item(json!({"id": "a", "title": "Dune", "year": 1965})))
            .unwrap();
        assert_eq!(
            storage.read("a").unwrap().unwrap(),
            item(json!({"id": "a", "title": "Dune", "year": 1965}))
        );

        storage.update(item(json!({"id": "a", "title": "Emma"}))).unwrap();
        assert_eq!(
            storage.read("a").unwrap().unwrap(),
            item(json!({"id": "a", "title": "Emma"}))
        );

        assert!(storage.destroy("a").unwrap());
        assert!(!storage.destroy("a").unwrap());
        assert!(storage.read("a").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_and_missing() {
        let storage = books();
        storage.create(item(json!({"id": "a"}))).unwrap();
        assert!(matches!(
            storage.create(item(json!({"id": "a"}))),
            Err(StorageError::DuplicateKey { .. })
        ));
        assert!(matches!(
            storage.update(item(json!({"id": "b"}))),
            Err(StorageError::MissingItem { .. })
        ));
    }

    #[test]
    fn test_autoincrement_key() {
        let meta = StorageMeta::builder("events")
            .attr(Attr::int("id").with_create_generator(AttrGenerator::Sequence))
            .attr(Attr::string("name"))
            .build()
            .unwrap();
        let storage = SqlStorage::in_memory(meta).unwrap();
        assert_eq!(storage.create(item(json!({"name": "a"}))).unwrap(), "1");
        assert_eq!(storage.create(item(json!({"name": "b"}))).unwrap(), "2");
        assert_eq!(storage.read("2").unwrap().unwrap()["name"], json!("b"));
        assert!(storage.read("not-a-number").unwrap().is_none());
    }

    #[test]
    fn test_composite_key() {
        let meta = StorageMeta::builder("lines")
            .attr(Attr::string("order_id"))
            .attr(Attr::int("line"))
            .attr(Attr::string("sku"))
            .key_config(KeyConfig::composite(["order_id", "line"]))
            .build()
            .unwrap();
        let storage = SqlStorage::in_memory(meta).unwrap();
        let key = storage
            .create(item(json!({"order_id": "o/1", "line": 2, "sku": "x"})))
            .unwrap();
        assert_eq!(key, "o%2F1/2");
        assert_eq!(storage.read(&key).unwrap().unwrap()["sku"], json!("x"));
    }

    #[test]
    fn test_unhandled_filter_rechecked() {
        let storage = books();
        for (id, title) in [("a", "Dune"), ("b", "Emma"), ("c", "Dune Messiah")] {
            storage
                .create(item(json!({"id": id, "title": title})))
                .unwrap();
        }
        // A string operand on an integer column cannot be bound, so it is
        // filtered client-side.
        let filter = attr("title").startswith("Dune") & attr("year").ne("x");
        assert_eq!(storage.count(&filter).unwrap(), 0);

        let filter = attr("title").startswith("Dune") & !attr("year").eq("x");
        let search = SearchFilter::new(filter).order_by(Comparator::desc("id"));
        let page = storage.paged_search(&search, None, Some(1)).unwrap();
        assert_eq!(page.items[0]["id"], json!("c"));
        let page = storage
            .paged_search(&search, page.next_page_key.as_deref(), Some(1))
            .unwrap();
        assert_eq!(page.items[0]["id"], json!("a"));
        assert!(page.next_page_key.is_none());
    }

    #[test]
    fn test_query_folds_non_ascii_case() {
        let storage = books();
        for (id, title) in [("a", "\u{c9}COLE"), ("b", "Ecole"), ("c", "Dune")] {
            storage
                .create(item(json!({"id": id, "title": title})))
                .unwrap();
        }
        let found = |text: &str| -> Vec<Value> {
            storage
                .search(&SearchFilter::new(Filter::query(text)))
                .unwrap()
                .map(|i| i.unwrap()["id"].clone())
                .collect()
        };
        assert_eq!(found("\u{e9}cole"), vec![json!("a")]);
        assert_eq!(found("COLE"), vec![json!("a"), json!("b")]);
        assert_eq!(storage.count(&Filter::query("\u{e9}cole")).unwrap(), 1);
    }

    #[test]
    fn test_not_matches_missing_values() {
        let storage = books();
        storage.create(item(json!({"id": "a", "year": 1980}))).unwrap();
        storage.create(item(json!({"id": "b"}))).unwrap();
        let ids: Vec<Value> = storage
            .search(&SearchFilter::new(!attr("year").gt(1970)))
            .unwrap()
            .map(|i| i.unwrap()["id"].clone())
            .collect();
        assert_eq!(ids, vec![json!("b")]);
    }
}
