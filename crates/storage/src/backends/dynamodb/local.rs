//! In-process DynamoDB emulator.
//!
//! [`LocalDynamoClient`] keeps tables in memory and evaluates key conditions
//! and filters with DynamoDB's semantics: sparse global secondary indexes,
//! per-page evaluation limits applied before filtering, and
//! `LastEvaluatedKey` resumption. It backs the parity tests and local
//! development without network access.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use super::client::{
    BatchGetOutput, DynamoApi, DynamoClientError, DynamoClientResult, DynamoItem, PutRequest,
    ReadOutput, ReadRequest, TableDefinition, WriteCondition,
};
use super::conversions::{from_dynamo, is_scalar_of};
use super::cursor::start_key_of;
use super::index::DynamoIndex;
use crate::filter::value::total_cmp;

const MAX_BATCH_GET: usize = 100;

#[derive(Debug)]
struct LocalTable {
    definition: TableDefinition,
    items: BTreeMap<String, DynamoItem>,
}

impl LocalTable {
    fn index(&self, name: Option<&str>) -> DynamoClientResult<&DynamoIndex> {
        match name {
            None => Ok(&self.definition.primary),
            Some(name) => self
                .definition
                .global_secondary_indexes
                .iter()
                .find(|i| i.name.as_deref() == Some(name))
                .ok_or_else(|| DynamoClientError::ResourceNotFound(format!("index {name}"))),
        }
    }

    fn storage_key(&self, item: &DynamoItem) -> DynamoClientResult<String> {
        let values = self
            .definition
            .primary
            .key_attrs()
            .into_iter()
            .map(|name| {
                item.get(name)
                    .filter(|v| v.is_key_scalar())
                    .map(from_dynamo)
                    .ok_or_else(|| {
                        DynamoClientError::Validation(format!("missing key attribute {name}"))
                    })
            })
            .collect::<DynamoClientResult<Vec<Value>>>()?;
        Ok(Value::Array(values).to_string())
    }

    fn check_key_types(&self, item: &DynamoItem) -> DynamoClientResult<()> {
        for (name, scalar) in &self.definition.attribute_definitions {
            if let Some(value) = item.get(name) {
                if !is_scalar_of(&from_dynamo(value), *scalar) {
                    return Err(DynamoClientError::Validation(format!(
                        "type mismatch for key attribute {name}: expected {scalar:?}, got {}",
                        value.type_name()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Position of an item in the read order of one index.
struct ReadPosition {
    index_values: Vec<Value>,
    storage_key: String,
}

impl ReadPosition {
    fn of(table: &LocalTable, index: &DynamoIndex, item: &DynamoItem) -> DynamoClientResult<Self> {
        Ok(Self {
            index_values: index
                .key_attrs()
                .into_iter()
                .map(|name| item.get(name).map(from_dynamo).unwrap_or(Value::Null))
                .collect(),
            storage_key: table.storage_key(item)?,
        })
    }

    fn cmp(&self, other: &Self) -> Ordering {
        self.index_values
            .iter()
            .zip(&other.index_values)
            .map(|(a, b)| total_cmp(a, b))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.storage_key.cmp(&other.storage_key))
    }
}

/// A [`DynamoApi`] implementation backed by in-memory tables.
#[derive(Debug, Default)]
pub struct LocalDynamoClient {
    tables: RwLock<HashMap<String, LocalTable>>,
    page_size: Option<usize>,
}

impl LocalDynamoClient {
    /// Creates an emulator with no tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the number of items evaluated per query or scan page, forcing
    /// callers through `LastEvaluatedKey` pagination.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size.max(1));
        self
    }

    /// Number of items stored in a table.
    pub fn item_count(&self, table_name: &str) -> usize {
        self.tables
            .read()
            .get(table_name)
            .map_or(0, |t| t.items.len())
    }

    fn with_table<T>(
        &self,
        table_name: &str,
        f: impl FnOnce(&LocalTable) -> DynamoClientResult<T>,
    ) -> DynamoClientResult<T> {
        let tables = self.tables.read();
        let table = tables
            .get(table_name)
            .ok_or_else(|| DynamoClientError::ResourceNotFound(table_name.to_string()))?;
        f(table)
    }

    fn with_table_mut<T>(
        &self,
        table_name: &str,
        f: impl FnOnce(&mut LocalTable) -> DynamoClientResult<T>,
    ) -> DynamoClientResult<T> {
        let mut tables = self.tables.write();
        let table = tables
            .get_mut(table_name)
            .ok_or_else(|| DynamoClientError::ResourceNotFound(table_name.to_string()))?;
        f(table)
    }
}

impl DynamoApi for LocalDynamoClient {
    fn create_table(&self, definition: &TableDefinition) -> DynamoClientResult<bool> {
        let mut tables = self.tables.write();
        if tables.contains_key(&definition.table_name) {
            return Ok(false);
        }
        debug!(table = %definition.table_name, "creating local table");
        tables.insert(
            definition.table_name.clone(),
            LocalTable {
                definition: definition.clone(),
                items: BTreeMap::new(),
            },
        );
        Ok(true)
    }

    fn get_item(&self, table_name: &str, key: &DynamoItem) -> DynamoClientResult<Option<DynamoItem>> {
        self.with_table(table_name, |table| {
            let storage_key = table.storage_key(key)?;
            Ok(table.items.get(&storage_key).cloned())
        })
    }

    fn put_item(&self, request: PutRequest) -> DynamoClientResult<()> {
        self.with_table_mut(&request.table_name, |table| {
            table.check_key_types(&request.item)?;
            let storage_key = table.storage_key(&request.item)?;
            let existing = table.items.get(&storage_key);
            let allowed = match &request.condition {
                None => true,
                Some(WriteCondition::NotExists(attr)) => {
                    existing.is_none_or(|e| !e.contains_key(attr))
                }
                Some(WriteCondition::Exists(attr)) => existing.is_some_and(|e| e.contains_key(attr)),
            };
            if !allowed {
                return Err(DynamoClientError::ConditionalCheckFailed);
            }
            table.items.insert(storage_key, request.item);
            Ok(())
        })
    }

    fn delete_item(&self, table_name: &str, key: &DynamoItem) -> DynamoClientResult<Option<DynamoItem>> {
        self.with_table_mut(table_name, |table| {
            let storage_key = table.storage_key(key)?;
            Ok(table.items.remove(&storage_key))
        })
    }

    fn batch_get_item(&self, table_name: &str, keys: &[DynamoItem]) -> DynamoClientResult<BatchGetOutput> {
        if keys.len() > MAX_BATCH_GET {
            return Err(DynamoClientError::Validation(format!(
                "too many keys in batch get: {} (maximum is {MAX_BATCH_GET})",
                keys.len()
            )));
        }
        self.with_table(table_name, |table| {
            let mut items = Vec::with_capacity(keys.len());
            for key in keys {
                let storage_key = table.storage_key(key)?;
                items.extend(table.items.get(&storage_key).cloned());
            }
            Ok(BatchGetOutput {
                items,
                unprocessed_keys: Vec::new(),
            })
        })
    }

    fn read(&self, request: &ReadRequest) -> DynamoClientResult<ReadOutput> {
        self.with_table(&request.table_name, |table| {
            let index = table.index(request.index_name.as_deref())?;
            let mut candidates = Vec::new();
            for item in table.items.values() {
                let indexed = index.key_attrs().iter().all(|name| item.contains_key(*name));
                let in_key_range = request
                    .key_condition
                    .as_ref()
                    .is_none_or(|k| k.evaluate(item));
                if indexed && in_key_range {
                    candidates.push((ReadPosition::of(table, index, item)?, item));
                }
            }

            let forward = request.scan_forward || request.key_condition.is_none();
            candidates.sort_by(|(a, _), (b, _)| {
                let ordering = a.cmp(b);
                if forward { ordering } else { ordering.reverse() }
            });

            if let Some(start) = &request.exclusive_start_key {
                let start = ReadPosition::of(table, index, start)?;
                candidates.retain(|(position, _)| {
                    let ordering = position.cmp(&start);
                    if forward { ordering.is_gt() } else { ordering.is_lt() }
                });
            }

            let limit = request.limit.or(self.page_size).unwrap_or(usize::MAX);
            let evaluated: Vec<&DynamoItem> = candidates
                .iter()
                .take(limit)
                .map(|(_, item)| *item)
                .collect();
            let last_evaluated_key = match evaluated.last() {
                Some(last) if candidates.len() > evaluated.len() => {
                    let table_index = &table.definition.primary;
                    let gsi = (!index.is_primary()).then_some(index);
                    Some(start_key_of(last, table_index, gsi))
                }
                _ => None,
            };

            let matching: Vec<DynamoItem> = evaluated
                .into_iter()
                .filter(|item| request.filter.as_ref().is_none_or(|f| f.evaluate(item)))
                .cloned()
                .collect();
            let count = matching.len();
            Ok(ReadOutput {
                items: if request.select_count { Vec::new() } else { matching },
                count,
                last_evaluated_key,
            })
        })
    }
}
