use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::core::{ItemIter, Storage, offset_page};
use crate::error::{StorageError, StorageResult};
use crate::filter::{Filter, SearchFilter};
use crate::meta::StorageMeta;
use crate::types::{Item, Page};

/// Storage backed by an in-process ordered map.
///
/// Each operation takes the map lock once, so single calls are atomic;
/// read-modify-write sequences spanning several calls are not.
#[derive(Debug)]
pub struct MemStorage {
    meta: StorageMeta,
    items: RwLock<BTreeMap<String, Item>>,
    sequence: AtomicI64,
    clock: Arc<dyn Clock>,
}

impl MemStorage {
    /// Creates an empty storage.
    pub fn new(meta: StorageMeta) -> Self {
        Self::with_clock(meta, Arc::new(SystemClock))
    }

    /// Creates an empty storage whose attribute generators use `clock`.
    pub fn with_clock(meta: StorageMeta, clock: Arc<dyn Clock>) -> Self {
        Self {
            meta,
            items: RwLock::new(BTreeMap::new()),
            sequence: AtomicI64::new(0),
            clock,
        }
    }

    /// Number of stored items.
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Removes every item.
    pub fn clear(&self) {
        self.items.write().clear();
    }

    fn assign_sequence(&self, item: &mut Item) {
        let Some(attr) = self.meta.sequence_attr() else {
            return;
        };
        match item.get(&attr.name).and_then(Value::as_i64) {
            Some(supplied) => {
                self.sequence.fetch_max(supplied, Ordering::SeqCst);
            }
            None => {
                let next = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
                item.insert(attr.name.clone(), Value::from(next));
            }
        }
    }

    fn matching(&self, search: &SearchFilter) -> Vec<Item> {
        let attrs = self.meta.attrs();
        let mut items: Vec<Item> = self
            .items
            .read()
            .values()
            .filter(|item| search.filter.matches(item, attrs))
            .cloned()
            .collect();
        search.sort(&mut items);
        items
    }
}

impl Storage for MemStorage {
    fn meta(&self) -> &StorageMeta {
        &self.meta
    }

    fn create(&self, mut item: Item) -> StorageResult<String> {
        self.meta.apply_create_generators(&mut item, self.clock.as_ref());
        self.assign_sequence(&mut item);
        let key = self.meta.key_of(&item)?;

        let mut items = self.items.write();
        if items.contains_key(&key) {
            return Err(StorageError::duplicate(self.meta.name(), key));
        }
        items.insert(key.clone(), item);
        Ok(key)
    }

    fn read(&self, key: &str) -> StorageResult<Option<Item>> {
        Ok(self.items.read().get(key).cloned())
    }

    fn update(&self, mut item: Item) -> StorageResult<Item> {
        self.meta.apply_update_generators(&mut item, self.clock.as_ref());
        let key = self.meta.key_of(&item)?;

        let mut items = self.items.write();
        match items.get_mut(&key) {
            Some(existing) => {
                *existing = item.clone();
                Ok(item)
            }
            None => Err(StorageError::missing(self.meta.name(), key)),
        }
    }

    fn destroy(&self, key: &str) -> StorageResult<bool> {
        Ok(self.items.write().remove(key).is_some())
    }

    fn search(&self, search: &SearchFilter) -> StorageResult<ItemIter<'_>> {
        let items = self.matching(search);
        debug!(storage = %self.meta.name(), matched = items.len(), "memory search");
        Ok(Box::new(items.into_iter().map(Ok)))
    }

    fn count(&self, filter: &Filter) -> StorageResult<u64> {
        let attrs = self.meta.attrs();
        let count = self
            .items
            .read()
            .values()
            .filter(|item| filter.matches(item, attrs))
            .count();
        Ok(count as u64)
    }

    fn paged_search(
        &self,
        search: &SearchFilter,
        page_key: Option<&str>,
        limit: Option<usize>,
    ) -> StorageResult<Page> {
        self.meta.check_limit(limit)?;
        offset_page(&self.meta, search, self.matching(search), page_key, limit)
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

    fn books() -> MemStorage {
        let meta = StorageMeta::builder("books")
            .attr(Attr::string("id"))
            .attr(Attr::string("title"))
            .attr(Attr::int("year").nullable())
            .build()
            .unwrap();
        MemStorage::new(meta)
    }

    #[test]
    fn test_create_read_update_destroy() {
        let storage = books();
        let key = storage
            .create(item(json!({"id": "a", "title": "Dune", "year": 1965})))
            .unwrap();
        assert_eq!(key, "a");
        assert_eq!(storage.read("a").unwrap().unwrap()["year"], json!(1965));

        storage
            .update(item(json!({"id": "a", "title": "Dune Messiah"})))
            .unwrap();
        let updated = storage.read("a").unwrap().unwrap();
        assert_eq!(updated["title"], json!("Dune Messiah"));
        assert!(!updated.contains_key("year"));

        assert!(storage.destroy("a").unwrap());
        assert!(!storage.destroy("a").unwrap());
        assert!(storage.is_empty());
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
            storage.update(item(json!({"id": "z"}))),
            Err(StorageError::MissingItem { .. })
        ));
    }

    #[test]
    fn test_uuid_key_generated() {
        let meta = StorageMeta::builder("notes")
            .attr(Attr::string("id"))
            .attr(Attr::string("text"))
            .key_config(KeyConfig::uuid("id"))
            .build()
            .unwrap();
        let storage = MemStorage::new(meta);
        let key = storage.create(item(json!({"text": "hi"}))).unwrap();
        assert_eq!(key.len(), 36);
        assert_eq!(storage.read(&key).unwrap().unwrap()["id"], json!(key));
    }

    #[test]
    fn test_sequence_key() {
        let meta = StorageMeta::builder("events")
            .attr(Attr::int("id").with_create_generator(AttrGenerator::Sequence))
            .attr(Attr::string("name"))
            .build()
            .unwrap();
        let storage = MemStorage::new(meta);
        assert_eq!(storage.create(item(json!({"name": "a"}))).unwrap(), "1");
        assert_eq!(storage.create(item(json!({"id": 10, "name": "b"}))).unwrap(), "10");
        assert_eq!(storage.create(item(json!({"name": "c"}))).unwrap(), "11");
    }

    #[test]
    fn test_search_sorted_with_missing_last() {
        let storage = books();
        for value in [
            json!({"id": "a", "year": 1980}),
            json!({"id": "b"}),
            json!({"id": "c", "year": 1960}),
        ] {
            storage.create(item(value)).unwrap();
        }
        let search = SearchFilter::all().order_by(Comparator::asc("year"));
        let ids: Vec<String> = storage
            .search(&search)
            .unwrap()
            .map(|i| i.unwrap()["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(storage.count(&attr("year").exists()).unwrap(), 2);
    }
}
