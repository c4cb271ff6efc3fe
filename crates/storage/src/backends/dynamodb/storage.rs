use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::client::{
    DynamoApi, DynamoClientError, DynamoItem, PutRequest, ReadRequest, TableDefinition,
    WriteCondition,
};
use super::conversions::{item_from_dynamo, item_to_dynamo, scalar_type};
use super::cursor::{decode_start_key, encode_start_key, start_key_of};
use super::expression::{RenderedExpressions, SplitFilter, split_filter};
use super::index::{DynamoIndex, select_index};
use super::local::LocalDynamoClient;
use crate::clock::{Clock, SystemClock};
use crate::core::{Storage, offset_page, require_all};
use crate::error::{BackendError, StorageError, StorageResult, ValidationError};
use crate::filter::{Filter, SearchFilter};
use crate::meta::StorageMeta;
use crate::types::{Item, Page};

const MAX_BATCH_GET: usize = 100;
const MAX_UNPROCESSED_ROUNDS: usize = 8;

/// Configuration for the DynamoDB backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamoStorageConfig {
    /// Table name; defaults to the storage name.
    #[serde(default)]
    pub table_name: Option<String>,

    /// AWS region override.
    #[serde(default)]
    pub region: Option<String>,

    /// Endpoint override, e.g. a local DynamoDB.
    #[serde(default)]
    pub endpoint_url: Option<String>,

    /// Keys per `BatchGetItem` call (at most 100).
    #[serde(default = "default_batch_read_size")]
    pub batch_read_size: usize,

    /// Maximum query or scan pages read to fill one result page.
    #[serde(default = "default_max_internal_pages")]
    pub max_internal_pages: usize,

    /// Global secondary indexes of the table.
    #[serde(default)]
    pub indexes: Vec<DynamoIndex>,

    /// Create the table on startup if it does not exist.
    #[serde(default)]
    pub create_table: bool,
}

fn default_batch_read_size() -> usize {
    MAX_BATCH_GET
}

fn default_max_internal_pages() -> usize {
    10
}

impl Default for DynamoStorageConfig {
    fn default() -> Self {
        Self {
            table_name: None,
            region: None,
            endpoint_url: None,
            batch_read_size: default_batch_read_size(),
            max_internal_pages: default_max_internal_pages(),
            indexes: Vec::new(),
            create_table: false,
        }
    }
}

/// How one search is read from the table.
struct ReadPlan<'a> {
    index: Option<&'a DynamoIndex>,
    split: SplitFilter,
}

/// Storage backed by a DynamoDB table.
///
/// Searches query the best-scoring index (see [`select_index`]) or scan the
/// table, pushing down what the expression language can express and
/// re-checking the rest client-side.
pub struct DynamoStorage {
    meta: StorageMeta,
    client: Arc<dyn DynamoApi>,
    config: DynamoStorageConfig,
    table_name: String,
    primary: DynamoIndex,
    /// Primary index first, then the global secondary indexes.
    indexes: Vec<DynamoIndex>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for DynamoStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamoStorage")
            .field("storage", &self.meta.name())
            .field("table_name", &self.table_name)
            .field("indexes", &self.indexes)
            .finish()
    }
}

impl DynamoStorage {
    /// Creates a storage over `client`.
    ///
    /// # Errors
    ///
    /// * `ValidationError::InvalidMeta` - If the key has more than two
    ///   attributes, an index key attribute is undeclared or not a string or
    ///   number, or an attribute uses a sequence generator
    pub fn new(
        meta: StorageMeta,
        client: Arc<dyn DynamoApi>,
        config: DynamoStorageConfig,
    ) -> StorageResult<Self> {
        let invalid = |message: String| {
            StorageError::from(ValidationError::InvalidMeta {
                storage: meta.name().to_string(),
                message,
            })
        };

        if let Some(attr) = meta.sequence_attr() {
            return Err(invalid(format!(
                "sequence attribute '{}' is not supported by DynamoDB",
                attr.name
            )));
        }

        let primary = DynamoIndex::from_meta(&meta)?;
        let mut indexes = vec![primary.clone()];
        indexes.extend(config.indexes.iter().cloned());
        for index in &indexes {
            for name in index.key_attrs() {
                let usable = meta
                    .attr(name)
                    .is_some_and(|a| scalar_type(a.attr_type()).is_some());
                if !usable {
                    return Err(invalid(format!(
                        "index key attribute '{name}' must be a declared string or number"
                    )));
                }
            }
        }

        let table_name = config
            .table_name
            .clone()
            .unwrap_or_else(|| meta.name().to_string());
        let storage = Self {
            meta,
            client,
            config,
            table_name,
            primary,
            indexes,
            clock: Arc::new(SystemClock),
        };
        if storage.config.create_table {
            storage.create_table()?;
        }
        Ok(storage)
    }

    /// Creates a storage over a fresh [`LocalDynamoClient`].
    pub fn local(meta: StorageMeta, indexes: Vec<DynamoIndex>) -> StorageResult<Self> {
        let config = DynamoStorageConfig {
            indexes,
            create_table: true,
            ..DynamoStorageConfig::default()
        };
        Self::new(meta, Arc::new(LocalDynamoClient::new()), config)
    }

    /// Replaces the clock used by attribute generators.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the table name.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Returns the primary index followed by the global secondary indexes.
    pub fn indexes(&self) -> &[DynamoIndex] {
        &self.indexes
    }

    /// Returns the table definition derived from the meta and indexes.
    pub fn table_definition(&self) -> TableDefinition {
        let attribute_definitions: BTreeMap<_, _> = self
            .indexes
            .iter()
            .flat_map(DynamoIndex::key_attrs)
            .filter_map(|name| {
                let scalar = self.meta.attr(name).and_then(|a| scalar_type(a.attr_type()))?;
                Some((name.to_string(), scalar))
            })
            .collect();
        TableDefinition {
            table_name: self.table_name.clone(),
            primary: self.primary.clone(),
            global_secondary_indexes: self.indexes[1..].to_vec(),
            attribute_definitions,
        }
    }

    /// Creates the table if it does not exist.
    pub fn create_table(&self) -> StorageResult<()> {
        if self.client.create_table(&self.table_definition())? {
            info!(storage = %self.meta.name(), table = %self.table_name, "created dynamodb table");
        }
        Ok(())
    }

    fn key_item(&self, key: &str) -> Option<DynamoItem> {
        self.meta
            .key_config()
            .key_values(key, self.meta.attrs())
            .map(|values| item_to_dynamo(&values))
    }

    fn stored(&self, item: &Item) -> DynamoItem {
        let declared: Item = item
            .iter()
            .filter(|(name, _)| self.meta.attr(name).is_some())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        item_to_dynamo(&declared)
    }

    fn put(&self, item: &Item, condition: WriteCondition) -> Result<(), DynamoClientError> {
        self.client.put_item(PutRequest {
            table_name: self.table_name.clone(),
            item: self.stored(item),
            condition: Some(condition),
        })
    }

    fn plan(&self, filter: &Filter) -> ReadPlan<'_> {
        let attrs = self.meta.attrs();
        let choice = select_index(&self.indexes, filter, attrs);
        let index = choice.map(|c| c.index);
        let split = split_filter(filter, index, attrs);

        let rendered = RenderedExpressions::render(split.key_condition.as_ref(), split.filter.as_ref());
        debug!(
            storage = %self.meta.name(),
            index = index.map_or("<scan>", |i| i.name.as_deref().unwrap_or("<primary>")),
            score = choice.map_or(0, |c| c.score),
            key_condition = ?rendered.key_condition,
            filter = ?rendered.condition,
            handled = split.handled,
            "planned dynamodb read"
        );
        ReadPlan { index, split }
    }

    fn request(
        &self,
        plan: &ReadPlan<'_>,
        start: Option<DynamoItem>,
        scan_forward: bool,
        limit: Option<usize>,
        select_count: bool,
    ) -> ReadRequest {
        ReadRequest {
            table_name: self.table_name.clone(),
            index_name: plan.index.and_then(|i| i.name.clone()),
            key_condition: plan.split.key_condition.clone(),
            filter: plan.split.filter.clone(),
            exclusive_start_key: start,
            limit,
            scan_forward,
            select_count,
        }
    }

    fn gsi<'a>(&self, plan: &ReadPlan<'a>) -> Option<&'a DynamoIndex> {
        plan.index.filter(|i| !i.is_primary())
    }

    /// Returns the read direction if the comparator can be served by the
    /// chosen index, `None` if a client-side sort is needed.
    fn native_order(&self, plan: &ReadPlan<'_>, search: &SearchFilter) -> Option<bool> {
        let Some(order) = &search.order else {
            return Some(true);
        };
        let sort_key = plan.index?.sort_key.as_deref()?;
        match order.terms().as_slice() {
            [(name, desc)] if *name == sort_key => Some(!desc),
            _ => None,
        }
    }

    fn keep(&self, plan: &ReadPlan<'_>, filter: &Filter, item: &Item) -> bool {
        plan.split.handled || filter.matches(item, self.meta.attrs())
    }

    /// Reads every matching item, in index order.
    fn read_matching(&self, plan: &ReadPlan<'_>, filter: &Filter) -> StorageResult<Vec<Item>> {
        let mut items = Vec::new();
        let mut start = None;
        loop {
            let output = self.client.read(&self.request(plan, start, true, None, false))?;
            items.extend(
                output
                    .items
                    .iter()
                    .map(item_from_dynamo)
                    .filter(|item| self.keep(plan, filter, item)),
            );
            match output.last_evaluated_key {
                Some(key) => start = Some(key),
                None => return Ok(items),
            }
        }
    }

    fn native_page(
        &self,
        plan: &ReadPlan<'_>,
        search: &SearchFilter,
        forward: bool,
        page_key: Option<&str>,
        limit: usize,
    ) -> StorageResult<Page> {
        let fingerprint = search.fingerprint();
        let gsi = self.gsi(plan);
        let mut start = match page_key {
            Some(page_key) => Some(decode_start_key(
                &self.meta,
                &self.primary,
                gsi,
                page_key,
                &fingerprint,
            )?),
            None => None,
        };

        let mut found: Vec<DynamoItem> = Vec::new();
        let mut pages = 0;
        loop {
            let request = self.request(plan, start.take(), forward, Some(limit + 1), false);
            let output = self.client.read(&request)?;
            pages += 1;
            for item in output.items {
                if self.keep(plan, &search.filter, &item_from_dynamo(&item)) {
                    found.push(item);
                }
            }
            start = output.last_evaluated_key;
            if found.len() > limit || start.is_none() || pages >= self.config.max_internal_pages {
                break;
            }
        }

        let resume = if found.len() > limit {
            found.truncate(limit);
            found
                .last()
                .map(|last| start_key_of(last, &self.primary, gsi))
        } else {
            start
        };
        let items = found.iter().map(item_from_dynamo).collect();
        Ok(Page::new(
            items,
            resume.map(|key| encode_start_key(&key, fingerprint)),
        ))
    }
}

impl Storage for DynamoStorage {
    fn meta(&self) -> &StorageMeta {
        &self.meta
    }

    fn create(&self, mut item: Item) -> StorageResult<String> {
        self.meta
            .apply_create_generators(&mut item, self.clock.as_ref());
        let key = self.meta.key_of(&item)?;
        let condition = WriteCondition::NotExists(self.primary.partition_key.clone());
        match self.put(&item, condition) {
            Ok(()) => {
                debug!(storage = %self.meta.name(), key = %key, "created item");
                Ok(key)
            }
            Err(DynamoClientError::ConditionalCheckFailed) => {
                Err(StorageError::duplicate(self.meta.name(), key))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn read(&self, key: &str) -> StorageResult<Option<Item>> {
        let Some(key_item) = self.key_item(key) else {
            return Ok(None);
        };
        let item = self.client.get_item(&self.table_name, &key_item)?;
        Ok(item.as_ref().map(item_from_dynamo))
    }

    fn read_all(&self, keys: &[String], error_on_missing: bool) -> StorageResult<Vec<Option<Item>>> {
        let mut requested: BTreeMap<String, DynamoItem> = BTreeMap::new();
        let mut canonical: Vec<Option<String>> = Vec::with_capacity(keys.len());
        for key in keys {
            let parsed = self
                .meta
                .key_config()
                .key_values(key, self.meta.attrs());
            let entry = parsed.and_then(|values| {
                let canonical_key = self.meta.key_of(&values).ok()?;
                requested
                    .entry(canonical_key.clone())
                    .or_insert_with(|| item_to_dynamo(&values));
                Some(canonical_key)
            });
            canonical.push(entry);
        }

        let chunk_size = self.config.batch_read_size.clamp(1, MAX_BATCH_GET);
        let pending: Vec<DynamoItem> = requested.into_values().collect();
        let mut found: HashMap<String, Item> = HashMap::new();
        for chunk in pending.chunks(chunk_size) {
            let mut round: Vec<DynamoItem> = chunk.to_vec();
            let mut rounds = 0;
            while !round.is_empty() {
                if rounds == MAX_UNPROCESSED_ROUNDS {
                    return Err(StorageError::Backend(BackendError::query(
                        "dynamodb",
                        format!("{} keys left unprocessed by batch get", round.len()),
                    )));
                }
                let output = self.client.batch_get_item(&self.table_name, &round)?;
                for item in &output.items {
                    let item = item_from_dynamo(item);
                    found.insert(self.meta.key_of(&item)?, item);
                }
                round = output.unprocessed_keys;
                rounds += 1;
            }
        }

        let items = canonical
            .into_iter()
            .map(|key| key.and_then(|k| found.get(&k).cloned()))
            .collect();
        require_all(&self.meta, keys, items, error_on_missing)
    }

    fn update(&self, mut item: Item) -> StorageResult<Item> {
        self.meta
            .apply_update_generators(&mut item, self.clock.as_ref());
        let key = self.meta.key_of(&item)?;
        let condition = WriteCondition::Exists(self.primary.partition_key.clone());
        match self.put(&item, condition) {
            Ok(()) => Ok(item),
            Err(DynamoClientError::ConditionalCheckFailed) => {
                Err(StorageError::missing(self.meta.name(), key))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn destroy(&self, key: &str) -> StorageResult<bool> {
        let Some(key_item) = self.key_item(key) else {
            return Ok(false);
        };
        let old = self.client.delete_item(&self.table_name, &key_item)?;
        Ok(old.is_some())
    }

    fn count(&self, filter: &Filter) -> StorageResult<u64> {
        if *filter == Filter::ExcludeAll {
            return Ok(0);
        }
        let plan = self.plan(filter);
        if !plan.split.handled {
            warn!(
                storage = %self.meta.name(),
                "filter not fully handled by dynamodb expressions, counting client-side"
            );
            return Ok(self.read_matching(&plan, filter)?.len() as u64);
        }

        let mut count = 0u64;
        let mut start = None;
        loop {
            let output = self.client.read(&self.request(&plan, start, true, None, true))?;
            count += output.count as u64;
            match output.last_evaluated_key {
                Some(key) => start = Some(key),
                None => return Ok(count),
            }
        }
    }

    fn paged_search(
        &self,
        search: &SearchFilter,
        page_key: Option<&str>,
        limit: Option<usize>,
    ) -> StorageResult<Page> {
        let limit = self.meta.check_limit(limit)?;
        if search.filter == Filter::ExcludeAll {
            return Ok(Page::empty());
        }

        let plan = self.plan(&search.filter);
        match self.native_order(&plan, search) {
            Some(forward) => self.native_page(&plan, search, forward, page_key, limit),
            None => {
                warn!(
                    storage = %self.meta.name(),
                    "ordering not served by the selected index, sorting client-side"
                );
                let mut items = self.read_matching(&plan, &search.filter)?;
                search.sort(&mut items);
                offset_page(&self.meta, search, items, page_key, Some(limit))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Comparator, attr};
    use crate::meta::{Attr, AttrGenerator, KeyConfig};
    use crate::types::Edit;
    use serde_json::{Value, json};

    fn item(value: Value) -> Item {
        value.as_object().cloned().unwrap()
    }

    fn orders(page_size: usize) -> DynamoStorage {
        let meta = StorageMeta::builder("orders")
            .attr(Attr::string("customer_id"))
            .attr(Attr::int("order_id"))
            .attr(Attr::string("status").nullable())
            .attr(Attr::int("total").nullable())
            .key_config(KeyConfig::composite(["customer_id", "order_id"]))
            .batch_size(10)
            .build()
            .unwrap();
        let config = DynamoStorageConfig {
            indexes: vec![DynamoIndex::global("by_status", "status", Some("total"))],
            create_table: true,
            ..DynamoStorageConfig::default()
        };
        let client = Arc::new(LocalDynamoClient::new().with_page_size(page_size));
        let storage = DynamoStorage::new(meta, client, config).unwrap();
        for (customer, order, status, total) in [
            ("c1", 1, "open", 30),
            ("c1", 2, "shipped", 10),
            ("c1", 3, "open", 20),
            ("c2", 1, "open", 40),
            ("c2", 2, "shipped", 50),
        ] {
            storage
                .create(item(json!({
                    "customer_id": customer,
                    "order_id": order,
                    "status": status,
                    "total": total,
                })))
                .unwrap();
        }
        storage
    }

    fn keys(page: &Page) -> Vec<String> {
        page.items
            .iter()
            .map(|i| format!("{}/{}", i["customer_id"].as_str().unwrap(), i["order_id"]))
            .collect()
    }

    #[test]
    fn test_crud() {
        let storage = orders(100);
        let found = storage.read("c1/2").unwrap().unwrap();
        assert_eq!(found["status"], json!("shipped"));
        assert!(storage.read("c9/1").unwrap().is_none());
        assert!(storage.read("c1/not-a-number").unwrap().is_none());

        let err = storage
            .create(item(json!({"customer_id": "c1", "order_id": 2})))
            .unwrap_err();
        assert!(matches!(err, StorageError::DuplicateKey { .. }));

        storage
            .update(item(json!({"customer_id": "c1", "order_id": 2, "status": "lost"})))
            .unwrap();
        assert_eq!(storage.read("c1/2").unwrap().unwrap()["status"], json!("lost"));
        let err = storage
            .update(item(json!({"customer_id": "c9", "order_id": 1})))
            .unwrap_err();
        assert!(err.is_missing());

        assert!(storage.destroy("c1/2").unwrap());
        assert!(!storage.destroy("c1/2").unwrap());
    }

    #[test]
    fn test_read_all_restores_order_and_dedupes() {
        let storage = orders(100);
        let keys: Vec<String> = ["c2/1", "c1/9", "c1/1", "c2/1"]
            .iter()
            .map(|k| k.to_string())
            .collect();
        let items = storage.read_all(&keys, false).unwrap();
        assert_eq!(items[0].as_ref().unwrap()["total"], json!(40));
        assert!(items[1].is_none());
        assert_eq!(items[2].as_ref().unwrap()["total"], json!(30));
        assert_eq!(items[3], items[0]);

        assert!(storage.read_all(&keys, true).unwrap_err().is_missing());
    }

    #[test]
    fn test_query_on_gsi_serves_sort_natively() {
        let storage = orders(2);
        let search = SearchFilter::new(attr("status").eq("open") & attr("total").gte(20))
            .order_by(Comparator::desc("total"));

        let first = storage.paged_search(&search, None, Some(2)).unwrap();
        assert_eq!(keys(&first), vec!["c2/1", "c1/1"]);
        let second = storage
            .paged_search(&search, first.next_page_key.as_deref(), Some(2))
            .unwrap();
        assert_eq!(keys(&second), vec!["c1/3"]);
        assert!(second.next_page_key.is_none());
    }

    #[test]
    fn test_client_side_sort_uses_offset_pages() {
        let storage = orders(2);
        let search = SearchFilter::new(attr("total").gt(15)).order_by(Comparator::asc("status"));
        let mut seen = Vec::new();
        let mut page_key = None;
        loop {
            let page = storage.paged_search(&search, page_key.as_deref(), Some(3)).unwrap();
            seen.extend(keys(&page));
            page_key = page.next_page_key;
            if page_key.is_none() {
                break;
            }
        }
        assert_eq!(seen, vec!["c1/1", "c1/3", "c2/1", "c2/2"]);
    }

    #[test]
    fn test_count_pushed_down_and_fallback() {
        let storage = orders(2);
        assert_eq!(storage.count(&Filter::IncludeAll).unwrap(), 5);
        assert_eq!(storage.count(&attr("customer_id").eq("c1")).unwrap(), 3);
        assert_eq!(storage.count(&attr("status").endswith("pped")).unwrap(), 2);
        assert_eq!(storage.count(&Filter::ExcludeAll).unwrap(), 0);
    }

    #[test]
    fn test_page_key_from_other_search_is_rejected() {
        let storage = orders(100);
        let search = SearchFilter::new(attr("customer_id").eq("c1"));
        let page = storage.paged_search(&search, None, Some(1)).unwrap();
        let other = SearchFilter::new(attr("customer_id").eq("c2"));
        let err = storage
            .paged_search(&other, page.next_page_key.as_deref(), Some(1))
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidPageKey { .. }));
    }

    #[test]
    fn test_invalid_metas_are_rejected() {
        let meta = StorageMeta::builder("events")
            .attr(Attr::int("seq").with_create_generator(AttrGenerator::Sequence))
            .build()
            .unwrap();
        let err = DynamoStorage::local(meta, Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            StorageError::Validation(ValidationError::InvalidMeta { .. })
        ));

        let meta = StorageMeta::builder("events")
            .attr(Attr::string("id"))
            .build()
            .unwrap();
        let gsi = DynamoIndex::global("by_payload", "payload", None);
        assert!(DynamoStorage::local(meta, vec![gsi]).is_err());
    }

    #[test]
    fn test_edit_all_uses_default_semantics() {
        let storage = orders(100);
        let results = storage
            .edit_all(vec![
                Edit::Destroy("c1/1".to_string()),
                Edit::Create(item(json!({"customer_id": "c3", "order_id": 1}))),
            ])
            .unwrap();
        assert!(results.iter().all(|r| r.is_applied()));
        assert_eq!(storage.count(&Filter::IncludeAll).unwrap(), 5);
    }
}
