use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use ticksink_core::config::TablesConfig;
use ticksink_core::Item;

use super::{BatchWriteOutcome, KeyValueStore, KvError, MAX_BATCH_ITEMS};

/// A call observed by [`MemoryKvStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvCall {
    Get { table: String },
    Put { table: String },
    BatchWrite { table: String, size: usize },
}

impl KvCall {
    pub fn is_write(&self) -> bool {
        !matches!(self, KvCall::Get { .. })
    }
}

struct Table {
    key_attributes: Vec<String>,
    rows: BTreeMap<String, Item>,
}

impl Table {
    fn row_key(&self, table: &str, item: &Item) -> Result<String, KvError> {
        let mut parts = Vec::with_capacity(self.key_attributes.len());
        for attribute in &self.key_attributes {
            let value = item.get(attribute).ok_or_else(|| KvError::MissingKey {
                table: table.to_string(),
                attribute: attribute.clone(),
            })?;
            parts.push(value);
        }
        serde_json::to_string(&parts).map_err(|e| KvError::Conversion(e.to_string()))
    }
}

/// In-process key-value store with DynamoDB-like semantics.
///
/// Every operation yields to the scheduler before touching state, so two
/// pipelines driven concurrently on one runtime interleave at each store call
/// the way two workers would against a remote table. All calls are recorded.
#[derive(Default)]
pub struct MemoryKvStore {
    tables: Mutex<HashMap<String, Table>>,
    calls: Mutex<Vec<KvCall>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table and its key schema.
    pub fn with_table(self, name: &str, key_attributes: &[&str]) -> Self {
        self.lock_tables().insert(
            name.to_string(),
            Table {
                key_attributes: key_attributes.iter().map(|a| a.to_string()).collect(),
                rows: BTreeMap::new(),
            },
        );
        self
    }

    /// The three ingestion tables with their production key schemas.
    pub fn for_tables(tables: &TablesConfig) -> Self {
        Self::new()
            .with_table(&tables.files, &["file_name"])
            .with_table(&tables.ticks, &["symbol", "timestamp"])
            .with_table(&tables.fundamentals, &["symbol", "as_of"])
    }

    /// All rows of a table, in key order.
    pub fn rows(&self, table: &str) -> Vec<Item> {
        self.lock_tables()
            .get(table)
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.lock_tables().get(table).map_or(0, |t| t.rows.len())
    }

    pub fn calls(&self) -> Vec<KvCall> {
        self.lock_calls().clone()
    }

    pub fn clear_calls(&self) {
        self.lock_calls().clear();
    }

    /// Number of put and bulk-write calls observed.
    pub fn write_calls(&self) -> usize {
        self.lock_calls().iter().filter(|c| c.is_write()).count()
    }

    /// Sizes of the bulk writes issued against `table`, in order.
    pub fn batch_sizes(&self, table: &str) -> Vec<usize> {
        self.lock_calls()
            .iter()
            .filter_map(|c| match c {
                KvCall::BatchWrite { table: t, size } if t == table => Some(*size),
                _ => None,
            })
            .collect()
    }

    fn lock_tables(&self) -> std::sync::MutexGuard<'_, HashMap<String, Table>> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<KvCall>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, call: KvCall) {
        self.lock_calls().push(call);
    }

    fn insert(&self, table: &str, item: Item) -> Result<(), KvError> {
        let mut tables = self.lock_tables();
        let t = tables
            .get_mut(table)
            .ok_or_else(|| KvError::UnknownTable(table.to_string()))?;
        let key = t.row_key(table, &item)?;
        t.rows.insert(key, item);
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn get_item(&self, table: &str, key: &Item) -> Result<Option<Item>, KvError> {
        tokio::task::yield_now().await;
        self.record(KvCall::Get { table: table.to_string() });

        let tables = self.lock_tables();
        let t = tables
            .get(table)
            .ok_or_else(|| KvError::UnknownTable(table.to_string()))?;
        let row_key = t.row_key(table, key)?;
        Ok(t.rows.get(&row_key).cloned())
    }

    async fn put_item(&self, table: &str, item: Item) -> Result<(), KvError> {
        tokio::task::yield_now().await;
        self.record(KvCall::Put { table: table.to_string() });
        self.insert(table, item)
    }

    async fn batch_write(&self, table: &str, items: Vec<Item>) -> Result<BatchWriteOutcome, KvError> {
        tokio::task::yield_now().await;
        self.record(KvCall::BatchWrite {
            table: table.to_string(),
            size: items.len(),
        });

        if items.len() > MAX_BATCH_ITEMS {
            return Err(KvError::BatchTooLarge {
                table: table.to_string(),
                size: items.len(),
                limit: MAX_BATCH_ITEMS,
            });
        }

        let submitted = items.len();
        for item in items {
            self.insert(table, item)?;
        }
        Ok(BatchWriteOutcome {
            submitted,
            unprocessed: 0,
        })
    }
}

/// Convenience for building string-keyed items in tests and fixtures.
pub fn item_from_pairs(pairs: &[(&str, Value)]) -> Item {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}
