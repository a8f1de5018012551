use std::sync::Arc;

use tracing::debug;

use ticksink_core::{ImportRecord, TickRecord};
use ticksink_storage::{KeyValueStore, KvError};

/// File- and record-level existence checks against the store.
///
/// Both checks are plain reads: two workers racing on the same object can
/// both pass the gate, and the later write of an identical record is a
/// same-key replacement.
#[derive(Clone)]
pub struct DedupGate {
    kv: Arc<dyn KeyValueStore>,
    files_table: String,
    ticks_table: String,
}

/// Ticks that still need writing, and how many were already stored.
#[derive(Debug, Default)]
pub struct FreshTicks {
    pub fresh: Vec<TickRecord>,
    pub existing: usize,
}

impl DedupGate {
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        files_table: impl Into<String>,
        ticks_table: impl Into<String>,
    ) -> Self {
        Self {
            kv,
            files_table: files_table.into(),
            ticks_table: ticks_table.into(),
        }
    }

    /// Whether an import marker exists for this object key.
    pub async fn already_imported(&self, file_name: &str) -> Result<bool, KvError> {
        let marker = self
            .kv
            .get_item(&self.files_table, &ImportRecord::key_of(file_name))
            .await?;
        Ok(marker.is_some())
    }

    pub async fn tick_exists(&self, tick: &TickRecord) -> Result<bool, KvError> {
        Ok(self
            .kv
            .get_item(&self.ticks_table, &tick.key())
            .await?
            .is_some())
    }

    /// Drop ticks whose `(symbol, timestamp)` is already stored.
    ///
    /// Stored ticks are never compared or overwritten. Order is preserved.
    pub async fn filter_new_ticks<I>(&self, ticks: I) -> Result<FreshTicks, KvError>
    where
        I: IntoIterator<Item = TickRecord>,
    {
        let mut result = FreshTicks::default();
        for tick in ticks {
            if self.tick_exists(&tick).await? {
                debug!(symbol = %tick.symbol, timestamp = %tick.timestamp, "Tick already stored");
                result.existing += 1;
            } else {
                result.fresh.push(tick);
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use ticksink_core::config::TablesConfig;
    use ticksink_core::to_item;
    use ticksink_storage::MemoryKvStore;

    fn tick(symbol: &str, timestamp: &str) -> TickRecord {
        TickRecord {
            symbol: symbol.into(),
            timestamp: timestamp.into(),
            open: None,
            high: None,
            low: None,
            close: Some(1.0),
            volume: None,
            interval: None,
            file_name: "magnificent7-a.json.gz".into(),
            ttl: None,
        }
    }

    fn setup() -> (Arc<MemoryKvStore>, DedupGate) {
        let tables = TablesConfig::default();
        let kv = Arc::new(MemoryKvStore::for_tables(&tables));
        let gate = DedupGate::new(kv.clone(), &tables.files, &tables.ticks);
        (kv, gate)
    }

    #[tokio::test]
    async fn gate_reports_marker_presence() {
        let (kv, gate) = setup();
        assert!(!gate.already_imported("magnificent7-a.json.gz").await.unwrap());

        let marker = ImportRecord::new("magnificent7-a.json.gz", chrono::Utc::now(), None);
        kv.put_item("imported_files", to_item(&marker).unwrap())
            .await
            .unwrap();
        assert!(gate.already_imported("magnificent7-a.json.gz").await.unwrap());
        assert!(!gate.already_imported("magnificent7-b.json.gz").await.unwrap());
    }

    #[tokio::test]
    async fn filter_keeps_only_unseen_ticks_in_order() {
        let (kv, gate) = setup();
        let mut stored = to_item(&tick("AAPL", "t2")).unwrap();
        stored.insert("close".into(), json!(99.0));
        kv.put_item("ticks", stored).await.unwrap();

        let result = gate
            .filter_new_ticks(vec![tick("AAPL", "t1"), tick("AAPL", "t2"), tick("MSFT", "t2")])
            .await
            .unwrap();

        assert_eq!(result.existing, 1);
        let keys: Vec<_> = result
            .fresh
            .iter()
            .map(|t| (t.symbol.as_str(), t.timestamp.as_str()))
            .collect();
        assert_eq!(keys, vec![("AAPL", "t1"), ("MSFT", "t2")]);
    }
}
