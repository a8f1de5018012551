use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use ticksink_core::{to_item, Item};
use ticksink_storage::{KeyValueStore, MAX_BATCH_ITEMS};

use crate::error::WriteError;

/// What a completed bulk write persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub chunks: usize,
    pub records: usize,
}

/// Splits records into bulk writes of at most [`MAX_BATCH_ITEMS`].
///
/// Chunks go out sequentially in record order. The first chunk that fails,
/// or that comes back with unprocessed items, stops the write.
#[derive(Clone)]
pub struct BatchWriter {
    kv: Arc<dyn KeyValueStore>,
    chunk_size: usize,
}

impl BatchWriter {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            chunk_size: MAX_BATCH_ITEMS,
        }
    }

    /// Use smaller chunks. Values are clamped to `1..=MAX_BATCH_ITEMS`.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(1, MAX_BATCH_ITEMS);
        self
    }

    pub async fn write_all<T: Serialize>(
        &self,
        table: &str,
        records: &[T],
    ) -> Result<WriteSummary, WriteError> {
        // Convert everything first so a bad record fails before any write.
        let items = records.iter().map(to_item).collect::<Result<Vec<Item>, _>>()?;

        let mut summary = WriteSummary::default();
        for (index, chunk) in items.chunks(self.chunk_size).enumerate() {
            let chunk_no = index + 1;
            let outcome = self
                .kv
                .batch_write(table, chunk.to_vec())
                .await
                .map_err(|source| WriteError::Chunk {
                    table: table.to_string(),
                    chunk: chunk_no,
                    written: summary.records,
                    source,
                })?;

            if !outcome.is_complete() {
                return Err(WriteError::Unprocessed {
                    table: table.to_string(),
                    chunk: chunk_no,
                    submitted: outcome.submitted,
                    unprocessed: outcome.unprocessed,
                });
            }

            summary.chunks += 1;
            summary.records += chunk.len();
            debug!(table, chunk = chunk_no, size = chunk.len(), "Chunk written");
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use ticksink_storage::{BatchWriteOutcome, KvError};

    /// Records every bulk write; optionally fails or drops items on one call.
    #[derive(Default)]
    struct RecordingStore {
        batches: Mutex<Vec<Vec<Item>>>,
        fail_on_call: Option<usize>,
        drop_on_call: Option<usize>,
    }

    #[async_trait]
    impl KeyValueStore for RecordingStore {
        async fn get_item(&self, _table: &str, _key: &Item) -> Result<Option<Item>, KvError> {
            Ok(None)
        }

        async fn put_item(&self, _table: &str, _item: Item) -> Result<(), KvError> {
            Ok(())
        }

        async fn batch_write(&self, table: &str, items: Vec<Item>) -> Result<BatchWriteOutcome, KvError> {
            let mut batches = self.batches.lock().unwrap();
            let call = batches.len() + 1;
            if self.fail_on_call == Some(call) {
                return Err(KvError::Write {
                    table: table.to_string(),
                    message: "throttled".into(),
                });
            }
            let submitted = items.len();
            batches.push(items);
            let unprocessed = if self.drop_on_call == Some(call) { 1 } else { 0 };
            Ok(BatchWriteOutcome { submitted, unprocessed })
        }
    }

    #[derive(Serialize)]
    struct Row {
        id: usize,
    }

    fn rows(n: usize) -> Vec<Row> {
        (0..n).map(|id| Row { id }).collect()
    }

    #[tokio::test]
    async fn splits_into_bounded_chunks_in_order() {
        let store = Arc::new(RecordingStore::default());
        let writer = BatchWriter::new(store.clone());

        let summary = writer.write_all("ticks", &rows(53)).await.unwrap();
        assert_eq!(summary, WriteSummary { chunks: 3, records: 53 });

        let batches = store.batches.lock().unwrap();
        let sizes: Vec<_> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![25, 25, 3]);

        let ids: Vec<_> = batches.iter().flatten().map(|item| item["id"].clone()).collect();
        let expected: Vec<_> = (0..53).map(|i| json!(i)).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn nothing_to_write_issues_no_calls() {
        let store = Arc::new(RecordingStore::default());
        let summary = BatchWriter::new(store.clone())
            .write_all::<Row>("ticks", &[])
            .await
            .unwrap();
        assert_eq!(summary, WriteSummary::default());
        assert!(store.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_chunk_stops_the_write() {
        let store = Arc::new(RecordingStore {
            fail_on_call: Some(2),
            ..Default::default()
        });
        let err = BatchWriter::new(store.clone())
            .write_all("ticks", &rows(60))
            .await
            .unwrap_err();

        assert!(matches!(err, WriteError::Chunk { chunk: 2, written: 25, .. }));
        assert_eq!(store.batches.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unprocessed_items_fail_the_write() {
        let store = Arc::new(RecordingStore {
            drop_on_call: Some(1),
            ..Default::default()
        });
        let err = BatchWriter::new(store.clone())
            .write_all("ticks", &rows(30))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            WriteError::Unprocessed { chunk: 1, submitted: 25, unprocessed: 1, .. }
        ));
        assert_eq!(store.batches.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn chunk_size_is_clamped() {
        let store = Arc::new(RecordingStore::default());
        BatchWriter::new(store.clone())
            .with_chunk_size(100)
            .write_all("ticks", &rows(26))
            .await
            .unwrap();
        let sizes: Vec<_> = store.batches.lock().unwrap().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![25, 1]);
    }
}
