//! Key-value store collaborator.
//!
//! The pipeline needs three operations: a point lookup for the dedup gates,
//! a single put for the import marker, and a bounded bulk put for records.

mod dynamo;
mod error;
mod memory;

pub use dynamo::DynamoKvStore;
pub use error::KvError;
pub use memory::{item_from_pairs, KvCall, MemoryKvStore};

use async_trait::async_trait;

use ticksink_core::Item;

/// Per-request item limit of a bulk write.
pub const MAX_BATCH_ITEMS: usize = 25;

/// Result of a bulk write that the store accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchWriteOutcome {
    pub submitted: usize,
    /// Items the store accepted the request for but did not persist.
    pub unprocessed: usize,
}

impl BatchWriteOutcome {
    pub fn is_complete(&self) -> bool {
        self.unprocessed == 0
    }
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Look up one item by its full key. `Ok(None)` means absent.
    async fn get_item(&self, table: &str, key: &Item) -> Result<Option<Item>, KvError>;

    /// Atomically write a single item, replacing any item with the same key.
    async fn put_item(&self, table: &str, item: Item) -> Result<(), KvError>;

    /// Write at most [`MAX_BATCH_ITEMS`] items in one request.
    async fn batch_write(&self, table: &str, items: Vec<Item>) -> Result<BatchWriteOutcome, KvError>;
}
