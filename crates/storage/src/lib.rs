pub mod backend;
pub mod error;
pub mod kv;
pub mod objects;

pub use backend::StorageBackend;
pub use error::StorageError;
pub use kv::{BatchWriteOutcome, DynamoKvStore, KeyValueStore, KvError, MemoryKvStore, MAX_BATCH_ITEMS};
pub use objects::{BucketStores, ObjectSource};
