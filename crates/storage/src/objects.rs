//! Object-store collaborator: fetch, delete, and list source payloads.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use tracing::debug;

use crate::backend::StorageBackend;
use crate::error::StorageError;

/// Object-store operations the ingestion pipeline depends on.
///
/// Every call is assumed strongly consistent; a failure is fatal for the
/// object being processed.
#[async_trait]
pub trait ObjectSource: Send + Sync {
    /// Fetch the full body of an object.
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError>;

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError>;

    /// Write an object (used for seeding and local development).
    async fn put(&self, bucket: &str, key: &str, body: Bytes) -> Result<(), StorageError>;

    /// List keys in a bucket that start with `prefix`, sorted.
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// [`ObjectSource`] over object_store, with one store per bucket.
pub struct BucketStores {
    backend: StorageBackend,
    stores: Mutex<HashMap<String, Arc<dyn ObjectStore>>>,
}

impl BucketStores {
    pub fn new(backend: StorageBackend) -> Self {
        Self {
            backend,
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// In-memory buckets, for tests and dry runs.
    pub fn in_memory() -> Self {
        Self::new(StorageBackend::Memory)
    }

    fn store(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, StorageError> {
        let mut stores = self.stores.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(store) = stores.get(bucket) {
            return Ok(store.clone());
        }
        let store = self.backend.open_bucket(bucket)?;
        stores.insert(bucket.to_string(), store.clone());
        Ok(store)
    }
}

#[async_trait]
impl ObjectSource for BucketStores {
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError> {
        let store = self.store(bucket)?;
        let result = store.get(&Path::from(key)).await?;
        let body = result.bytes().await?;
        debug!(bucket, key, bytes = body.len(), "Fetched object");
        Ok(body)
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let store = self.store(bucket)?;
        match store.delete(&Path::from(key)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, bucket: &str, key: &str, body: Bytes) -> Result<(), StorageError> {
        let store = self.store(bucket)?;
        store.put(&Path::from(key), PutPayload::from(body)).await?;
        Ok(())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError> {
        let store = self.store(bucket)?;
        // object_store prefixes are path segments, so `magnificent7-` would
        // only match a directory; list everything and filter on the raw key.
        let mut stream = store.list(None);
        let mut keys = Vec::new();
        while let Some(meta) = stream.try_next().await? {
            let key = meta.location.to_string();
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}
