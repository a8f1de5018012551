use std::path::PathBuf;
use std::sync::Arc;

use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::ObjectStore;
use tracing::info;

use ticksink_core::config::{AwsConfig, ObjectStoreConfig};

use crate::error::StorageError;

/// Which object_store implementation backs each bucket.
///
/// Notifications name their bucket, so stores are opened per bucket on demand
/// rather than once at startup.
#[derive(Debug, Clone)]
pub enum StorageBackend {
    S3(AwsConfig),
    /// Each bucket is a subdirectory of the root.
    Local(PathBuf),
    Memory,
}

impl StorageBackend {
    pub fn from_config(objects: &ObjectStoreConfig, aws: &AwsConfig) -> Result<Self, StorageError> {
        match objects.backend.as_str() {
            "s3" => Ok(StorageBackend::S3(aws.clone())),
            "local" => Ok(StorageBackend::Local(objects.local_root.clone())),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(StorageError::NotConfigured(format!(
                "unknown object store backend '{other}' (expected s3, local or memory)"
            ))),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, StorageBackend::S3(_))
    }

    /// Open the store for one bucket.
    pub fn open_bucket(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, StorageError> {
        match self {
            StorageBackend::S3(aws) => open_s3(aws, bucket),
            StorageBackend::Local(root) => open_local(root, bucket),
            StorageBackend::Memory => Ok(Arc::new(InMemory::new())),
        }
    }
}

fn open_local(root: &std::path::Path, bucket: &str) -> Result<Arc<dyn ObjectStore>, StorageError> {
    let dir = root.join(bucket);
    std::fs::create_dir_all(&dir)?;
    let canonical = std::fs::canonicalize(&dir).unwrap_or(dir);
    let store = LocalFileSystem::new_with_prefix(&canonical)
        .map_err(|e| StorageError::Other(format!("local filesystem error: {e}")))?;
    info!("Storage: local bucket '{}' at {}", bucket, canonical.display());
    Ok(Arc::new(store))
}

fn open_s3(aws: &AwsConfig, bucket: &str) -> Result<Arc<dyn ObjectStore>, StorageError> {
    if bucket.is_empty() {
        return Err(StorageError::NotConfigured("empty bucket name".into()));
    }

    // from_env picks up ambient credentials (instance role, web identity)
    // when no static keys are configured.
    let mut builder = AmazonS3Builder::from_env()
        .with_region(&aws.region)
        .with_bucket_name(bucket);

    if let Some(ref key) = aws.access_key_id {
        builder = builder.with_access_key_id(key);
    }
    if let Some(ref secret) = aws.secret_access_key {
        builder = builder.with_secret_access_key(secret);
    }
    if let Some(ref token) = aws.session_token {
        builder = builder.with_token(token);
    }
    if let Some(endpoint_url) = aws.endpoint_with_scheme() {
        builder = builder
            .with_allow_http(endpoint_url.starts_with("http://"))
            .with_endpoint(endpoint_url);
    }

    let store = builder.build()?;
    info!("Storage: S3 bucket s3://{} (region: {})", bucket, aws.region);
    Ok(Arc::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn objects(backend: &str) -> ObjectStoreConfig {
        ObjectStoreConfig {
            backend: backend.into(),
            local_root: PathBuf::from("data/objects"),
        }
    }

    fn aws() -> AwsConfig {
        AwsConfig {
            region: "us-east-1".into(),
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            endpoint_url: None,
        }
    }

    #[test]
    fn selects_backend_from_config() {
        assert!(StorageBackend::from_config(&objects("s3"), &aws()).unwrap().is_remote());
        assert!(!StorageBackend::from_config(&objects("memory"), &aws()).unwrap().is_remote());
        assert!(matches!(
            StorageBackend::from_config(&objects("gcs"), &aws()),
            Err(StorageError::NotConfigured(_))
        ));
    }

    #[test]
    fn local_bucket_creates_directory() {
        let tmp = std::env::temp_dir().join(format!("ticksink-backend-{}", uuid::Uuid::new_v4()));
        let backend = StorageBackend::Local(tmp.clone());
        backend.open_bucket("incoming").unwrap();
        assert!(Path::new(&tmp.join("incoming")).is_dir());
        std::fs::remove_dir_all(&tmp).ok();
    }
}
