//! Backfill: ingest payloads already sitting in a bucket.
//!
//! Objects whose notification was lost, or whose ingestion failed for good,
//! stay in the bucket. A sweep lists both payload prefixes and runs every key
//! through the normal path, so already-imported tick files are skipped by the
//! marker gate.

use tracing::info;

use ticksink_core::{FileKind, SourceObject};

use crate::error::IngestError;
use crate::pipeline::{Ingestor, InvocationReport};

impl Ingestor {
    /// Keys under both payload prefixes, ticks first.
    pub async fn pending_objects(&self, bucket: &str) -> Result<Vec<SourceObject>, IngestError> {
        let mut pending = Vec::new();
        for kind in [FileKind::Ticks, FileKind::Fundamentals] {
            let prefix = self.patterns().listing_prefix(kind);
            let keys = self
                .objects()
                .list(bucket, &prefix)
                .await
                .map_err(IngestError::Fetch)?;
            info!(bucket, prefix = %prefix, count = keys.len(), "Listed pending objects");
            pending.extend(keys.into_iter().map(|key| SourceObject::new(bucket, key)));
        }
        Ok(pending)
    }

    pub async fn sweep(&self, bucket: &str) -> Result<InvocationReport, IngestError> {
        let pending = self.pending_objects(bucket).await?;
        Ok(self.handle(&pending).await)
    }
}
