//! Per-object ingestion and batch handling.
//!
//! For each notified object:
//!
//! 1. Classify the key; unmatched keys are skipped without touching any store.
//! 2. Ticks only: skip the object if its import marker exists.
//! 3. Fetch and decode the payload.
//! 4. Normalize it into records.
//! 5. Ticks only: drop records whose key is already stored.
//! 6. Write the remaining records in bounded chunks.
//! 7. Ticks only: write the import marker.
//! 8. Delete the source object (best effort).
//!
//! A failure at any step leaves the object in place and withholds the marker,
//! so the next delivery resumes from whatever was persisted.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use ticksink_core::config::{IngestConfig, TablesConfig};
use ticksink_core::{to_item, ttl_after, FileKind, ImportRecord, KeyPatterns, SourceObject};
use ticksink_storage::{KeyValueStore, ObjectSource};

use crate::decode::{decode_payload, Document};
use crate::dedup::DedupGate;
use crate::error::IngestError;
use crate::normalize::{resolve_as_of, FundamentalsDocument, Payload, TickDocument};
use crate::writer::BatchWriter;

/// Why an object was not ingested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The key matches neither payload pattern.
    Unmatched,
    /// An import marker already exists for the key.
    AlreadyImported,
}

/// What ingesting one object achieved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub kind: FileKind,
    /// Records persisted by this run.
    pub written: usize,
    /// Ticks skipped because they were already stored.
    pub existing: usize,
    /// Symbols or samples that could not be normalized.
    pub schema_issues: usize,
    /// Whether the source object was removed.
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ObjectOutcome {
    Skipped { reason: SkipReason },
    Done(IngestSummary),
}

/// A failed object and why.
#[derive(Debug, Clone, Serialize)]
pub struct ObjectFailure {
    pub object: SourceObject,
    pub kind: &'static str,
    pub retryable: bool,
    pub message: String,
}

/// Coarse result of one invocation over a batch of notifications.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InvocationReport {
    pub done: usize,
    pub skipped: usize,
    pub records_written: usize,
    pub failures: Vec<ObjectFailure>,
}

impl InvocationReport {
    /// True when no object in the batch failed.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    fn record(&mut self, object: &SourceObject, result: Result<ObjectOutcome, IngestError>) {
        match result {
            Ok(ObjectOutcome::Skipped { .. }) => self.skipped += 1,
            Ok(ObjectOutcome::Done(summary)) => {
                self.done += 1;
                self.records_written += summary.written;
            }
            Err(e) => self.failures.push(ObjectFailure {
                object: object.clone(),
                kind: e.kind(),
                retryable: e.is_retryable(),
                message: e.to_string(),
            }),
        }
    }
}

/// Idempotent ingestion of payload objects into the key-value store.
pub struct Ingestor {
    objects: Arc<dyn ObjectSource>,
    kv: Arc<dyn KeyValueStore>,
    tables: TablesConfig,
    settings: IngestConfig,
    patterns: KeyPatterns,
    gate: DedupGate,
    writer: BatchWriter,
}

impl Ingestor {
    pub fn new(
        objects: Arc<dyn ObjectSource>,
        kv: Arc<dyn KeyValueStore>,
        tables: TablesConfig,
        settings: IngestConfig,
    ) -> Self {
        let gate = DedupGate::new(kv.clone(), &tables.files, &tables.ticks);
        let writer = BatchWriter::new(kv.clone());
        Self {
            patterns: KeyPatterns::from_config(&settings),
            objects,
            kv,
            tables,
            settings,
            gate,
            writer,
        }
    }

    pub fn patterns(&self) -> &KeyPatterns {
        &self.patterns
    }

    pub(crate) fn objects(&self) -> &dyn ObjectSource {
        self.objects.as_ref()
    }

    /// Process a batch of notifications one object at a time.
    ///
    /// A failing object never stops the others.
    pub async fn handle(&self, notifications: &[SourceObject]) -> InvocationReport {
        let mut report = InvocationReport::default();
        for object in notifications {
            let result = self.ingest_object(object).await;
            match &result {
                Ok(ObjectOutcome::Skipped { reason }) => {
                    debug!(object = %object, reason = ?reason, "Object skipped");
                }
                Ok(ObjectOutcome::Done(summary)) => info!(
                    object = %object,
                    kind = %summary.kind,
                    written = summary.written,
                    existing = summary.existing,
                    deleted = summary.deleted,
                    "Object ingested"
                ),
                Err(e) => error!(
                    object = %object,
                    kind = e.kind(),
                    retryable = e.is_retryable(),
                    error = %e,
                    "Object ingestion failed"
                ),
            }
            report.record(object, result);
        }

        info!(
            done = report.done,
            skipped = report.skipped,
            failed = report.failed(),
            records = report.records_written,
            "Invocation complete"
        );
        report
    }

    /// Ingest a single object.
    pub async fn ingest_object(&self, object: &SourceObject) -> Result<ObjectOutcome, IngestError> {
        let Some(kind) = self.patterns.classify(&object.key) else {
            return Ok(ObjectOutcome::Skipped {
                reason: SkipReason::Unmatched,
            });
        };

        if kind == FileKind::Ticks
            && self
                .gate
                .already_imported(&object.key)
                .await
                .map_err(IngestError::StoreRead)?
        {
            info!(object = %object, "Already imported, skipping");
            return Ok(ObjectOutcome::Skipped {
                reason: SkipReason::AlreadyImported,
            });
        }

        let started = Utc::now();
        let doc = self.fetch(object).await?;
        let payload = Payload::resolve(kind, &doc);
        for issue in payload.issues() {
            warn!(object = %object, issue = %issue, "Skipping unreadable entry");
        }
        let schema_issues = payload.issues().len();

        let (written, existing) = match &payload {
            Payload::Ticks(ticks) => self.store_ticks(object, ticks, started).await?,
            Payload::Fundamentals(fundamentals) => {
                self.store_fundamentals(object, fundamentals, started).await?
            }
        };

        let deleted = self.remove_source(object).await;

        Ok(ObjectOutcome::Done(IngestSummary {
            kind,
            written,
            existing,
            schema_issues,
            deleted,
        }))
    }

    async fn fetch(&self, object: &SourceObject) -> Result<Document, IngestError> {
        let body = self
            .objects
            .get(&object.bucket, &object.key)
            .await
            .map_err(IngestError::Fetch)?;
        debug!(object = %object, bytes = body.len(), "Payload fetched");
        Ok(decode_payload(&body, self.settings.max_payload_bytes())?)
    }

    async fn store_ticks(
        &self,
        object: &SourceObject,
        ticks: &TickDocument<'_>,
        started: DateTime<Utc>,
    ) -> Result<(usize, usize), IngestError> {
        let ttl = ttl_after(started, self.settings.tick_ttl_days);
        let filtered = self
            .gate
            .filter_new_ticks(ticks.records(&object.key, ttl))
            .await
            .map_err(IngestError::StoreRead)?;
        debug!(
            object = %object,
            samples = ticks.sample_count(),
            fresh = filtered.fresh.len(),
            existing = filtered.existing,
            "Ticks filtered"
        );

        let summary = self.writer.write_all(&self.tables.ticks, &filtered.fresh).await?;

        let marker = ImportRecord::new(
            object.key.as_str(),
            Utc::now(),
            ttl_after(started, self.settings.marker_ttl_days),
        );
        self.kv
            .put_item(&self.tables.files, to_item(&marker)?)
            .await
            .map_err(IngestError::Marker)?;

        Ok((summary.records, filtered.existing))
    }

    async fn store_fundamentals(
        &self,
        object: &SourceObject,
        fundamentals: &FundamentalsDocument<'_>,
        started: DateTime<Utc>,
    ) -> Result<(usize, usize), IngestError> {
        let (as_of, from_key) =
            resolve_as_of(&object.key, &self.settings.fundamentals_prefix, started);
        if !from_key {
            warn!(object = %object, as_of = %as_of, "No snapshot stamp in key, using current time");
        }

        let ttl = ttl_after(started, self.settings.fundamentals_ttl_days);
        let records: Vec<_> = fundamentals.records(&as_of, ttl).collect();
        let summary = self
            .writer
            .write_all(&self.tables.fundamentals, &records)
            .await?;
        Ok((summary.records, 0))
    }

    async fn remove_source(&self, object: &SourceObject) -> bool {
        match self.objects.delete(&object.bucket, &object.key).await {
            Ok(()) => true,
            Err(e) => {
                warn!(object = %object, error = %e, "Failed to delete source object");
                false
            }
        }
    }
}
