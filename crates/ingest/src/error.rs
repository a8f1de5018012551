use thiserror::Error;

use ticksink_core::CoreError;
use ticksink_storage::{KvError, StorageError};

/// The payload bytes could not be turned into a JSON document.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("gzip decompression failed: {0}")]
    Decompress(#[source] std::io::Error),

    #[error("payload is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("decompressed payload exceeds {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("payload root is a JSON {found}, expected an object")]
    NotAnObject { found: &'static str },
}

/// A symbol entry that could not be normalized. The rest of the file proceeds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("symbol '{symbol}' is not a JSON object")]
    NotAnObject { symbol: String },

    #[error("symbol '{symbol}' has no time series")]
    NoSeries { symbol: String },

    #[error("symbol '{symbol}' sample '{timestamp}' is not a JSON object")]
    BadSample { symbol: String, timestamp: String },
}

/// A bulk write did not persist every record.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("chunk {chunk} of '{table}' failed after {written} records were persisted: {source}")]
    Chunk {
        table: String,
        chunk: usize,
        written: usize,
        #[source]
        source: KvError,
    },

    #[error("chunk {chunk} of '{table}' left {unprocessed} of {submitted} items unprocessed")]
    Unprocessed {
        table: String,
        chunk: usize,
        submitted: usize,
        unprocessed: usize,
    },

    #[error("record conversion failed: {0}")]
    Record(#[from] CoreError),
}

/// Why one source object failed to ingest.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("object fetch failed: {0}")]
    Fetch(#[source] StorageError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("store read failed: {0}")]
    StoreRead(#[source] KvError),

    #[error("store write failed: {0}")]
    StoreWrite(#[from] WriteError),

    #[error("import marker write failed: {0}")]
    Marker(#[source] KvError),

    #[error("record conversion failed: {0}")]
    Record(#[from] CoreError),
}

impl IngestError {
    /// Whether a redelivery of the same object can succeed.
    ///
    /// A payload that fails to decode fails the same way every time.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, IngestError::Decode(_) | IngestError::Record(_))
    }

    /// Short label for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Fetch(_) | IngestError::StoreRead(_) => "store_read",
            IngestError::Decode(_) => "decode",
            IngestError::StoreWrite(_) | IngestError::Marker(_) => "store_write",
            IngestError::Record(_) => "record",
        }
    }
}
