use thiserror::Error;

/// Errors produced by [`KeyValueStore`](super::KeyValueStore) implementations.
#[derive(Debug, Error)]
pub enum KvError {
    #[error("read from '{table}' failed: {message}")]
    Read { table: String, message: String },

    #[error("write to '{table}' failed: {message}")]
    Write { table: String, message: String },

    #[error("batch of {size} items exceeds the limit of {limit} for '{table}'")]
    BatchTooLarge { table: String, size: usize, limit: usize },

    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("item for '{table}' is missing key attribute '{attribute}'")]
    MissingKey { table: String, attribute: String },

    #[error("item conversion error: {0}")]
    Conversion(String),
}
