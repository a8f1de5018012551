pub mod decode;
pub mod dedup;
pub mod error;
pub mod normalize;
pub mod pipeline;
pub mod sweep;
pub mod writer;

pub use decode::{decode_payload, Document};
pub use dedup::{DedupGate, FreshTicks};
pub use error::{DecodeError, IngestError, SchemaError, WriteError};
pub use pipeline::{
    IngestSummary, Ingestor, InvocationReport, ObjectFailure, ObjectOutcome, SkipReason,
};
pub use writer::{BatchWriter, WriteSummary};
