pub mod consumer;
pub mod error;
pub mod parser;
pub mod sqs;

pub use consumer::{QueueConsumer, QueueMessage};
pub use error::QueueError;
pub use parser::{decode_key, parse_batch, parse_notifications};
pub use sqs::SqsConsumer;
