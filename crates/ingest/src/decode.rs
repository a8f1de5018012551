//! Gzip JSON payload decoding.

use std::io::Read;

use flate2::read::MultiGzDecoder;
use serde_json::{Map, Value};

use crate::error::DecodeError;

/// A decoded payload: the JSON object at the root of the file.
pub type Document = Map<String, Value>;

/// Decompress and parse one payload.
///
/// Concatenated gzip members are read as one stream. Output beyond
/// `max_bytes` aborts decoding rather than buffering an unbounded body.
pub fn decode_payload(body: &[u8], max_bytes: u64) -> Result<Document, DecodeError> {
    let mut decompressed = Vec::new();
    MultiGzDecoder::new(body)
        .take(max_bytes.saturating_add(1))
        .read_to_end(&mut decompressed)
        .map_err(DecodeError::Decompress)?;

    if decompressed.len() as u64 > max_bytes {
        return Err(DecodeError::TooLarge { limit: max_bytes });
    }

    match serde_json::from_slice::<Value>(&decompressed)? {
        Value::Object(map) => Ok(map),
        other => Err(DecodeError::NotAnObject {
            found: json_kind(&other),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
