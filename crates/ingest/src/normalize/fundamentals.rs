use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use ticksink_core::{FundamentalsRecord, PAYLOAD_SUFFIX};

use crate::decode::Document;
use crate::error::SchemaError;

/// Shape of the filename-safe snapshot stamp: `2025-06-17T21_36_09.840Z`.
/// `9` stands for any ASCII digit.
const STAMP_TEMPLATE: &[u8] = b"9999-99-99T99_99_99.999Z";

/// Recover the snapshot instant from a fundamentals object key.
///
/// `fundamentals-2025-06-17T21_36_09.840Z.json.gz` yields
/// `2025-06-17T21:36:09.840Z`. Returns `None` when the key does not carry a
/// well-formed stamp.
pub fn as_of_from_key(key: &str, prefix: &str) -> Option<String> {
    let stamp = key
        .strip_prefix(prefix)?
        .strip_prefix('-')?
        .strip_suffix(PAYLOAD_SUFFIX)?;

    let well_formed = stamp.len() == STAMP_TEMPLATE.len()
        && stamp
            .bytes()
            .zip(STAMP_TEMPLATE)
            .all(|(c, t)| if *t == b'9' { c.is_ascii_digit() } else { c == *t });
    if !well_formed {
        return None;
    }

    let as_of = stamp.replace('_', ":");
    DateTime::parse_from_rfc3339(&as_of).ok()?;
    Some(as_of)
}

/// Snapshot instant for a key, or the current time when the key has no stamp.
pub fn resolve_as_of(key: &str, prefix: &str, now: DateTime<Utc>) -> (String, bool) {
    match as_of_from_key(key, prefix) {
        Some(as_of) => (as_of, true),
        None => (now.to_rfc3339_opts(SecondsFormat::Millis, true), false),
    }
}

/// Every symbol of a fundamentals payload.
#[derive(Debug, Default)]
pub struct FundamentalsDocument<'a> {
    entries: Vec<(&'a str, &'a Map<String, Value>)>,
    issues: Vec<SchemaError>,
}

impl<'a> FundamentalsDocument<'a> {
    pub fn resolve(doc: &'a Document) -> Self {
        let mut resolved = Self::default();
        for (symbol, entry) in doc {
            match entry.as_object() {
                Some(fields) => resolved.entries.push((symbol, fields)),
                None => resolved.issues.push(SchemaError::NotAnObject {
                    symbol: symbol.clone(),
                }),
            }
        }
        resolved
    }

    pub fn symbol_count(&self) -> usize {
        self.entries.len()
    }

    pub fn issues(&self) -> &[SchemaError] {
        &self.issues
    }

    /// One record per symbol with the vendor fields carried verbatim.
    pub fn records<'s>(
        &'s self,
        as_of: &'s str,
        ttl: Option<i64>,
    ) -> Box<dyn Iterator<Item = FundamentalsRecord> + Send + 's> {
        Box::new(self.entries.iter().map(move |(symbol, fields)| {
            FundamentalsRecord::new(*symbol, as_of, (*fields).clone(), ttl)
        }))
    }
}
