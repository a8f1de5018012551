use std::fmt;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

/// A flat key-value item as stored in the key-value store.
pub type Item = Map<String, Value>;

/// Sampling granularity of a tick series.
///
/// Either the vendor's label (`"5min"`) when the payload declares it, or the
/// number of minutes between the two earliest samples when it has to be derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Interval {
    Minutes(i64),
    Label(String),
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interval::Minutes(m) => write!(f, "{m}"),
            Interval::Label(l) => f.write_str(l),
        }
    }
}

/// One OHLCV sample for an instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickRecord {
    pub symbol: String,
    pub timestamp: String,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<Interval>,
    /// Source object that produced this sample.
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,
}

impl TickRecord {
    /// Identity of a tick in the ticks table.
    pub fn key_of(symbol: &str, timestamp: &str) -> Item {
        let mut key = Item::new();
        key.insert("symbol".into(), Value::String(symbol.to_string()));
        key.insert("timestamp".into(), Value::String(timestamp.to_string()));
        key
    }

    pub fn key(&self) -> Item {
        Self::key_of(&self.symbol, &self.timestamp)
    }
}

/// Point-in-time fundamentals for one instrument.
///
/// Vendor fields are carried verbatim in `fields`; the derived identity
/// attributes always win over a vendor field of the same name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundamentalsRecord {
    pub symbol: String,
    pub as_of: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl FundamentalsRecord {
    pub fn new(
        symbol: impl Into<String>,
        as_of: impl Into<String>,
        mut fields: Map<String, Value>,
        ttl: Option<i64>,
    ) -> Self {
        for reserved in ["symbol", "as_of", "ttl"] {
            fields.remove(reserved);
        }
        Self {
            symbol: symbol.into(),
            as_of: as_of.into(),
            ttl,
            fields,
        }
    }

    pub fn key(&self) -> Item {
        let mut key = Item::new();
        key.insert("symbol".into(), Value::String(self.symbol.clone()));
        key.insert("as_of".into(), Value::String(self.as_of.clone()));
        key
    }
}

/// File-level marker: its presence means the object was fully ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRecord {
    pub file_name: String,
    pub imported_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,
}

impl ImportRecord {
    pub fn new(file_name: impl Into<String>, imported_at: DateTime<Utc>, ttl: Option<i64>) -> Self {
        Self {
            file_name: file_name.into(),
            imported_at: imported_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            ttl,
        }
    }

    pub fn key_of(file_name: &str) -> Item {
        let mut key = Item::new();
        key.insert("file_name".into(), Value::String(file_name.to_string()));
        key
    }
}

/// Expiry as epoch seconds, `days` after `from`.
///
/// Zero days means no expiry, as does a horizon past the representable range.
pub fn ttl_after(from: DateTime<Utc>, days: u32) -> Option<i64> {
    if days == 0 {
        return None;
    }
    from.checked_add_signed(Duration::days(i64::from(days)))
        .map(|expiry| expiry.timestamp())
}

/// Serialize a record into a store item.
pub fn to_item<T: Serialize>(record: &T) -> Result<Item, CoreError> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map),
        other => Err(CoreError::NotAnObject(other.to_string())),
    }
}

/// Deserialize a store item back into a record.
pub fn from_item<T: for<'de> Deserialize<'de>>(item: Item) -> Result<T, CoreError> {
    Ok(serde_json::from_value(Value::Object(item))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn sample_tick() -> TickRecord {
        TickRecord {
            symbol: "AAPL".into(),
            timestamp: "2024-01-01 09:30:00".into(),
            open: Some(187.15),
            high: Some(188.0),
            low: None,
            close: Some(187.9),
            volume: Some(120_345.0),
            interval: Some(Interval::Label("5min".into())),
            file_name: "magnificent7-2024-01-01.json.gz".into(),
            ttl: None,
        }
    }

    #[test]
    fn tick_item_keeps_nulls_and_drops_absent_ttl() {
        let item = to_item(&sample_tick()).unwrap();
        assert_eq!(item.get("low"), Some(&Value::Null));
        assert_eq!(item.get("interval"), Some(&json!("5min")));
        assert!(!item.contains_key("ttl"));
    }

    #[test]
    fn tick_item_reads_back() {
        let tick = sample_tick();
        let back: TickRecord = from_item(to_item(&tick).unwrap()).unwrap();
        assert_eq!(back, tick);
    }

    #[test]
    fn interval_serializes_untagged() {
        assert_eq!(serde_json::to_value(Interval::Minutes(5)).unwrap(), json!(5));
        assert_eq!(serde_json::to_value(Interval::Label("1min".into())).unwrap(), json!("1min"));
        assert_eq!(Interval::Minutes(1440).to_string(), "1440");
    }

    #[test]
    fn fundamentals_derived_fields_win() {
        let mut fields = Map::new();
        fields.insert("symbol".into(), json!("WRONG"));
        fields.insert("PERatio".into(), json!("31.2"));
        let rec = FundamentalsRecord::new("MSFT", "2025-06-17T21:36:09.840Z", fields, Some(10));

        let item = to_item(&rec).unwrap();
        assert_eq!(item.get("symbol"), Some(&json!("MSFT")));
        assert_eq!(item.get("PERatio"), Some(&json!("31.2")));
        assert_eq!(item.get("ttl"), Some(&json!(10)));
        assert_eq!(rec.key().len(), 2);
    }

    #[test]
    fn ttl_after_days() {
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(ttl_after(from, 0), None);
        assert_eq!(ttl_after(from, 1), Some(from.timestamp() + 86_400));
    }

    #[test]
    fn ttl_beyond_calendar_range_is_dropped() {
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(ttl_after(from, 200_000_000), None);
        assert_eq!(ttl_after(from, u32::MAX), None);
    }

    #[test]
    fn import_record_formats_instant() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 9, 30, 0).unwrap();
        let rec = ImportRecord::new("magnificent7-x.json.gz", at, None);
        assert_eq!(rec.imported_at, "2024-01-01T09:30:00.000Z");
        assert_eq!(ImportRecord::key_of("a").get("file_name"), Some(&json!("a")));
    }
}
