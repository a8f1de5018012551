//! Tick payload normalization.
//!
//! A tick payload maps each symbol to the vendor's time-series response:
//!
//! ```text
//! {
//!   "AAPL": {
//!     "Meta Data": { "4. Interval": "5min", ... },
//!     "Time Series (5min)": {
//!       "2024-01-01 09:30:00": { "1. open": "187.15", "5. volume": "120345", ... }
//!     }
//!   }
//! }
//! ```
//!
//! Older captures omit the metadata block, in which case the first field whose
//! name starts with `Time Series` is taken as the series and the interval is
//! derived from the sample spacing.

use serde_json::{Map, Value};

use ticksink_core::{Interval, TickRecord};

use super::timestamp::derive_interval_minutes;
use crate::decode::Document;
use crate::error::SchemaError;

pub const META_DATA_FIELD: &str = "Meta Data";
pub const INTERVAL_META_FIELD: &str = "4. Interval";
pub const SERIES_FIELD_PREFIX: &str = "Time Series";

const OPEN: &str = "1. open";
const HIGH: &str = "2. high";
const LOW: &str = "3. low";
const CLOSE: &str = "4. close";
const VOLUME: &str = "5. volume";

/// How a symbol's series was located.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeriesLayout {
    /// Metadata declares the interval; the series sits under `Time Series (<label>)`.
    Declared { label: String },
    /// No usable metadata; the series is the first `Time Series*` field.
    Discovered { field: String },
}

/// One symbol's resolved series.
#[derive(Debug, Clone)]
pub struct SymbolSeries<'a> {
    pub symbol: &'a str,
    pub layout: SeriesLayout,
    pub interval: Option<Interval>,
    samples: &'a Map<String, Value>,
}

impl<'a> SymbolSeries<'a> {
    /// Locate the series for one symbol entry.
    pub fn resolve(symbol: &'a str, entry: &'a Value) -> Result<Self, SchemaError> {
        let entry = entry.as_object().ok_or_else(|| SchemaError::NotAnObject {
            symbol: symbol.to_string(),
        })?;

        let declared = entry
            .get(META_DATA_FIELD)
            .and_then(|meta| meta.get(INTERVAL_META_FIELD))
            .and_then(Value::as_str);

        if let Some(label) = declared {
            let field = format!("{SERIES_FIELD_PREFIX} ({label})");
            if let Some(samples) = entry.get(&field).and_then(Value::as_object) {
                return Ok(Self {
                    symbol,
                    layout: SeriesLayout::Declared {
                        label: label.to_string(),
                    },
                    interval: Some(Interval::Label(label.to_string())),
                    samples,
                });
            }
        }

        let discovered = entry
            .iter()
            .filter(|(name, _)| name.starts_with(SERIES_FIELD_PREFIX))
            .find_map(|(name, value)| value.as_object().map(|samples| (name, samples)));

        match discovered {
            Some((field, samples)) => Ok(Self {
                symbol,
                layout: SeriesLayout::Discovered {
                    field: field.clone(),
                },
                interval: derive_interval_minutes(samples.keys().map(String::as_str))
                    .map(Interval::Minutes),
                samples,
            }),
            None => Err(SchemaError::NoSeries {
                symbol: symbol.to_string(),
            }),
        }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Samples whose value is not an object. They produce no record.
    pub fn malformed_samples(&self) -> Vec<SchemaError> {
        self.samples
            .iter()
            .filter(|(_, sample)| !sample.is_object())
            .map(|(timestamp, _)| SchemaError::BadSample {
                symbol: self.symbol.to_string(),
                timestamp: timestamp.clone(),
            })
            .collect()
    }

    /// Normalized records for this series, produced lazily.
    pub fn records<'s>(
        &'s self,
        file_name: &'s str,
        ttl: Option<i64>,
    ) -> Box<dyn Iterator<Item = TickRecord> + Send + 's> {
        Box::new(self.samples.iter().filter_map(move |(timestamp, sample)| {
            let sample = sample.as_object()?;
            Some(TickRecord {
                symbol: self.symbol.to_string(),
                timestamp: timestamp.clone(),
                open: numeric_field(sample, OPEN),
                high: numeric_field(sample, HIGH),
                low: numeric_field(sample, LOW),
                close: numeric_field(sample, CLOSE),
                volume: numeric_field(sample, VOLUME),
                interval: self.interval.clone(),
                file_name: file_name.to_string(),
                ttl,
            })
        }))
    }
}

/// Every symbol of a tick payload, resolved.
#[derive(Debug, Default)]
pub struct TickDocument<'a> {
    series: Vec<SymbolSeries<'a>>,
    issues: Vec<SchemaError>,
}

impl<'a> TickDocument<'a> {
    pub fn resolve(doc: &'a Document) -> Self {
        let mut resolved = Self::default();
        for (symbol, entry) in doc {
            match SymbolSeries::resolve(symbol, entry) {
                Ok(series) => {
                    resolved.issues.extend(series.malformed_samples());
                    resolved.series.push(series);
                }
                Err(issue) => resolved.issues.push(issue),
            }
        }
        resolved
    }

    pub fn series(&self) -> &[SymbolSeries<'a>] {
        &self.series
    }

    /// Symbols and samples that were skipped.
    pub fn issues(&self) -> &[SchemaError] {
        &self.issues
    }

    pub fn sample_count(&self) -> usize {
        self.series.iter().map(SymbolSeries::sample_count).sum()
    }

    /// All records of the payload, symbol by symbol.
    pub fn records<'s>(
        &'s self,
        file_name: &'s str,
        ttl: Option<i64>,
    ) -> Box<dyn Iterator<Item = TickRecord> + Send + 's> {
        Box::new(
            self.series
                .iter()
                .flat_map(move |series| series.records(file_name, ttl)),
        )
    }
}

/// Read an OHLCV field as a number.
///
/// Vendor values are numeric strings. Missing, empty, non-numeric and zero
/// values all become `None`: the vendor uses `"0"` for "no data".
pub fn numeric_field(sample: &Map<String, Value>, name: &str) -> Option<f64> {
    let parsed = match sample.get(name)? {
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }?;
    (parsed != 0.0 && parsed.is_finite()).then_some(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn declared_payload() -> Document {
        doc(json!({
            "AAPL": {
                "Meta Data": {"2. Symbol": "AAPL", "4. Interval": "5min"},
                "Time Series (5min)": {
                    "2024-01-01 09:30:00": {
                        "1. open": "187.15", "2. high": "188.00", "3. low": "186.90",
                        "4. close": "187.90", "5. volume": "120345"
                    },
                    "2024-01-01 09:35:00": {
                        "1. open": "187.90", "2. high": "188.10", "3. low": "187.50",
                        "4. close": "188.05", "5. volume": "98000"
                    }
                }
            }
        }))
    }

    #[test]
    fn resolves_declared_layout() {
        let payload = declared_payload();
        let ticks = TickDocument::resolve(&payload);
        assert!(ticks.issues().is_empty());

        let series = &ticks.series()[0];
        assert_eq!(series.layout, SeriesLayout::Declared { label: "5min".into() });
        assert_eq!(series.interval, Some(Interval::Label("5min".into())));

        let records: Vec<_> = ticks.records("magnificent7-a.json.gz", Some(42)).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].symbol, "AAPL");
        assert_eq!(records[0].timestamp, "2024-01-01 09:30:00");
        assert_eq!(records[0].open, Some(187.15));
        assert_eq!(records[0].volume, Some(120345.0));
        assert_eq!(records[0].file_name, "magnificent7-a.json.gz");
        assert_eq!(records[0].ttl, Some(42));
    }

    #[test]
    fn discovers_series_without_metadata() {
        let payload = doc(json!({
            "MSFT": {
                "Time Series (Daily)": {
                    "2024-01-01T09:35:00": {"4. close": "370.1"},
                    "2024-01-01T09:30:00": {"4. close": "370.0"}
                }
            }
        }));
        let ticks = TickDocument::resolve(&payload);
        let series = &ticks.series()[0];
        assert_eq!(
            series.layout,
            SeriesLayout::Discovered { field: "Time Series (Daily)".into() }
        );
        assert_eq!(series.interval, Some(Interval::Minutes(5)));
    }

    #[test]
    fn falls_back_when_declared_series_is_missing() {
        let payload = doc(json!({
            "NVDA": {
                "Meta Data": {"4. Interval": "15min"},
                "Time Series (5min)": {
                    "2024-01-01 09:30:00": {"4. close": "480.0"}
                }
            }
        }));
        let ticks = TickDocument::resolve(&payload);
        let series = &ticks.series()[0];
        assert!(matches!(series.layout, SeriesLayout::Discovered { .. }));
        // One sample: nothing to derive from.
        assert_eq!(series.interval, None);
    }

    #[test]
    fn skips_symbols_without_series() {
        let payload = doc(json!({
            "AAPL": declared_payload()["AAPL"].clone(),
            "GOOG": {"Meta Data": {"4. Interval": "5min"}, "Note": "rate limited"},
            "META": "not an object"
        }));
        let ticks = TickDocument::resolve(&payload);
        assert_eq!(ticks.series().len(), 1);
        assert_eq!(ticks.sample_count(), 2);
        assert_eq!(
            ticks.issues(),
            &[
                SchemaError::NoSeries { symbol: "GOOG".into() },
                SchemaError::NotAnObject { symbol: "META".into() },
            ]
        );
    }

    #[test]
    fn malformed_samples_are_reported_and_skipped() {
        let payload = doc(json!({
            "TSLA": {
                "Time Series (5min)": {
                    "2024-01-01 09:30:00": {"4. close": "250.0"},
                    "2024-01-01 09:35:00": "oops"
                }
            }
        }));
        let ticks = TickDocument::resolve(&payload);
        assert_eq!(ticks.issues().len(), 1);
        assert_eq!(ticks.records("f", None).count(), 1);
    }

    #[test]
    fn zero_empty_and_missing_fields_become_none() {
        let sample = doc(json!({
            "1. open": "0",
            "2. high": "",
            "3. low": "abc",
            "4. close": "0.0000",
            "5. volume": null
        }));
        for field in [OPEN, HIGH, LOW, CLOSE, VOLUME, "6. missing"] {
            assert_eq!(numeric_field(&sample, field), None, "{field}");
        }
    }

    #[test]
    fn numeric_fields_accept_numbers_and_padded_strings() {
        let sample = doc(json!({"1. open": 12.5, "2. high": " 13.25 ", "5. volume": "1e3"}));
        assert_eq!(numeric_field(&sample, OPEN), Some(12.5));
        assert_eq!(numeric_field(&sample, HIGH), Some(13.25));
        assert_eq!(numeric_field(&sample, VOLUME), Some(1000.0));
    }
}
