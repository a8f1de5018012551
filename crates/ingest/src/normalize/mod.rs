//! Map decoded payloads onto canonical records.

pub mod fundamentals;
pub mod ticks;
pub mod timestamp;

pub use fundamentals::{as_of_from_key, resolve_as_of, FundamentalsDocument};
pub use ticks::{numeric_field, SeriesLayout, SymbolSeries, TickDocument};
pub use timestamp::{derive_interval_minutes, parse_sample_time};

use ticksink_core::FileKind;

use crate::decode::Document;
use crate::error::SchemaError;

/// A decoded payload resolved against the shape its file kind implies.
#[derive(Debug)]
pub enum Payload<'a> {
    Ticks(TickDocument<'a>),
    Fundamentals(FundamentalsDocument<'a>),
}

impl<'a> Payload<'a> {
    pub fn resolve(kind: FileKind, doc: &'a Document) -> Self {
        match kind {
            FileKind::Ticks => Payload::Ticks(TickDocument::resolve(doc)),
            FileKind::Fundamentals => Payload::Fundamentals(FundamentalsDocument::resolve(doc)),
        }
    }

    pub fn issues(&self) -> &[SchemaError] {
        match self {
            Payload::Ticks(ticks) => ticks.issues(),
            Payload::Fundamentals(fundamentals) => fundamentals.issues(),
        }
    }
}
