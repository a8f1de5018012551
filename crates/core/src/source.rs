use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::IngestConfig;

/// Suffix every ingestible object key carries.
pub const PAYLOAD_SUFFIX: &str = ".json.gz";

/// An object in the object store, addressed by bucket and key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceObject {
    pub bucket: String,
    pub key: String,
}

impl SourceObject {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for SourceObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Logical payload type, decided from the object key alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Ticks,
    Fundamentals,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Ticks => "ticks",
            FileKind::Fundamentals => "fundamentals",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key patterns `<prefix>-*.json.gz` for the two payload types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPatterns {
    pub tick_prefix: String,
    pub fundamentals_prefix: String,
}

impl KeyPatterns {
    pub fn new(tick_prefix: impl Into<String>, fundamentals_prefix: impl Into<String>) -> Self {
        Self {
            tick_prefix: tick_prefix.into(),
            fundamentals_prefix: fundamentals_prefix.into(),
        }
    }

    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(&config.tick_prefix, &config.fundamentals_prefix)
    }

    /// Classify a key, or `None` when it matches neither pattern.
    pub fn classify(&self, key: &str) -> Option<FileKind> {
        if matches_pattern(key, &self.tick_prefix) {
            Some(FileKind::Ticks)
        } else if matches_pattern(key, &self.fundamentals_prefix) {
            Some(FileKind::Fundamentals)
        } else {
            None
        }
    }

    /// Listing prefix (`<prefix>-`) for a payload type.
    pub fn listing_prefix(&self, kind: FileKind) -> String {
        match kind {
            FileKind::Ticks => format!("{}-", self.tick_prefix),
            FileKind::Fundamentals => format!("{}-", self.fundamentals_prefix),
        }
    }
}

fn matches_pattern(key: &str, prefix: &str) -> bool {
    key.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('-'))
        .is_some_and(|rest| rest.ends_with(PAYLOAD_SUFFIX))
}
