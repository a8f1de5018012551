use chrono::{DateTime, NaiveDate, NaiveDateTime};

const SAMPLE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"];

/// Parse a sample timestamp as the vendor writes it.
///
/// Intraday keys look like `2024-01-01 09:30:00`; daily keys are bare dates
/// and read as midnight. RFC 3339 strings are converted to UTC.
pub fn parse_sample_time(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    for format in SAMPLE_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts);
        }
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.naive_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Minutes between the two earliest sample timestamps.
///
/// Timestamps are ordered lexically, which matches chronological order for
/// the vendor's zero-padded format. Returns `None` with fewer than two
/// samples or when either of the two cannot be parsed.
pub fn derive_interval_minutes<'a, I>(timestamps: I) -> Option<i64>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut earliest: Vec<&str> = timestamps.into_iter().collect();
    earliest.sort_unstable();

    let [first, second, ..] = earliest.as_slice() else {
        return None;
    };
    let first = parse_sample_time(first)?;
    let second = parse_sample_time(second)?;
    Some((second - first).num_minutes().abs())
}
