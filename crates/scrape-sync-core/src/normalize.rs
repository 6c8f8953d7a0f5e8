//! Record normalization applied before reconcile.
//!
//! Sources hand back payloads that carry fields owned by other systems
//! (embedded user objects, image crops) and dates in whatever offset the
//! API felt like using. Both make a naive comparison against the stored
//! version report spurious changes, so every incoming record is passed
//! through a [`Normalizer`] first.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::models::Record;

/// Per-source normalization rules.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    /// Top-level fields removed from every record.
    pub drop_fields: Vec<String>,
    /// Field set on every record (e.g. the owning account id).
    pub stamp: Option<(String, Value)>,
}

impl Normalizer {
    pub fn new(drop_fields: Vec<String>) -> Self {
        Self {
            drop_fields,
            stamp: None,
        }
    }

    pub fn with_stamp(mut self, field: impl Into<String>, value: Value) -> Self {
        self.stamp = Some((field.into(), value));
        self
    }

    pub fn apply(&self, record: &mut Record) {
        for field in &self.drop_fields {
            record.payload.remove(field);
        }
        if let Some((field, value)) = &self.stamp {
            record.payload.insert(field.clone(), value.clone());
        }
        for value in record.payload.values_mut() {
            coerce_datetimes(value);
        }
    }
}

/// Rewrite every RFC 3339 string inside `value` into canonical UTC form.
///
/// `2024-05-01T12:00:00+02:00` and `2024-05-01T10:00:00Z` describe the same
/// instant and both become `2024-05-01T10:00:00Z`.
pub fn coerce_datetimes(value: &mut Value) {
    match value {
        Value::String(s) => {
            if let Some(dt) = parse_rfc3339(s) {
                *s = canonical(&dt);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(coerce_datetimes),
        Value::Object(map) => map.values_mut().for_each(coerce_datetimes),
        _ => {}
    }
}

fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    // cheap reject before handing every string to chrono
    let bytes = s.as_bytes();
    if bytes.len() < 20 || bytes[4] != b'-' || bytes[7] != b'-' {
        return None;
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn canonical(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Interpret a payload value as a point in time.
///
/// Accepts RFC 3339 strings and integer Unix timestamps (seconds, or
/// milliseconds when the value is too large to be seconds).
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_rfc3339(s),
        Value::Number(n) => {
            let raw = n.as_i64()?;
            if raw.abs() >= 100_000_000_000 {
                DateTime::from_timestamp_millis(raw)
            } else {
                DateTime::from_timestamp(raw, 0)
            }
        }
        _ => None,
    }
}
