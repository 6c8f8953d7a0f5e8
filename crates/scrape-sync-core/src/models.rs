//! Core data types that flow through the sync pipeline.
//!
//! A [`Record`] is what a source produces: a JSON object with a designated
//! identifier field. A [`StoredRecord`] is the persisted form, carrying the
//! bookkeeping fields the pipeline owns (creation time, update time, and
//! the downstream [`SyncStatus`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SyncError};

/// Field-name → value mapping of a record's domain fields.
pub type Payload = Map<String, Value>;

/// One page or partition worth of records. Lives for a single iteration.
pub type Batch = Vec<Record>;

/// A record as produced by a source, before persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub payload: Payload,
}

impl Record {
    /// Build a record from a JSON value, reading the identifier from `id_field`.
    ///
    /// String and integer identifiers are accepted; integers are rendered
    /// in decimal. Anything else is rejected.
    pub fn from_value(value: Value, id_field: &str) -> Result<Self> {
        let payload = match value {
            Value::Object(map) => map,
            other => {
                return Err(SyncError::InvalidRecord(format!(
                    "expected a JSON object, got {}",
                    type_name(&other)
                )))
            }
        };

        let id = match payload.get(id_field) {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) if n.is_i64() || n.is_u64() => n.to_string(),
            Some(other) => {
                return Err(SyncError::InvalidRecord(format!(
                    "identifier field '{}' has unsupported type {}",
                    id_field,
                    type_name(other)
                )))
            }
            None => {
                return Err(SyncError::InvalidRecord(format!(
                    "missing identifier field '{}'",
                    id_field
                )))
            }
        };

        Ok(Self { id, payload })
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Downstream processing flag.
///
/// `Pending` records are picked up by the relational export; the export
/// flips them to `Processed` once its batch has committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Processed,
}

impl SyncStatus {
    pub fn as_i64(self) -> i64 {
        match self {
            SyncStatus::Pending => 0,
            SyncStatus::Processed => 1,
        }
    }

    pub fn from_i64(v: i64) -> Option<Self> {
        match v {
            0 => Some(SyncStatus::Pending),
            1 => Some(SyncStatus::Processed),
            _ => None,
        }
    }
}

/// The persisted form of a record.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: String,
    pub payload: Payload,
    /// Set on first insert, never rewritten.
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: SyncStatus,
}

impl StoredRecord {
    /// Stamp a brand-new record.
    pub fn inserted(record: Record, now: DateTime<Utc>) -> Self {
        Self {
            id: record.id,
            payload: record.payload,
            created_at: now,
            updated_at: now,
            status: SyncStatus::Pending,
        }
    }

    /// Produce the next version of `self` carrying a changed payload.
    ///
    /// Incoming keys overwrite stored ones; stored keys the source does not
    /// send are kept.
    pub fn updated(&self, record: Record, now: DateTime<Utc>) -> Self {
        let mut payload = self.payload.clone();
        payload.extend(record.payload);
        Self {
            id: record.id,
            payload,
            created_at: self.created_at,
            updated_at: now,
            status: SyncStatus::Pending,
        }
    }
}

/// How reconcile classified one incoming record.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Inserted,
    Updated { previous: Box<StoredRecord> },
    Unchanged,
}

impl Classification {
    /// Whether the record was already in the store before this run touched it.
    pub fn was_stored(&self) -> bool {
        !matches!(self, Classification::Inserted)
    }
}

/// Outcome of reconciling a single record.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileResult {
    pub id: String,
    pub classification: Classification,
    /// The version to persist; `None` for unchanged records.
    pub write: Option<StoredRecord>,
}
