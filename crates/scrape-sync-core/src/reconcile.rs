//! Compare-and-classify step.
//!
//! Given an incoming record and the stored version with the same id (if
//! any), decide whether a write is needed and stamp the bookkeeping fields
//! of the version to write.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::models::{Classification, Payload, Record, ReconcileResult, StoredRecord};

/// Classify `incoming` against `stored`.
///
/// - no stored version → `Inserted`, creation and update time set to `now`
/// - stored version differs → `Updated`, creation time carried over
/// - stored version equal → `Unchanged`, nothing to write
pub fn reconcile(
    incoming: Record,
    stored: Option<StoredRecord>,
    now: DateTime<Utc>,
) -> ReconcileResult {
    let id = incoming.id.clone();
    match stored {
        None => ReconcileResult {
            id,
            classification: Classification::Inserted,
            write: Some(StoredRecord::inserted(incoming, now)),
        },
        Some(previous) => {
            let comparable = comparable_view(&previous.payload, &incoming.payload);
            if payload_eq(&comparable, &incoming.payload) {
                ReconcileResult {
                    id,
                    classification: Classification::Unchanged,
                    write: None,
                }
            } else {
                let next = previous.updated(incoming, now);
                ReconcileResult {
                    id,
                    classification: Classification::Updated {
                        previous: Box::new(previous),
                    },
                    write: Some(next),
                }
            }
        }
    }
}

/// The stored payload restricted to the keys the incoming payload carries.
///
/// Fields attached to the stored document by other subsystems are not
/// part of what the source sends and must not count as a difference.
pub fn comparable_view(stored: &Payload, incoming: &Payload) -> Payload {
    stored
        .iter()
        .filter(|(k, _)| incoming.contains_key(*k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn payload_eq(a: &Payload, b: &Payload) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .all(|(k, v)| b.get(k).is_some_and(|other| json_eq(v, other)))
}

/// Deep structural equality where numbers compare by value (`10 == 10.0`).
pub fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if x.is_f64() || y.is_f64() {
                x.as_f64() == y.as_f64()
            } else {
                x == y
            }
        }
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_eq(x, y))
        }
        (Value::Object(xm), Value::Object(ym)) => payload_eq(xm, ym),
        _ => a == b,
    }
}
