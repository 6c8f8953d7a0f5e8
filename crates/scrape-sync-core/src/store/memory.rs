//! In-memory store implementations for tests and dry runs.
//!
//! Uses `BTreeMap` behind `std::sync::RwLock` so iteration order is
//! deterministic.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{Result, SyncError};
use crate::mapping::{Row, SqlValue};
use crate::models::{StoredRecord, SyncStatus};

use super::{DocumentStore, StatusCounts, TableSink};

type Key = (String, String);

#[derive(Default)]
pub struct InMemoryDocumentStore {
    docs: RwLock<BTreeMap<Key, StoredRecord>>,
    /// Ids whose upsert fails, to exercise per-record error handling.
    poisoned: RwLock<BTreeSet<String>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later upsert of `id` fail.
    pub fn poison(&self, id: &str) {
        self.poisoned.write().unwrap().insert(id.to_string());
    }

    pub fn len(&self) -> usize {
        self.docs.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of one collection, ordered by id.
    pub fn records(&self, collection: &str) -> Vec<StoredRecord> {
        self.docs
            .read()
            .unwrap()
            .iter()
            .filter(|((c, _), _)| c == collection)
            .map(|(_, r)| r.clone())
            .collect()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn find(&self, collection: &str, id: &str) -> Result<Option<StoredRecord>> {
        let docs = self.docs.read().unwrap();
        Ok(docs
            .get(&(collection.to_string(), id.to_string()))
            .cloned())
    }

    async fn upsert(&self, collection: &str, record: &StoredRecord) -> Result<()> {
        if self.poisoned.read().unwrap().contains(&record.id) {
            return Err(SyncError::RecordWrite {
                id: record.id.clone(),
                message: "write rejected".into(),
            });
        }
        let mut docs = self.docs.write().unwrap();
        let key = (collection.to_string(), record.id.clone());
        let mut next = record.clone();
        if let Some(existing) = docs.get(&key) {
            next.created_at = existing.created_at;
        }
        docs.insert(key, next);
        Ok(())
    }

    async fn pending(&self, collection: &str, limit: u64) -> Result<Vec<StoredRecord>> {
        let docs = self.docs.read().unwrap();
        let mut pending: Vec<StoredRecord> = docs
            .iter()
            .filter(|((c, _), r)| c == collection && r.status == SyncStatus::Pending)
            .map(|(_, r)| r.clone())
            .collect();
        pending.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then(a.id.cmp(&b.id)));
        pending.truncate(limit as usize);
        Ok(pending)
    }

    async fn mark_processed(
        &self,
        collection: &str,
        versions: &[(String, DateTime<Utc>)],
    ) -> Result<u64> {
        let mut docs = self.docs.write().unwrap();
        let mut flipped = 0;
        for (id, updated_at) in versions {
            if let Some(r) = docs.get_mut(&(collection.to_string(), id.clone())) {
                if r.status == SyncStatus::Pending && r.updated_at == *updated_at {
                    r.status = SyncStatus::Processed;
                    flipped += 1;
                }
            }
        }
        Ok(flipped)
    }

    async fn counts(&self, collection: &str) -> Result<StatusCounts> {
        let docs = self.docs.read().unwrap();
        let mut counts = StatusCounts::default();
        for ((c, _), r) in docs.iter() {
            if c != collection {
                continue;
            }
            match r.status {
                SyncStatus::Pending => counts.pending += 1,
                SyncStatus::Processed => counts.processed += 1,
            }
        }
        Ok(counts)
    }

    async fn collections(&self) -> Result<Vec<String>> {
        let docs = self.docs.read().unwrap();
        let names: BTreeSet<String> = docs.keys().map(|(c, _)| c.clone()).collect();
        Ok(names.into_iter().collect())
    }
}

/// Table sink holding rows keyed by their key column value.
pub struct InMemoryTableSink {
    table: String,
    key_index: usize,
    rows: RwLock<BTreeMap<String, Vec<SqlValue>>>,
    merges: RwLock<u64>,
    /// Key value that makes the whole batch fail.
    reject_key: RwLock<Option<String>>,
}

impl InMemoryTableSink {
    pub fn new(table: impl Into<String>, key_index: usize) -> Self {
        Self {
            table: table.into(),
            key_index,
            rows: RwLock::new(BTreeMap::new()),
            merges: RwLock::new(0),
            reject_key: RwLock::new(None),
        }
    }

    pub fn reject(&self, key: &str) {
        *self.reject_key.write().unwrap() = Some(key.to_string());
    }

    pub fn rows(&self) -> BTreeMap<String, Vec<SqlValue>> {
        self.rows.read().unwrap().clone()
    }

    /// Number of successful `merge_batch` calls.
    pub fn merges(&self) -> u64 {
        *self.merges.read().unwrap()
    }

    fn key_of(&self, row: &Row) -> Result<String> {
        match row.values.get(self.key_index) {
            Some(SqlValue::Text(s)) => Ok(s.clone()),
            Some(SqlValue::Integer(i)) => Ok(i.to_string()),
            other => Err(SyncError::BatchWrite {
                table: self.table.clone(),
                message: format!("row {} has unusable key {:?}", row.source_id, other),
            }),
        }
    }
}

#[async_trait]
impl TableSink for InMemoryTableSink {
    fn table(&self) -> &str {
        &self.table
    }

    async fn merge_batch(&self, rows: &[Row]) -> Result<()> {
        // validate everything first so a failure applies nothing
        let reject = self.reject_key.read().unwrap().clone();
        let mut keyed = Vec::with_capacity(rows.len());
        for row in rows {
            let key = self.key_of(row)?;
            if reject.as_deref() == Some(key.as_str()) {
                return Err(SyncError::BatchWrite {
                    table: self.table.clone(),
                    message: format!("constraint violated by {}", key),
                });
            }
            keyed.push((key, row.values.clone()));
        }
        let mut stored = self.rows.write().unwrap();
        stored.extend(keyed);
        *self.merges.write().unwrap() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Record;
    use serde_json::json;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn stored(id: &str, value: i64, t: i64) -> StoredRecord {
        StoredRecord::inserted(
            Record::from_value(json!({"_id": id, "value": value}), "_id").unwrap(),
            at(t),
        )
    }

    #[tokio::test]
    async fn upsert_keeps_creation_time() {
        let store = InMemoryDocumentStore::new();
        store.upsert("c", &stored("A1", 10, 100)).await.unwrap();
        store.upsert("c", &stored("A1", 11, 200)).await.unwrap();

        let r = store.find("c", "A1").await.unwrap().unwrap();
        assert_eq!(r.created_at, at(100));
        assert_eq!(r.updated_at, at(200));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn mark_processed_skips_newer_versions() {
        let store = InMemoryDocumentStore::new();
        store.upsert("c", &stored("A1", 10, 100)).await.unwrap();
        store.upsert("c", &stored("B2", 10, 100)).await.unwrap();
        store.upsert("c", &stored("B2", 12, 300)).await.unwrap();

        let flipped = store
            .mark_processed("c", &[("A1".into(), at(100)), ("B2".into(), at(100))])
            .await
            .unwrap();
        assert_eq!(flipped, 1);
        let counts = store.counts("c").await.unwrap();
        assert_eq!(counts, StatusCounts { pending: 1, processed: 1 });
    }

    #[tokio::test]
    async fn rejected_batch_applies_nothing() {
        let sink = InMemoryTableSink::new("T", 0);
        sink.reject("B");
        let rows = vec![
            Row {
                source_id: "A".into(),
                values: vec![SqlValue::Text("A".into())],
            },
            Row {
                source_id: "B".into(),
                values: vec![SqlValue::Text("B".into())],
            },
        ];
        assert!(sink.merge_batch(&rows).await.is_err());
        assert!(sink.rows().is_empty());
        assert_eq!(sink.merges(), 0);
    }
}
