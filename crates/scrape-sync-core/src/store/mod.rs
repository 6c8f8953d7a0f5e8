//! Storage abstraction for the sync pipeline.
//!
//! Two destinations exist:
//!
//! | Trait | Write model | Failure model |
//! |-------|-------------|---------------|
//! | [`DocumentStore`] | one upsert per record | per record, best-effort |
//! | [`TableSink`] | one MERGE per batch | whole batch, atomic |
//!
//! Implementations must be `Send + Sync`; parallel account runs share a
//! store handle but never share counters or cursors.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::mapping::Row;
use crate::models::StoredRecord;

/// Status breakdown of one collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: u64,
    pub processed: u64,
}

impl StatusCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.processed
    }
}

/// Document store keyed by `(collection, id)`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find(&self, collection: &str, id: &str) -> Result<Option<StoredRecord>>;

    /// Insert or replace a record.
    ///
    /// Replacing keeps the stored `created_at`; payload, `updated_at` and
    /// status come from `record`.
    async fn upsert(&self, collection: &str, record: &StoredRecord) -> Result<()>;

    /// Up to `limit` pending records, oldest update first.
    async fn pending(&self, collection: &str, limit: u64) -> Result<Vec<StoredRecord>>;

    /// Flip pending records to processed.
    ///
    /// Each entry names a record and the `updated_at` of the version that
    /// was exported; a record updated since then is left pending. Returns
    /// the number of records flipped.
    async fn mark_processed(
        &self,
        collection: &str,
        versions: &[(String, DateTime<Utc>)],
    ) -> Result<u64>;

    async fn counts(&self, collection: &str) -> Result<StatusCounts>;

    /// Names of all collections holding at least one record.
    async fn collections(&self) -> Result<Vec<String>>;
}

/// Relational destination receiving whole batches.
#[async_trait]
pub trait TableSink: Send + Sync {
    /// Destination table name, for reporting.
    fn table(&self) -> &str;

    /// Update-if-present, insert-if-absent for every row, atomically.
    ///
    /// On error nothing from the batch is visible and the error is a
    /// [`SyncError::BatchWrite`](crate::error::SyncError::BatchWrite).
    async fn merge_batch(&self, rows: &[Row]) -> Result<()>;
}
