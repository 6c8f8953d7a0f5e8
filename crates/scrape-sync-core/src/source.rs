//! Paged record sources.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Result, SyncError};
use crate::paging::PageRequest;

/// A source that serves records by offset and limit.
///
/// Implementations return raw JSON items; turning them into
/// [`Record`](crate::models::Record)s is the pipeline's job so that a bad
/// item is counted rather than failing the page.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Label used in progress output (e.g. `"activity:lina"`).
    fn label(&self) -> &str;

    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<Value>>;
}

/// Serves a fixed list of items. Records every request it receives.
pub struct InMemorySource {
    label: String,
    items: Vec<Value>,
    requests: Mutex<Vec<PageRequest>>,
    fail_at_offset: Option<u64>,
}

impl InMemorySource {
    pub fn new(label: impl Into<String>, items: Vec<Value>) -> Self {
        Self {
            label: label.into(),
            items,
            requests: Mutex::new(Vec::new()),
            fail_at_offset: None,
        }
    }

    /// Answer the request at `offset` with a 503.
    pub fn failing_at(mut self, offset: u64) -> Self {
        self.fail_at_offset = Some(offset);
        self
    }

    pub fn requests(&self) -> Vec<PageRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageSource for InMemorySource {
    fn label(&self) -> &str {
        &self.label
    }

    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<Value>> {
        self.requests.lock().unwrap().push(*request);
        if self.fail_at_offset == Some(request.offset) {
            return Err(SyncError::Status {
                status: 503,
                body: "unavailable".into(),
            });
        }
        Ok(self
            .items
            .iter()
            .skip(request.offset as usize)
            .take(request.limit as usize)
            .cloned()
            .collect())
    }
}
