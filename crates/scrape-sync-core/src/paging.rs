//! Offset/limit paging and stop policy for source scans.
//!
//! [`PageCursor`] is the pure state machine behind every paged scan: it
//! hands out [`PageRequest`]s, advances by the page size after each fetch,
//! and decides when the scan is over. The age-based stop condition needs
//! to know which records were already stored, so it is evaluated by the
//! pipeline driver through [`AgePolicy`] and fed back via
//! [`PageCursor::stop`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Classification, Record};
use crate::normalize::parse_timestamp;

/// Parameters of one page fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: u64,
    pub limit: u64,
}

/// Why a scan ended normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Scanned item count reached the configured maximum.
    MaxItems,
    /// The last page was shorter than requested; the source is exhausted.
    ShortPage,
    /// The oldest relevant record of the last page is past the age cutoff.
    AgeCutoff,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StopReason::MaxItems => "max items reached",
            StopReason::ShortPage => "source exhausted",
            StopReason::AgeCutoff => "age cutoff reached",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct PageCursor {
    offset: u64,
    page_size: u64,
    max_items: u64,
    scanned: u64,
    pages: u64,
    stopped: Option<StopReason>,
}

impl PageCursor {
    /// `page_size` and `max_items` must be positive; the config loader
    /// enforces this.
    pub fn new(offset: u64, page_size: u64, max_items: u64) -> Self {
        Self {
            offset,
            page_size: page_size.max(1),
            max_items,
            scanned: 0,
            pages: 0,
            stopped: if max_items == 0 {
                Some(StopReason::MaxItems)
            } else {
                None
            },
        }
    }

    pub fn next_request(&self) -> Option<PageRequest> {
        if self.stopped.is_some() {
            return None;
        }
        Some(PageRequest {
            offset: self.offset,
            limit: self.page_size,
        })
    }

    /// Record that a page of `fetched` items came back.
    pub fn advance(&mut self, fetched: u64) {
        if self.stopped.is_some() {
            return;
        }
        self.offset += self.page_size;
        self.scanned += fetched;
        self.pages += 1;
        if fetched < self.page_size {
            self.stopped = Some(StopReason::ShortPage);
        } else if self.scanned >= self.max_items {
            self.stopped = Some(StopReason::MaxItems);
        }
    }

    /// End the scan early. The first recorded reason wins.
    pub fn stop(&mut self, reason: StopReason) {
        self.stopped.get_or_insert(reason);
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stopped
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn scanned(&self) -> u64 {
        self.scanned
    }

    pub fn pages(&self) -> u64 {
        self.pages
    }
}

/// Which records of a page count toward the age cutoff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgeBasis {
    /// Only records that were already stored (updated or unchanged).
    #[default]
    Existing,
    /// Every record on the page.
    All,
}

/// Stop a newest-first scan once it has reached far enough back in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgePolicy {
    pub max_age_days: i64,
    /// Payload field holding the record's timestamp.
    pub field: String,
    pub basis: AgeBasis,
}

impl AgePolicy {
    /// The record's timestamp, if the record counts toward the cutoff.
    pub fn timestamp_of(
        &self,
        record: &Record,
        class: &Classification,
    ) -> Option<DateTime<Utc>> {
        if self.basis == AgeBasis::Existing && !class.was_stored() {
            return None;
        }
        record.payload.get(&self.field).and_then(parse_timestamp)
    }

    /// Whether a page whose oldest relevant record is `oldest` ends the scan.
    pub fn is_past_cutoff(&self, oldest: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match oldest {
            Some(ts) => (now - ts).num_days() >= self.max_age_days,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn drain(cursor: &mut PageCursor, source_len: u64) -> Vec<PageRequest> {
        let mut requests = Vec::new();
        while let Some(req) = cursor.next_request() {
            requests.push(req);
            let remaining = source_len.saturating_sub(req.offset);
            cursor.advance(remaining.min(req.limit));
        }
        requests
    }

    #[test]
    fn short_last_page_stops_scan() {
        let mut cursor = PageCursor::new(0, 40, 999_999);
        let requests = drain(&mut cursor, 95);
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[2], PageRequest { offset: 80, limit: 40 });
        assert_eq!(cursor.scanned(), 95);
        assert_eq!(cursor.stop_reason(), Some(StopReason::ShortPage));
    }

    #[test]
    fn max_items_equal_to_source_len_stops_after_ceil_pages() {
        for (n, p) in [(80u64, 40u64), (95, 40), (1, 10), (100, 7)] {
            let mut cursor = PageCursor::new(0, p, n);
            let requests = drain(&mut cursor, n);
            assert_eq!(requests.len() as u64, n.div_ceil(p), "n={} p={}", n, p);
            assert_eq!(cursor.scanned(), n);
        }
    }

    #[test]
    fn exact_multiple_stops_on_max_items() {
        let mut cursor = PageCursor::new(0, 40, 80);
        drain(&mut cursor, 1_000);
        assert_eq!(cursor.stop_reason(), Some(StopReason::MaxItems));
        assert_eq!(cursor.offset(), 80);
    }

    #[test]
    fn starts_from_configured_offset() {
        let mut cursor = PageCursor::new(120, 40, 40);
        assert_eq!(cursor.next_request().unwrap().offset, 120);
        cursor.advance(40);
        assert!(cursor.next_request().is_none());
    }

    #[test]
    fn first_stop_reason_wins() {
        let mut cursor = PageCursor::new(0, 10, 100);
        cursor.stop(StopReason::AgeCutoff);
        cursor.advance(3);
        assert_eq!(cursor.stop_reason(), Some(StopReason::AgeCutoff));
        assert_eq!(cursor.pages(), 0);
    }

    #[test]
    fn age_policy_ignores_new_records_by_default() {
        let policy = AgePolicy {
            max_age_days: 4,
            field: "updated_at".into(),
            basis: AgeBasis::Existing,
        };
        let now = DateTime::parse_from_rfc3339("2024-05-10T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let old = Record::from_value(json!({"_id": "1", "updated_at": "2024-05-01T00:00:00Z"}), "_id").unwrap();
        let recent = Record::from_value(json!({"_id": "2", "updated_at": "2024-05-09T00:00:00Z"}), "_id").unwrap();
        let page = [
            (&old, Classification::Inserted),
            (&recent, Classification::Unchanged),
        ];
        let oldest_of = |policy: &AgePolicy| {
            page.iter()
                .filter_map(|(r, c)| policy.timestamp_of(r, c))
                .min()
        };

        assert!(!policy.is_past_cutoff(oldest_of(&policy), now));

        let all = AgePolicy {
            basis: AgeBasis::All,
            ..policy.clone()
        };
        assert!(all.is_past_cutoff(oldest_of(&all), now));
        assert!(!all.is_past_cutoff(None, now));
    }
}
