//! Per-run progress counters.

use serde::Serialize;

use crate::models::Classification;

/// Monotonic counts for one pipeline run. A fresh value is created per run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressCounters {
    pub total: u64,
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
    /// Records that could not be parsed or written.
    pub failed: u64,
}

impl ProgressCounters {
    pub fn record(&mut self, class: &Classification) {
        match class {
            Classification::Inserted => self.inserted += 1,
            Classification::Updated { .. } => self.updated += 1,
            Classification::Unchanged => self.unchanged += 1,
        }
    }

    /// Counter name/value pairs in display order.
    pub fn entries(&self) -> [(&'static str, u64); 5] {
        [
            ("Total", self.total),
            ("Inserted", self.inserted),
            ("Updated", self.updated),
            ("Unchanged", self.unchanged),
            ("Failed", self.failed),
        ]
    }

    /// Records whose stored form changed during the run.
    pub fn written(&self) -> u64 {
        self.inserted + self.updated
    }
}

impl std::fmt::Display for ProgressCounters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, (name, n)) in self.entries().iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{} {}", name, n)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_lists_counters_in_order() {
        let mut c = ProgressCounters {
            total: 3,
            ..Default::default()
        };
        c.record(&Classification::Inserted);
        c.record(&Classification::Unchanged);
        c.record(&Classification::Unchanged);
        assert_eq!(
            c.to_string(),
            "Total 3 | Inserted 1 | Updated 0 | Unchanged 2 | Failed 0"
        );
        assert_eq!(c.written(), 1);
    }
}
