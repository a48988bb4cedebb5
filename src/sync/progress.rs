//! Progress tracking for import runs.
//!
//! This module provides the `ImportProgressTracker`, which is responsible
//! for counting what happened to every raw record during one run: fetched,
//! filtered by the watermark, skipped as a deposit or malformed record,
//! normalized into a warning entry, or imported. The orchestrator uses it to
//! log progress and to emit a final summary.

use tracing::info;

/// Service for tracking import progress
///
/// The tracker records per-run counts only; it holds no cross-run state.
#[derive(Debug, Clone, Default)]
pub struct ImportProgressTracker {
    /// Raw records returned by the fetch strategy
    fetched: usize,
    /// Records at or before the account watermark
    watermark_skipped: usize,
    /// Pure custody deposits, skipped entirely
    deposit_skipped: usize,
    /// Records that could not be minimally parsed
    malformed_skipped: usize,
    /// Entries recorded with the warning classification
    warnings: usize,
    /// Entries handed to the ledger writer
    normalized: usize,
    /// Markets or pages skipped after a fetch timeout
    pages_skipped: usize,
}

impl ImportProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_fetched(&mut self, count: usize) {
        self.fetched += count;
    }

    pub fn record_watermark_skip(&mut self) {
        self.watermark_skipped += 1;
    }

    pub fn record_deposit_skip(&mut self) {
        self.deposit_skipped += 1;
    }

    pub fn record_malformed_skip(&mut self) {
        self.malformed_skipped += 1;
    }

    pub fn record_warning(&mut self) {
        self.warnings += 1;
    }

    pub fn record_normalized(&mut self) {
        self.normalized += 1;
    }

    pub fn record_page_skip(&mut self) {
        self.pages_skipped += 1;
    }

    pub fn stats(&self) -> ImportStats {
        ImportStats {
            fetched: self.fetched,
            watermark_skipped: self.watermark_skipped,
            deposit_skipped: self.deposit_skipped,
            malformed_skipped: self.malformed_skipped,
            warnings: self.warnings,
            normalized: self.normalized,
            pages_skipped: self.pages_skipped,
        }
    }

    /// Log the final summary for this run.
    pub fn log_summary(&self) {
        info!("Import run finished: {}", self.stats().summary());
    }
}

/// Statistics about one import run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportStats {
    pub fetched: usize,
    pub watermark_skipped: usize,
    pub deposit_skipped: usize,
    pub malformed_skipped: usize,
    pub warnings: usize,
    pub normalized: usize,
    pub pages_skipped: usize,
}

impl ImportStats {
    /// Get a human-readable summary of the run statistics
    pub fn summary(&self) -> String {
        format!(
            "{} fetched, {} normalized ({} warnings), {} below watermark, {} deposits skipped, {} malformed{}",
            self.fetched,
            self.normalized,
            self.warnings,
            self.watermark_skipped,
            self.deposit_skipped,
            self.malformed_skipped,
            if self.pages_skipped == 0 {
                String::new()
            } else {
                format!(", {} pages skipped", self.pages_skipped)
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_accumulate_independently() {
        let mut tracker = ImportProgressTracker::new();
        tracker.record_fetched(5);
        tracker.record_watermark_skip();
        tracker.record_deposit_skip();
        tracker.record_normalized();
        tracker.record_normalized();
        tracker.record_warning();

        let stats = tracker.stats();
        assert_eq!(stats.fetched, 5);
        assert_eq!(stats.watermark_skipped, 1);
        assert_eq!(stats.deposit_skipped, 1);
        assert_eq!(stats.normalized, 2);
        assert_eq!(stats.warnings, 1);
    }

    #[test]
    fn summary_mentions_page_skips_only_when_present() {
        let mut tracker = ImportProgressTracker::new();
        tracker.record_fetched(1);
        assert!(!tracker.stats().summary().contains("pages skipped"));

        tracker.record_page_skip();
        assert!(tracker.stats().summary().contains("1 pages skipped"));
    }
}
