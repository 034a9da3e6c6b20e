//! Inclusive date-range filtering
//!
//! With both bounds set, a record survives only if its date is known and
//! inside `[start, end]`; undated records are dropped. With either bound
//! missing the filter passes everything through.

use crate::types::{DateRange, ReviewRecord};

#[derive(Debug, Clone, Copy, Default)]
pub struct DateFilter {
    range: DateRange,
}

impl DateFilter {
    pub fn new(range: DateRange) -> Self {
        Self { range }
    }

    pub fn range(&self) -> DateRange {
        self.range
    }

    pub fn is_active(&self) -> bool {
        self.range.is_active()
    }

    /// Whether a single record passes
    pub fn retains(&self, record: &ReviewRecord) -> bool {
        match self.range.bounds() {
            None => true,
            Some((start, end)) => record.date.is_some_and(|d| start <= d && d <= end),
        }
    }

    /// Keep the records that pass, preserving order
    pub fn apply(&self, records: Vec<ReviewRecord>) -> Vec<ReviewRecord> {
        if !self.is_active() {
            return records;
        }
        records.into_iter().filter(|r| self.retains(r)).collect()
    }

    /// Every dated record in the batch is newer than the window.
    ///
    /// Sites list newest first, so such a batch means the window has not
    /// been reached yet rather than that it has been passed.
    pub fn before_window(&self, records: &[ReviewRecord]) -> bool {
        let Some((_, end)) = self.range.bounds() else {
            return false;
        };
        let mut dated = records.iter().filter_map(|r| r.date).peekable();
        dated.peek().is_some() && dated.all(|d| d > end)
    }
}
