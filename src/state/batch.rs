//! Batch planning and per-page results

use std::ops::RangeInclusive;

/// Index of a page within a job's stream (0- or 1-based per job)
pub type PageIndex = u64;

/// A single extracted record
///
/// The engine never looks inside a record; it only aggregates and forwards it.
pub type Record = serde_json::Value;

/// A contiguous, inclusive range of pages dispatched concurrently
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlan {
    /// First page of the batch
    pub start: PageIndex,
    /// Last page of the batch (inclusive)
    pub end: PageIndex,
}

impl BatchPlan {
    /// Plans the batch that starts at `start`
    ///
    /// The batch holds up to `batch_size` pages and never extends past
    /// `last_page`. Returns `None` when `start` is already beyond the range.
    /// A batch size of zero is treated as one.
    pub fn next(start: PageIndex, last_page: PageIndex, batch_size: usize) -> Option<Self> {
        if start > last_page {
            return None;
        }

        let size = batch_size.max(1) as u64;
        let end = start.saturating_add(size - 1).min(last_page);
        Some(Self { start, end })
    }

    /// Returns the pages covered by this batch
    pub fn pages(&self) -> RangeInclusive<PageIndex> {
        self.start..=self.end
    }

    /// Returns the number of pages in this batch
    pub fn len(&self) -> usize {
        (self.end - self.start + 1) as usize
    }

    /// A planned batch always holds at least one page
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Partitions `[start, last_page]` into consecutive batches
///
/// Used for dry runs and reporting; the scheduler itself replans from the
/// checkpoint before every batch.
pub fn plan_batches(start: PageIndex, last_page: PageIndex, batch_size: usize) -> Vec<BatchPlan> {
    let mut plans = Vec::new();
    let mut cursor = start;

    while let Some(plan) = BatchPlan::next(cursor, last_page, batch_size) {
        plans.push(plan);
        match plan.end.checked_add(1) {
            Some(next) => cursor = next,
            None => break,
        }
    }

    plans
}

/// Records extracted from one successfully fetched page
#[derive(Debug, Clone, PartialEq)]
pub struct PageResult {
    /// The page the records came from
    pub page: PageIndex,

    /// Extracted records, possibly none
    pub records: Vec<Record>,

    /// True when the page was fetched and parsed but held no data
    pub empty: bool,
}

impl PageResult {
    /// Creates a page result, deriving `empty` from the records
    pub fn new(page: PageIndex, records: Vec<Record>) -> Self {
        let empty = records.is_empty();
        Self {
            page,
            records,
            empty,
        }
    }
}
