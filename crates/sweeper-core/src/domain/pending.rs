//! Pending-entry list views.
//!
//! どちらも scan のたびに再計算される一時的な値で、sweeper 側では永続化しない。

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::EntryId;

/// Summary form of the pending list: only the total count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSummary {
    pub count: usize,
}

/// One delivered-but-unacknowledged entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRecord {
    pub id: EntryId,

    /// Consumer currently owning the entry.
    pub consumer: String,

    /// Time since the last delivery to `consumer`.
    pub idle: Duration,

    /// How many times the entry has been delivered (claims included).
    pub delivery_count: u64,
}

/// Id range for a pending-details query. `None` is the open end (`-` / `+`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdRange {
    pub start: Option<EntryId>,
    pub end: Option<EntryId>,
}

impl IdRange {
    /// The whole pending list, oldest first.
    pub fn full() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.start.is_none_or(|s| id >= s) && self.end.is_none_or(|e| id <= e)
    }

    /// Textual start bound as the store expects it.
    pub fn start_arg(&self) -> String {
        self.start.map_or_else(|| "-".to_string(), |id| id.to_string())
    }

    /// Textual end bound as the store expects it.
    pub fn end_arg(&self) -> String {
        self.end.map_or_else(|| "+".to_string(), |id| id.to_string())
    }
}

/// Entry ids selected for reassignment in one pass.
///
/// Sorted and free of duplicates, so membership is a binary search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimBatch {
    ids: Vec<EntryId>,
}

impl ClaimBatch {
    /// pending record の ID を昇順・重複なしで集める
    pub fn from_records(records: &[PendingRecord]) -> Self {
        let mut ids: Vec<EntryId> = records.iter().map(|r| r.id).collect();
        ids.sort_unstable();
        ids.dedup();
        Self { ids }
    }

    pub fn ids(&self) -> &[EntryId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.ids.binary_search(&id).is_ok()
    }
}
