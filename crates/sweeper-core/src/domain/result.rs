//! ProcessResult: the one externally visible output of a pass.

use serde::{Deserialize, Serialize};

/// Summary of one pass.
///
/// Serialized with the field names callers already depend on:
/// `{"Pending":5,"Claimed":2,"Processed":2,"TimeTakenSecs":0.01}`.
/// `TimeTakenSecs` is left out when zero (no reprocessing happened).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProcessResult {
    pub pending: usize,
    pub claimed: usize,
    pub processed: usize,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub time_taken_secs: f64,
}

fn is_zero(secs: &f64) -> bool {
    *secs == 0.0
}

impl ProcessResult {
    /// Nothing was pending.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Entries were pending but none had been idle long enough to claim.
    pub fn pending_only(pending: usize) -> Self {
        Self {
            pending,
            ..Self::default()
        }
    }
}
