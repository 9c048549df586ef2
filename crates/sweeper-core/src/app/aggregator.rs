//! Outcome aggregation.

use std::time::Duration;

use crate::domain::{OutcomeStatus, ProcessResult, ReprocessOutcome};

/// pass の結果をまとめる（副作用なし）
pub fn aggregate(pending: usize, claimed: usize, processed: usize, elapsed: Duration) -> ProcessResult {
    debug_assert!(claimed <= pending, "claimed {claimed} > pending {pending}");
    debug_assert!(processed <= claimed, "processed {processed} > claimed {claimed}");
    ProcessResult {
        pending,
        claimed,
        processed,
        time_taken_secs: elapsed.as_secs_f64(),
    }
}

/// Per-status breakdown, for the pass summary log line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeTally {
    pub processed: usize,
    pub missing_key: usize,
    pub write_failed: usize,
    pub ack_failed: usize,
    pub aborted: usize,
}

impl OutcomeTally {
    /// outcome を status ごとに数える
    pub fn from_outcomes(outcomes: &[ReprocessOutcome]) -> Self {
        outcomes.iter().fold(Self::default(), |mut tally, outcome| {
            match outcome.status {
                OutcomeStatus::Processed => tally.processed += 1,
                OutcomeStatus::MissingKey => tally.missing_key += 1,
                OutcomeStatus::WriteFailed => tally.write_failed += 1,
                OutcomeStatus::AckFailed => tally.ack_failed += 1,
                OutcomeStatus::Aborted => tally.aborted += 1,
            }
            tally
        })
    }

    /// Processed 以外の件数
    pub fn failed(&self) -> usize {
        self.missing_key + self.write_failed + self.ack_failed + self.aborted
    }
}
