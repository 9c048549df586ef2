//! Per-entry reprocessing outcome.
//!
//! Outcomes stay inside the sweeper: only their aggregate reaches the caller.

use serde::{Deserialize, Serialize};

use super::EntryId;
use crate::error::EntryError;

/// How far an entry got through write-then-ack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Written and acknowledged.
    Processed,

    /// Key field missing; nothing was written or acknowledged.
    MissingKey,

    /// Index write failed (or timed out); not acknowledged.
    WriteFailed,

    /// Written, but the ack failed (or timed out). Still pending.
    AckFailed,

    /// The task did not finish (panicked or cut off by the pass deadline).
    Aborted,
}

impl From<&EntryError> for OutcomeStatus {
    fn from(err: &EntryError) -> Self {
        match err {
            EntryError::MissingKeyField { .. } => OutcomeStatus::MissingKey,
            EntryError::Write(_) | EntryError::WriteTimeout(_) => OutcomeStatus::WriteFailed,
            EntryError::Ack(_) | EntryError::AckTimeout(_) => OutcomeStatus::AckFailed,
        }
    }
}

/// ReprocessOutcome は 1 エントリ分の再処理結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReprocessOutcome {
    pub entry_id: EntryId,
    pub status: OutcomeStatus,
}

impl ReprocessOutcome {
    /// 書き込みと ack に成功
    pub fn processed(entry_id: EntryId) -> Self {
        Self {
            entry_id,
            status: OutcomeStatus::Processed,
        }
    }

    /// EntryError から status を決める
    pub fn failed(entry_id: EntryId, err: &EntryError) -> Self {
        Self {
            entry_id,
            status: err.into(),
        }
    }

    /// タスクが最後まで走らなかった（panic / deadline）
    pub fn aborted(entry_id: EntryId) -> Self {
        Self {
            entry_id,
            status: OutcomeStatus::Aborted,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == OutcomeStatus::Processed
    }
}
