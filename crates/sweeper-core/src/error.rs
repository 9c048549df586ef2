use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Error reported by a [`StreamGateway`](crate::ports::StreamGateway).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Connectivity / authentication problem with the store.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store rejected or failed the command.
    #[error("store command failed: {0}")]
    Command(String),
}

impl GatewayError {
    /// 接続系のエラーかどうか
    pub fn is_unavailable(&self) -> bool {
        matches!(self, GatewayError::Unavailable(_))
    }
}

/// Pass stage, used to tag pass-level failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Scan,
    Claim,
    Reprocess,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Scan => "scan",
            Stage::Claim => "claim",
            Stage::Reprocess => "reprocess",
        })
    }
}

/// Failure that aborts a whole pass. No partial result is produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SweepError {
    #[error("stream store unavailable during {stage}: {message}")]
    StoreUnavailable { stage: Stage, message: String },

    #[error("pending scan failed: {0}")]
    ScanFailure(String),

    #[error("claim failed: {0}")]
    ClaimFailure(String),

    #[error("{stage} did not complete within {after:?}")]
    Timeout { stage: Stage, after: Duration },
}

impl SweepError {
    /// Maps a gateway error raised in `stage` to the pass-level taxonomy.
    pub fn from_gateway(stage: Stage, err: GatewayError) -> Self {
        match (err, stage) {
            (GatewayError::Unavailable(message), stage) => {
                SweepError::StoreUnavailable { stage, message }
            }
            (GatewayError::Command(message), Stage::Claim) => SweepError::ClaimFailure(message),
            (GatewayError::Command(message), _) => SweepError::ScanFailure(message),
        }
    }

    /// Stable machine-readable name, used in error responses.
    pub fn kind(&self) -> &'static str {
        match self {
            SweepError::StoreUnavailable { .. } => "store_unavailable",
            SweepError::ScanFailure(_) => "scan_failure",
            SweepError::ClaimFailure(_) => "claim_failure",
            SweepError::Timeout { .. } => "timeout",
        }
    }
}

/// Failure local to one claimed entry. Never aborts the pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryError {
    #[error("entry has no usable `{field}` field for the index key")]
    MissingKeyField { field: String },

    #[error("index write failed: {0}")]
    Write(GatewayError),

    #[error("index write timed out after {0:?}")]
    WriteTimeout(Duration),

    #[error("ack failed: {0}")]
    Ack(GatewayError),

    #[error("ack timed out after {0:?}")]
    AckTimeout(Duration),
}
