//! App - アプリケーション層
//!
//! ports を組み合わせて 1 回分のスイープを実装します。
//!
//! # 主要コンポーネント
//! - **PendingScanner**: pending list の件数と詳細を取得
//! - **IdleClaimCoordinator**: idle なエントリを recovery consumer に claim
//! - **Reprocessor**: claim したエントリを index に書いて ack（並行）
//! - **aggregate**: 結果を ProcessResult にまとめる
//! - **Sweeper / SweeperBuilder**: 上記をつなぐ pass 全体

pub mod aggregator;
pub mod builder;
pub mod claim;
pub mod reprocessor;
pub mod scanner;
pub mod sweeper;

pub use self::aggregator::{OutcomeTally, aggregate};
pub use self::builder::{BuildError, SweeperBuilder};
pub use self::claim::IdleClaimCoordinator;
pub use self::reprocessor::{ReprocessReport, Reprocessor};
pub use self::scanner::{PendingScan, PendingScanner};
pub use self::sweeper::Sweeper;

use std::future::Future;
use std::time::Duration;

use crate::error::{GatewayError, Stage, SweepError};

/// Runs a pass-level store call under `limit`, mapping failures to
/// [`SweepError`].
pub(crate) async fn store_call<T>(
    stage: Stage,
    limit: Duration,
    call: impl Future<Output = Result<T, GatewayError>>,
) -> Result<T, SweepError> {
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(SweepError::from_gateway(stage, err)),
        Err(_) => Err(SweepError::Timeout {
            stage,
            after: limit,
        }),
    }
}
