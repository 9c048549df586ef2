//! Sweeper - 1 回分のスイープ（pass）
//!
//! ```text
//! START → SCAN → [pending=0 → DONE(zero result)]
//!              → [pending>0] → CLAIM
//! CLAIM → [claimed=0 → DONE(pending only)]
//!       → [claimed>0] → REPROCESS → DONE(full result)
//! SCAN/CLAIM error → DONE(error)
//! ```
//!
//! pass は状態を持ち越さない。未処理の仕事は store の pending list がそのまま表す。

use std::future::Future;
use std::sync::Arc;

use tokio::time::{Instant, timeout_at};
use tracing::{Instrument, info, info_span, warn};

use super::{
    IdleClaimCoordinator, OutcomeTally, PendingScanner, Reprocessor, SweeperBuilder, aggregate,
};
use crate::config::SweepConfig;
use crate::domain::ProcessResult;
use crate::error::{Stage, SweepError};
use crate::ports::{IdGenerator, StreamGateway};

/// Sweeper は scan → claim → reprocess → aggregate をつなぐ
///
/// # 使用例
/// ```ignore
/// let sweeper = Sweeper::builder(config)
///     .gateway(Arc::new(gateway))
///     .build()?;
/// let result = sweeper.run_pass().await?;
/// ```
pub struct Sweeper {
    config: SweepConfig,
    ids: Arc<dyn IdGenerator>,
    scanner: PendingScanner,
    coordinator: IdleClaimCoordinator,
    reprocessor: Reprocessor,
}

impl Sweeper {
    /// SweeperBuilder を作成
    pub fn builder(config: SweepConfig) -> SweeperBuilder {
        SweeperBuilder::new(config)
    }

    /// Wires the components. `config` must already be validated.
    pub(crate) fn from_parts(
        config: SweepConfig,
        gateway: Arc<dyn StreamGateway>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        let scanner = PendingScanner::new(Arc::clone(&gateway), config.call_timeout);
        let coordinator = IdleClaimCoordinator::new(Arc::clone(&gateway), config.call_timeout);
        let reprocessor = Reprocessor::new(
            gateway,
            &config.stream,
            &config.group,
            config.index_key.clone(),
            config.max_in_flight,
            config.call_timeout,
        );
        Self {
            config,
            ids,
            scanner,
            coordinator,
            reprocessor,
        }
    }

    /// 検証済みの設定
    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Runs one full pass.
    pub async fn run_pass(&self) -> Result<ProcessResult, SweepError> {
        let pass_id = self.ids.generate_pass_id();
        let span = info_span!(
            "sweep_pass",
            %pass_id,
            stream = %self.config.stream,
            group = %self.config.group,
        );
        async {
            self.pass().await.inspect_err(|err| {
                warn!(kind = err.kind(), error = %err, "pass aborted");
            })
        }
        .instrument(span)
        .await
    }

    async fn pass(&self) -> Result<ProcessResult, SweepError> {
        let config = &self.config;
        let deadline = Instant::now() + config.pass_timeout;

        let scan = self
            .before_deadline(
                deadline,
                Stage::Scan,
                self.scanner
                    .scan(&config.stream, &config.group, config.scan_limit),
            )
            .await?;
        info!(pending = scan.observed(), "pending entries");

        if scan.is_empty() {
            return Ok(ProcessResult::empty());
        }
        let pending = scan.observed();

        let claimed = self
            .before_deadline(
                deadline,
                Stage::Claim,
                self.coordinator.claim(
                    &config.stream,
                    &config.group,
                    &config.consumer,
                    config.min_idle,
                    &scan.claim_batch(),
                ),
            )
            .await?;

        if claimed.is_empty() {
            info!(
                min_idle_secs = config.min_idle.as_secs(),
                "no entries idle long enough to claim"
            );
            return Ok(ProcessResult::pending_only(pending));
        }

        let claimed_count = claimed.len();
        info!(
            claimed = claimed_count,
            consumer = %config.consumer,
            "claimed idle entries; reprocessing"
        );

        let report = self.reprocessor.reprocess(claimed, deadline).await;
        let tally = OutcomeTally::from_outcomes(&report.outcomes);
        let result = aggregate(pending, claimed_count, report.processed(), report.elapsed);

        info!(
            processed = result.processed,
            failed = tally.failed(),
            missing_key = tally.missing_key,
            write_failed = tally.write_failed,
            ack_failed = tally.ack_failed,
            aborted = tally.aborted,
            elapsed_secs = result.time_taken_secs,
            "finished processing claimed batch"
        );

        Ok(result)
    }

    async fn before_deadline<T>(
        &self,
        deadline: Instant,
        stage: Stage,
        step: impl Future<Output = Result<T, SweepError>>,
    ) -> Result<T, SweepError> {
        timeout_at(deadline, step).await.unwrap_or_else(|_| {
            Err(SweepError::Timeout {
                stage,
                after: self.config.pass_timeout,
            })
        })
    }
}
