//! PendingScanner - 未 ack エントリの列挙
//!
//! # フロー
//! 1. pending_summary で件数だけ取得（0 ならここで終わり）
//! 2. pending_details で `- +` の全範囲を件数分だけ取得

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::store_call;
use crate::domain::{ClaimBatch, IdRange, PendingRecord};
use crate::error::{Stage, SweepError};
use crate::ports::StreamGateway;

/// What one scan observed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingScan {
    /// Count reported by the summary query.
    pub count: usize,

    /// Details, oldest first, never more than `count`.
    pub records: Vec<PendingRecord>,
}

impl PendingScan {
    /// Nothing left to claim in this pass.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Pending count reported for the pass.
    pub fn observed(&self) -> usize {
        self.records.len()
    }

    /// scan 結果から claim 対象の ID 集合を作る
    pub fn claim_batch(&self) -> ClaimBatch {
        ClaimBatch::from_records(&self.records)
    }
}

/// PendingScanner は pending list を読む
///
/// 件数（summary）→ 詳細（details）の 2 回の呼び出しで 1 回分の scan。
pub struct PendingScanner {
    gateway: Arc<dyn StreamGateway>,
    call_timeout: Duration,
}

impl PendingScanner {
    /// 新しい PendingScanner を作成
    pub fn new(gateway: Arc<dyn StreamGateway>, call_timeout: Duration) -> Self {
        Self {
            gateway,
            call_timeout,
        }
    }

    /// pending list を読み、ID 順に並べて返す
    ///
    /// 件数が 0 なら details は呼ばない。
    pub async fn scan(
        &self,
        stream: &str,
        group: &str,
        scan_limit: Option<usize>,
    ) -> Result<PendingScan, SweepError> {
        let summary = store_call(
            Stage::Scan,
            self.call_timeout,
            self.gateway.pending_summary(stream, group),
        )
        .await?;

        if summary.count == 0 {
            return Ok(PendingScan::default());
        }

        let limit = scan_limit.map_or(summary.count, |cap| cap.min(summary.count));
        let mut records = store_call(
            Stage::Scan,
            self.call_timeout,
            self.gateway
                .pending_details(stream, group, IdRange::full(), limit),
        )
        .await?;

        // store は昇順で返すはずだが、件数上限と一意性はここで保証する
        records.sort_by_key(|r| r.id);
        records.dedup_by_key(|r| r.id);
        records.truncate(limit);

        debug!(
            count = summary.count,
            listed = records.len(),
            "pending entries scanned"
        );

        Ok(PendingScan {
            count: summary.count,
            records,
        })
    }
}
