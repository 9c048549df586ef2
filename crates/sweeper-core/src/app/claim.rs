//! IdleClaimCoordinator - idle なエントリの所有権移譲
//!
//! scan で見えた候補全体を 1 回の bulk claim で recovery consumer に移す。
//! min_idle の判定は store 側がエントリ単位で原子的に行う。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::store_call;
use crate::domain::{ClaimBatch, StreamEntry};
use crate::error::{Stage, SweepError};
use crate::ports::StreamGateway;

/// IdleClaimCoordinator は idle なエントリを recovery consumer に claim する
///
/// 1 回の pass につき claim は 1 回（まとめて送る）。
pub struct IdleClaimCoordinator {
    gateway: Arc<dyn StreamGateway>,
    call_timeout: Duration,
}

impl IdleClaimCoordinator {
    /// 新しい IdleClaimCoordinator を作成
    pub fn new(gateway: Arc<dyn StreamGateway>, call_timeout: Duration) -> Self {
        Self {
            gateway,
            call_timeout,
        }
    }

    /// Claims whatever part of `batch` has been idle for at least `min_idle`.
    ///
    /// The result only contains entries from `batch`, each at most once, in
    /// the order the store returned them.
    pub async fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        batch: &ClaimBatch,
    ) -> Result<Vec<StreamEntry>, SweepError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let returned = store_call(
            Stage::Claim,
            self.call_timeout,
            self.gateway
                .claim(stream, group, consumer, min_idle, batch.ids()),
        )
        .await?;

        let returned_len = returned.len();
        let mut seen = HashSet::with_capacity(returned_len);
        let claimed: Vec<StreamEntry> = returned
            .into_iter()
            .filter(|entry| batch.contains(entry.id()) && seen.insert(entry.id()))
            .collect();

        if claimed.len() != returned_len {
            warn!(
                returned = returned_len,
                kept = claimed.len(),
                "claim returned entries outside the candidate set; dropped them"
            );
        }
        debug!(
            candidates = batch.len(),
            claimed = claimed.len(),
            "claim finished"
        );

        Ok(claimed)
    }
}
