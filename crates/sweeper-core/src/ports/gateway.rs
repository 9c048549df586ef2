//! StreamGateway port - ストリームストアへの入口
//!
//! sweeper が必要とする操作だけを切り出したもの。
//! 本番は Redis、テストは InMemoryStreamStore が実装する。

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{EntryId, Fields, IdRange, PendingRecord, PendingSummary, StreamEntry};
use crate::error::GatewayError;

/// Operations against the stream store used by one sweep pass.
///
/// # 設計原則
/// - 1 メソッド = store への 1 round trip
/// - タイムアウトは呼び出し側（app 層）が付ける
/// - `Send + Sync`: reprocess の各タスクから `Arc<dyn StreamGateway>` で共有する
#[async_trait]
pub trait StreamGateway: Send + Sync {
    /// Total number of pending entries for `group`.
    async fn pending_summary(&self, stream: &str, group: &str)
    -> Result<PendingSummary, GatewayError>;

    /// Pending entries within `range`, oldest first, at most `limit`.
    async fn pending_details(
        &self,
        stream: &str,
        group: &str,
        range: IdRange,
        limit: usize,
    ) -> Result<Vec<PendingRecord>, GatewayError>;

    /// Reassigns the listed entries to `consumer` if idle for at least
    /// `min_idle`. Returns only the entries actually reassigned.
    async fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        ids: &[EntryId],
    ) -> Result<Vec<StreamEntry>, GatewayError>;

    /// Writes `fields` into the side-index under `key`, overwriting fields
    /// already present.
    async fn write_index_record(&self, key: &str, fields: &Fields) -> Result<(), GatewayError>;

    /// Acknowledges one entry for `group`.
    async fn acknowledge(&self, stream: &str, group: &str, id: EntryId)
    -> Result<(), GatewayError>;
}
