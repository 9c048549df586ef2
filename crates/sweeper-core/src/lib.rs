//! sweeper-core
//!
//! Recovery sweeper for consumer-group streams: finds entries that were
//! delivered but never acknowledged, claims the ones idle past a threshold for
//! a recovery consumer, rewrites their side-index record and acknowledges them.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（EntryId, StreamEntry, PendingRecord, ProcessResult, …）
//! - **ports**: 抽象化レイヤー（StreamGateway, Clock, IdGenerator）
//! - **app**: 1 回分の pass（scan → claim → reprocess → aggregate）
//! - **impls**: StreamGateway の実装（InMemoryStreamStore, RedisStreamGateway）
//! - **config** / **error**: 設定とエラー型

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;

pub use app::{Sweeper, SweeperBuilder};
pub use config::SweepConfig;
pub use domain::ProcessResult;
pub use error::{EntryError, GatewayError, SweepError};

/// `ConnectionInfo` などを呼び出し側から使えるように再公開
pub use redis;
