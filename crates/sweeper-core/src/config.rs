//! Sweep configuration.
//!
//! The binary fills this from flags / environment; the library only
//! validates it.

use std::time::Duration;

use thiserror::Error;

use crate::domain::IndexKeyPolicy;

/// SweepConfig は 1 回の pass の設定
///
/// `new()` で必須項目を設定し、残りは `with_*` で上書きする。
/// 値の検証は `validate()`（SweeperBuilder::build() からも呼ばれる）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepConfig {
    pub stream: String,
    pub group: String,

    /// Consumer that claimed entries are reassigned to.
    pub consumer: String,

    /// Entries idle for less than this are left with their current owner.
    pub min_idle: Duration,

    pub index_key: IndexKeyPolicy,

    /// Upper bound on concurrently running reprocess tasks.
    pub max_in_flight: usize,

    /// Deadline for each individual store call.
    pub call_timeout: Duration,

    /// Deadline for the whole pass.
    pub pass_timeout: Duration,

    /// Cap on how many pending records one scan reads. `None` reads all.
    pub scan_limit: Option<usize>,
}

/// ConfigError は設定値の検証エラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("max_in_flight must be at least 1")]
    NoConcurrency,

    #[error("scan_limit must be at least 1 when set")]
    ZeroScanLimit,

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),
}

impl SweepConfig {
    /// 同時に再処理するエントリ数の既定値
    pub const DEFAULT_MAX_IN_FLIGHT: usize = 64;
    /// store 呼び出し 1 回あたりの既定タイムアウト
    pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);
    /// pass 全体の既定タイムアウト
    pub const DEFAULT_PASS_TIMEOUT: Duration = Duration::from_secs(60);

    /// Config with defaults for everything but the stream coordinates.
    pub fn new(
        stream: impl Into<String>,
        group: impl Into<String>,
        consumer: impl Into<String>,
        min_idle: Duration,
    ) -> Self {
        Self {
            stream: stream.into(),
            group: group.into(),
            consumer: consumer.into(),
            min_idle,
            index_key: IndexKeyPolicy::default(),
            max_in_flight: Self::DEFAULT_MAX_IN_FLIGHT,
            call_timeout: Self::DEFAULT_CALL_TIMEOUT,
            pass_timeout: Self::DEFAULT_PASS_TIMEOUT,
            scan_limit: None,
        }
    }

    /// index key の組み立て方を設定
    pub fn with_index_key(mut self, index_key: IndexKeyPolicy) -> Self {
        self.index_key = index_key;
        self
    }

    /// 同時実行数の上限を設定（1 以上）
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    /// store 呼び出しごとのタイムアウトを設定
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// pass 全体のタイムアウトを設定
    pub fn with_pass_timeout(mut self, pass_timeout: Duration) -> Self {
        self.pass_timeout = pass_timeout;
        self
    }

    /// 1 回の pass で読む pending record の上限を設定（`None` は無制限）
    pub fn with_scan_limit(mut self, scan_limit: Option<usize>) -> Self {
        self.scan_limit = scan_limit;
        self
    }

    /// 設定値を検証
    ///
    /// # 検証
    /// - stream / group / consumer が空でない
    /// - max_in_flight が 1 以上
    /// - タイムアウトが 0 でない、scan_limit が 0 でない
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("stream", &self.stream),
            ("group", &self.group),
            ("consumer", &self.consumer),
            ("index key field", &self.index_key.field),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Empty(name));
            }
        }
        if self.max_in_flight == 0 {
            return Err(ConfigError::NoConcurrency);
        }
        if self.scan_limit == Some(0) {
            return Err(ConfigError::ZeroScanLimit);
        }
        if self.call_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout("call_timeout"));
        }
        if self.pass_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout("pass_timeout"));
        }
        Ok(())
    }
}
