//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: Clock の時刻 + 乱数で ULID を作る

use crate::domain::PassId;
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は pass ごとの ID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（Sweeper を複数リクエストで共有する）
pub trait IdGenerator: Send + Sync {
    fn generate_pass_id(&self) -> PassId;
}

/// ULID generator driven by a [`Clock`], so a `FixedClock` gives a
/// deterministic timestamp part.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    /// 新しい UlidGenerator を作成
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_pass_id(&self) -> PassId {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        PassId::from(ulid)
    }
}
