//! SweeperBuilder - Sweeper の構築とワイヤリング
//!
//! # Fail-fast 設計
//! - build() 時に SweepConfig を検証する
//! - gateway が無ければ BuildError

use std::sync::Arc;

use super::Sweeper;
use crate::config::{ConfigError, SweepConfig};
use crate::ports::{IdGenerator, StreamGateway, SystemClock, UlidGenerator};

/// # 使用例
/// ```ignore
/// let sweeper = Sweeper::builder(config)
///     .gateway(Arc::new(RedisStreamGateway::connect(url).await?))
///     .build()?;
/// let result = sweeper.run_pass().await?;
/// ```
pub struct SweeperBuilder {
    config: SweepConfig,
    gateway: Option<Arc<dyn StreamGateway>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

/// BuildError は Sweeper 構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no stream gateway configured")]
    MissingGateway,

    #[error("invalid sweep config: {0}")]
    Config(#[from] ConfigError),
}

impl SweeperBuilder {
    /// 新しい SweeperBuilder を作成
    pub fn new(config: SweepConfig) -> Self {
        Self {
            config,
            gateway: None,
            ids: None,
        }
    }

    /// StreamGateway を設定（必須）
    pub fn gateway(mut self, gateway: Arc<dyn StreamGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Defaults to a ULID generator on the system clock.
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// SweeperBuilder を構築して Sweeper を生成
    ///
    /// # 検証
    /// - gateway が設定されているか（なければ BuildError::MissingGateway）
    /// - SweepConfig::validate() が通るか
    pub fn build(self) -> Result<Sweeper, BuildError> {
        self.config.validate()?;
        let gateway = self.gateway.ok_or(BuildError::MissingGateway)?;
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(SystemClock)));
        Ok(Sweeper::from_parts(self.config, gateway, ids))
    }
}
