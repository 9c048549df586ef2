//! Impls - StreamGateway の実装
//!
//! - **InMemoryStreamStore**: テスト・ローカル動作確認用
//! - **RedisStreamGateway**: 本番用（Redis Streams）

pub mod memory;
pub mod redis_store;

pub use self::memory::InMemoryStreamStore;
pub use self::redis_store::{RedisStreamGateway, connection_info};
