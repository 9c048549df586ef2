//! Ports - 抽象化レイヤー
//!
//! 外部システム（ストリームストア、時計、ID 採番）へのインターフェース。
//! app 層はこの trait だけに依存する。

pub mod clock;
pub mod gateway;
pub mod id_generator;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::gateway::StreamGateway;
pub use self::id_generator::{IdGenerator, UlidGenerator};
