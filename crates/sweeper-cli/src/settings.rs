//! Command-line / environment configuration.
//!
//! Environment names match the existing deployment (Azure Functions custom
//! handler), so the same app settings keep working.

use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use sweeper_core::SweepConfig;
use sweeper_core::domain::IndexKeyPolicy;
use sweeper_core::error::GatewayError;
use sweeper_core::impls::connection_info;
use sweeper_core::redis::ConnectionInfo;

use crate::logging::LogFormat;

#[derive(Debug, Parser)]
#[command(name = "sweeper", version, about = "Claims and reprocesses idle stream entries")]
pub struct Cli {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub sweep: SweepArgs,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the `/monitor` trigger endpoint; every request runs one pass.
    Serve {
        #[arg(long, env = "FUNCTIONS_CUSTOMHANDLER_PORT", default_value_t = 8080)]
        port: u16,
    },

    /// Run a single pass and print the result as JSON.
    Once,
}

#[derive(Debug, Args)]
pub struct StoreArgs {
    /// `host[:port]` of the Redis server.
    #[arg(long, env = "REDIS_HOST")]
    pub redis_host: String,

    #[arg(long, env = "REDIS_PASSWORD", hide_env_values = true)]
    pub redis_password: Option<String>,

    /// Connect with TLS.
    #[arg(long, env = "REDIS_TLS")]
    pub redis_tls: bool,
}

impl StoreArgs {
    /// 接続先（ホスト・ポート・パスワード・TLS）
    pub fn connection_info(&self) -> Result<ConnectionInfo, GatewayError> {
        connection_info(&self.redis_host, self.redis_password.as_deref(), self.redis_tls)
    }
}

#[derive(Debug, Args)]
pub struct SweepArgs {
    #[arg(long, env = "STREAM_NAME")]
    pub stream_name: String,

    #[arg(long, env = "STREAM_CONSUMER_GROUP_NAME")]
    pub consumer_group: String,

    /// Consumer that idle entries are claimed for.
    #[arg(long, env = "MONITORING_CONSUMER_NAME")]
    pub monitoring_consumer: String,

    /// Entries idle for fewer seconds than this are left alone.
    #[arg(long, env = "MIN_IDLE_TIME_SEC")]
    pub min_idle_time_sec: u64,

    #[arg(long, env = "INDEX_KEY_PREFIX", default_value = "tweet:")]
    pub index_key_prefix: String,

    /// Payload field whose value completes the index key.
    #[arg(long, env = "INDEX_KEY_FIELD", default_value = "id")]
    pub index_key_field: String,

    #[arg(long, env = "MAX_IN_FLIGHT", default_value_t = SweepConfig::DEFAULT_MAX_IN_FLIGHT)]
    pub max_in_flight: usize,

    #[arg(long, env = "CALL_TIMEOUT_MS", default_value_t = 5_000)]
    pub call_timeout_ms: u64,

    #[arg(long, env = "PASS_TIMEOUT_MS", default_value_t = 60_000)]
    pub pass_timeout_ms: u64,

    /// Read at most this many pending records per pass.
    #[arg(long, env = "SCAN_LIMIT")]
    pub scan_limit: Option<usize>,
}

impl SweepArgs {
    pub fn to_config(&self) -> SweepConfig {
        SweepConfig::new(
            &self.stream_name,
            &self.consumer_group,
            &self.monitoring_consumer,
            Duration::from_secs(self.min_idle_time_sec),
        )
        .with_index_key(IndexKeyPolicy::new(
            &self.index_key_prefix,
            &self.index_key_field,
        ))
        .with_max_in_flight(self.max_in_flight)
        .with_call_timeout(Duration::from_millis(self.call_timeout_ms))
        .with_pass_timeout(Duration::from_millis(self.pass_timeout_ms))
        .with_scan_limit(self.scan_limit)
    }
}
