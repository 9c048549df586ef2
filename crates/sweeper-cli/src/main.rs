//! sweeper: claims idle stream entries, rewrites their index record and
//! acknowledges them. One pass per `/monitor` request (or per `once` run).

mod http;
mod logging;
mod settings;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use sweeper_core::Sweeper;
use sweeper_core::impls::RedisStreamGateway;
use tracing::info;

use crate::settings::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_format)?;

    let config = cli.sweep.to_config();
    info!(
        stream = %config.stream,
        group = %config.group,
        consumer = %config.consumer,
        min_idle_secs = config.min_idle.as_secs(),
        "starting sweeper"
    );

    let connection = cli
        .store
        .connection_info()
        .context("invalid redis connection settings")?;
    let gateway = RedisStreamGateway::connect(connection)
        .await
        .with_context(|| format!("connecting to redis at {}", cli.store.redis_host))?;

    let sweeper = Sweeper::builder(config)
        .gateway(Arc::new(gateway))
        .build()
        .context("building sweeper")?;

    match cli.command {
        Command::Serve { port } => http::serve(Arc::new(sweeper), port).await,
        Command::Once => once(&sweeper).await,
    }
}

async fn once(sweeper: &Sweeper) -> anyhow::Result<()> {
    match sweeper.run_pass().await {
        Ok(result) => {
            println!("{}", serde_json::to_string(&result)?);
            Ok(())
        }
        Err(err) => {
            println!("{}", serde_json::to_string(&http::ErrorBody::from(&err))?);
            Err(err).context("sweep pass failed")
        }
    }
}
