//! mapstackd — the mapstack service daemon.
//!
//! Supervises one geodata service per process:
//! - Data preparation (download, extraction, import/convert)
//! - The service process and its readiness
//! - Status and disk usage on the control plane (managed mode)
//!
//! # Usage
//!
//! ```text
//! REGION=europe/germany mapstackd routing --data-path /data ...
//! MANAGED=true REDIS_URL=redis://valkey:6379 mapstackd tiling ...
//! ```

mod cli;
mod daemon;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, LogFormat};

const DEFAULT_LOG_FILTER: &str = "info,mapstack=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.global.log_format);

    daemon::run(cli.global, cli.service).await
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}
