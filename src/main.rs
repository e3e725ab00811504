use anyhow::Result;
use clap::Parser;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

mod cli;
mod commands;

use cli::{Cli, DEFAULT_LOG_FILTER};

#[tokio::main]
async fn main() -> Result<()> {
    // .env may carry RUST_LOG, so load it before the logger
    let dotenv_path = dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(DEFAULT_LOG_FILTER))
        .init();
    if let Some(path) = dotenv_path {
        info!("Loaded environment from {:?}", path);
    }

    let cli = Cli::parse();
    info!("Starting bc-odata");

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            on_interrupt.cancel();
        }
    });

    commands::odata::run_command(cli.command, cli.config.as_deref(), cancel).await
}
