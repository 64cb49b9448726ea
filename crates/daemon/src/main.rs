//! icalsync daemon
//!
//! Loads the configuration, binds the authorization callback listener and
//! runs every user's synchronization on a fixed delay until interrupted.

mod context;
mod logging;

use anyhow::Context as _;
use tracing::{error, info};

use crate::context::AppContext;
use crate::logging::{init_logging, LogFormat};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env may carry RUST_LOG and ICALSYNC_LOG_FORMAT, so load it first.
    let _ = dotenvy::dotenv();
    init_logging(LogFormat::from_env());

    let config = icalsync_infra::config::load().context("failed to load configuration")?;
    let mut ctx = AppContext::build(config).await.context("failed to initialize application")?;

    ctx.dispatcher.start().await.context("failed to start dispatcher")?;
    info!(users = ctx.flows.len(), "icalsync running, press Ctrl-C to stop");

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
    }

    info!("shutting down");
    ctx.shutdown().await;
    Ok(())
}
