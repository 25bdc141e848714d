//! TuneLink - OAuth 2.1 session and token service
//!
//! Main entry point for the HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tunelink_api::{router, AppContext};
use tunelink_infra::{config, init_logging};

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Missing .env is fine; variables may come from the environment.
    let dotenv = dotenvy::dotenv();

    let config = config::load().context("failed to load configuration")?;
    init_logging(&config.server).context("failed to initialise logging")?;
    match dotenv {
        Ok(path) => info!(path = %path.display(), "Loaded .env"),
        Err(e) => info!(reason = %e, "No .env loaded"),
    }

    let bind_address = config.server.bind_address();
    let ctx = Arc::new(AppContext::new(config).context("failed to build application context")?);
    ctx.start().await.context("failed to start background tasks")?;

    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    info!(address = %bind_address, auth_url = %ctx.auth_url, "TuneLink listening");

    let app = router(Arc::clone(&ctx));
    let served = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await;

    ctx.shutdown().await;
    served.context("server error")?;
    info!("TuneLink stopped");
    Ok(())
}
