//! Outpost - email outreach automation server entry point

use std::sync::Arc;

use anyhow::Result;
use outpost_api::AppState;
use outpost_common::config::Config;
use outpost_core::{
    dispatch::DispatchConfig, DispatchEngine, ImapFetcher, ReplyEngine, SmtpTransport,
};
use outpost_storage::{RedisStore, Store};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first so logging can use its filter
    let config = Config::load()?;

    init_logging(&config.logging.filter);

    info!("Starting Outpost server...");

    // Connect the entity store
    let store: Arc<dyn Store> = Arc::new(RedisStore::connect(&config.store).await?);
    info!("Entity store ready");

    // Cancelling this token aborts in-flight engine passes between items
    let cancel = CancellationToken::new();

    // Construct the engines with explicit dependencies; nothing is cached
    // process-wide
    let dispatch = Arc::new(DispatchEngine::new(
        Arc::clone(&store),
        Arc::new(SmtpTransport::new()),
        DispatchConfig {
            tracking_base_url: config.tracking.base_url.clone(),
            smtp_defaults: config.smtp.clone(),
        },
    ));

    let reply = Arc::new(ReplyEngine::new(
        Arc::clone(&store),
        Arc::new(ImapFetcher::new()),
    ));

    let state = Arc::new(AppState {
        store,
        dispatch,
        reply,
        cancel: cancel.clone(),
    });

    // Start API server
    let app = outpost_api::create_router(state);
    let bind = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("Starting API server on {}", bind);

    let api_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    info!("Outpost server started successfully");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    // Stop in-flight engine passes at the next lead/account boundary
    cancel.cancel();
    api_handle.abort();

    info!("Outpost server shutdown complete");

    Ok(())
}

fn init_logging(filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_level(true))
        .with(filter)
        .init();
}
