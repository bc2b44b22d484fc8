//! # Eatoff Settlement Engine API
//!
//! Axum binary exposing the wallet, voucher, payment and settlement
//! operations over HTTP, plus the background scheduler that captures due
//! deferred payments and sweeps expired vouchers.

mod config;
mod error;
mod gateway;
mod routes;
mod scheduler;
mod services;
mod state;

use tracing::info;
use tracing_subscriber::EnvFilter;

use eatoff_db::{Database, DbConfig};

use crate::config::ApiConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,eatoff_api=debug")),
        )
        .init();

    let config = ApiConfig::load()?;
    info!(database = %config.database_path, "Starting eatoff-api");

    let db = Database::new(DbConfig::new(&config.database_path)).await?;
    let state = AppState::new(db, config.clone());

    scheduler::spawn(state.clone());

    let app = routes::router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!(address = %config.bind_address, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => tracing::error!(%err, "Failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
