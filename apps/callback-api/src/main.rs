//! # Duka Callback API
//!
//! HTTP server for M-Pesa STK callbacks.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Callback Server                                  │
//! │                                                                         │
//! │  Provider ───► HTTP (8080) ───► CallbackHandler ───► SQLite            │
//! │                                       │                                 │
//! │                                       ▼                                 │
//! │                               LedgerReconciler                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use duka_callback_api::{router, ApiConfig, AppState};
use duka_db::Database;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    info!("Starting Duka callback server...");

    // Load configuration
    let config = ApiConfig::load()?;
    info!(
        port = config.port,
        database = %config.database_path.display(),
        "Configuration loaded"
    );

    // Open database (runs migrations)
    let db = Database::open(&config.database_path).await?;
    info!("Database ready");

    let addr = config.socket_addr();
    let state = Arc::new(AppState::new(db.clone(), config));
    let app = router(state);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Callback server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
