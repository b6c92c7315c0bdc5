//! Relational guest-book service for the gender-reveal site.
//!
//! Guesses live in a SQLite `palpites` table and are exposed over a small
//! JSON API (`/api/palpites`, `/api/stats`). The tenth stored guess is
//! flagged as the winner at insert time. When a static directory is
//! configured the same server also hosts the site's pages.

use std::net::SocketAddr;

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod rest;

pub use config::ServerConfig;
pub use db::DbConnection;
pub use domain::GuessService;
pub use error::ApiError;
pub use rest::{create_router, AppState};

/// Open the database and wire up the services behind the router
pub async fn initialize_backend(config: &ServerConfig) -> Result<AppState> {
    info!("Setting up database at {}", config.database_url);
    let db = DbConnection::new(&config.database_url).await?;
    Ok(AppState::new(GuessService::new(db)))
}

pub async fn build_app(config: &ServerConfig) -> Result<Router> {
    let state = initialize_backend(config).await?;
    Ok(create_router(state, config.static_dir.as_deref()))
}

/// Run the server until Ctrl+C or SIGTERM
pub async fn start_server(config: ServerConfig) -> Result<()> {
    let app = build_app(&config).await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!("🚀 Servidor rodando em http://localhost:{}", config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                warn!("Failed to listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
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
}
