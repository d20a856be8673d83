//! API Server for the task board
//!
//! This is the main entry point for the Rust backend.
//! It serves the task REST API on port 8081 unless configured otherwise.

mod config;
mod routes;
mod state;

use anyhow::Context;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ServerConfig;
use crate::state::AppState;

fn build_router(state: AppState, cors_any: bool) -> Router {
    let router = Router::new()
        .merge(routes::health::router())
        .merge(routes::task::router())
        .with_state(state);

    let router = if cors_any {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.layer(TraceLayer::new_for_http())
}

/// Resolves on Ctrl-C or SIGTERM, cancelling in-flight work first.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", err);
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

    tracing::info!("Shutdown requested");
    shutdown.cancel();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api_server=debug,tb_core=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env().context("Invalid server configuration")?;
    tracing::info!(
        "Using {:?} storage in data directory {:?}",
        config.storage,
        config.data_dir
    );

    let shutdown = CancellationToken::new();
    let app_state = AppState::new(&config, shutdown.clone())
        .await
        .context("Failed to initialize application state")?;

    let app = build_router(app_state, config.cors_any);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("REST API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}
