//! Fleet Server - always-on backend for live drone operations

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fleet_server::config::Config;
use fleet_server::state::AppState;
use fleet_server::{api, loops};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("fleet_server=debug".parse()?))
        .init();

    tracing::info!("Starting Fleet Server...");

    let config = Config::from_env();
    let port = config.server_port;
    let sync_geometry = config.geometry_sync_enabled();
    let state = Arc::new(AppState::new(config));
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Start background loops
    if sync_geometry {
        tokio::spawn(loops::geometry_sync_loop::run_geometry_sync_loop(
            state.clone(),
            shutdown_tx.subscribe(),
        ));
    } else {
        tracing::warn!("No geometry sources configured; airspace starts empty until PUT");
    }

    // Build the app
    let app = api::routes()
        .with_state(state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Run server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(());
    state.shutdown();
    tracing::info!("Fleet Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
