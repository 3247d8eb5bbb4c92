//! Subdesk API Server
//!
//! Receives payment gateway webhooks and reconciles them into subscriptions.

use std::net::SocketAddr;

use subdesk_api::{create_router, AppState, Config, LogFormat};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,subdesk_api=debug,subdesk_billing=debug".into());
    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }

    tracing::info!("Starting Subdesk API Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(store = ?config.store_backend, "Configuration loaded");

    // Parse bind address
    let addr: SocketAddr = config.bind_address.parse()?;

    // Create application state
    let state = AppState::connect(config).await?;

    let app = create_router(state).layer(TraceLayer::new_for_http());

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
