//! Parley Gateway - streaming relay to the assistant backend.
//!
//! Configuration comes from the environment: `LISTEN_ADDR`, `UPSTREAM_URL`,
//! `CORS_ORIGINS` and `UPSTREAM_TIMEOUT_SECONDS`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use parley_gateway::{create_router, GatewayConfig, GatewayState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,parley=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Parley Gateway");

    let config = GatewayConfig::from_env();
    let listen_addr = config.listen_addr.clone();

    tracing::info!(
        listen_addr = %listen_addr,
        upstream_url = %config.upstream_url,
        cors_origins = ?config.cors_origins,
        upstream_timeout_seconds = config.upstream_response_timeout_seconds,
        "Gateway configuration loaded"
    );

    let state = GatewayState::from_config(config)?;
    let app = create_router(state);

    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
