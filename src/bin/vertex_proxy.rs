//! Vertex AI proxy server
//!
//! Lets the browser frontend call Vertex AI without holding any GCP
//! credential: the proxy fetches a fresh ambient token per request and
//! forwards the translated payload.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use splat_node::proxy::{create_router, AppState, GcloudTokenProvider, ProxyConfig};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vertex_proxy=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // A missing project id is a configuration error; fail before serving
    let config = ProxyConfig::from_env()?;
    tracing::info!(
        "Vertex AI proxy starting (project: {}, location: {}, default model: {})",
        config.project,
        config.location,
        config.default_model
    );

    let state = AppState::new(config, Arc::new(GcloudTokenProvider::new()?));
    let app = create_router(state).layer(TraceLayer::new_for_http());

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "8000".into())
        .parse()
        .map_err(|_| anyhow::anyhow!("PORT must be a number"))?;
    let addr: SocketAddr = format!("{host}:{port}").parse()?;

    tracing::info!("Listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down...");
        })
        .await?;

    Ok(())
}
