use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod relay;
mod upstream;

use config::ProxyConfig;
use relay::{create_router, AppState};
use upstream::ReqwestUpstream;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let config = ProxyConfig::from_env()?;
    info!(
        "Relaying to {} and its subdomains (timeout {:?})",
        config.allowed_host, config.upstream_timeout
    );

    let upstream = ReqwestUpstream::new(config.upstream_timeout).context("Failed to build HTTP client")?;
    let app = create_router(AppState::new(Arc::new(upstream), config.allowed_host.clone()));

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("Listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
