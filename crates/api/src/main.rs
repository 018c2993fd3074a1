use anyhow::Context;
use tracing::info;

use miam_api::{AppConfig, build_app};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    miam_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let app = build_app(&config).await.context("failed to start services")?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
