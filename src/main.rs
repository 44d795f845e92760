//! taskproof - HTTP Server Entry Point
//!
//! Starts the HTTP server that exposes the verification engine API and the
//! inbound CI webhook.

use taskproof::{api, config::Config};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskproof=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    info!(
        "Loaded configuration: provider={} data_dir={}",
        config.github_api_url,
        config.data_dir.display()
    );
    if config.webhook_secret.is_none() {
        tracing::warn!("WEBHOOK_SECRET not set; inbound CI callbacks will be rejected");
    }

    api::serve(config).await?;

    Ok(())
}
