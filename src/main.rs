use anyhow::Context;
use clap::Parser;
use hookstats::chat::SlackClient;
use hookstats::{AppState, Args, Config, PayloadStore, router};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::try_from(Args::parse()).context("invalid configuration")?;
    info!(?config, "loaded configuration");

    let store = PayloadStore::open(&config.database)
        .with_context(|| format!("opening database {}", config.database.display()))?;

    let chat = Arc::new(SlackClient::new(
        reqwest::Client::new(),
        config.slack_api_url.clone(),
        config.slack_bot_token.clone(),
    ));

    let app = router(AppState::new(&config, store, chat));

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    info!("hookstats starting on {}", addr);
    if config.github_secret.is_empty() {
        warn!("No GitHub webhook secret configured - every GitHub delivery will be rejected");
    }
    if config.slack_token.is_empty() {
        warn!("No Slack verification token configured - every Slack event will be rejected");
    }
    if config.slack_bot_token.is_empty() {
        warn!("No Slack bot token configured - stats replies will fail to post");
    }

    axum::serve(listener, app).await?;
    Ok(())
}
