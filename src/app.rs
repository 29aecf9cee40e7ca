//! HTTP surface: router, endpoint handlers, and integration wiring.

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::chat::ChatClient;
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::event::InboundRequest;
use crate::handlers::{ChallengeHandler, MentionHandler, PersistHandler};
use crate::parser::{CHALLENGE_EVENT, EnvelopeEventParser, HeaderEventParser};
use crate::store::{EventKind, PayloadStore};
use crate::verifier::Verifier;

/// GitHub's handshake event.
pub const PING_EVENT: &str = "ping";
/// Slack event type for mentions of the bot.
pub const APP_MENTION_EVENT: &str = "app_mention";

#[derive(Clone)]
pub struct AppState {
    pub github: Arc<Dispatcher>,
    pub slack: Arc<Dispatcher>,
    pub github_path: String,
    pub slack_path: String,
}

impl AppState {
    pub fn new(config: &Config, store: PayloadStore, chat: Arc<dyn ChatClient>) -> Self {
        Self {
            github: Arc::new(github_dispatcher(&config.github_secret, store.clone())),
            slack: Arc::new(slack_dispatcher(&config.slack_token, store, chat)),
            github_path: config.github_path.clone(),
            slack_path: config.slack_path.clone(),
        }
    }
}

/// GitHub webhooks: HMAC over the raw body, type from `X-GitHub-Event`.
pub fn github_dispatcher(secret: &str, store: PayloadStore) -> Dispatcher {
    let mut builder = Dispatcher::builder("github", HeaderEventParser, Verifier::hmac(secret))
        .on(PING_EVENT, Arc::new(ChallengeHandler::new("zen")));
    for kind in EventKind::ALL {
        builder = builder.on(kind.label(), Arc::new(PersistHandler::new(store.clone(), kind)));
    }
    builder.build()
}

/// Slack Events API: envelope token, type from the envelope.
pub fn slack_dispatcher(token: &str, store: PayloadStore, chat: Arc<dyn ChatClient>) -> Dispatcher {
    Dispatcher::builder("slack", EnvelopeEventParser, Verifier::static_token(token))
        .on(CHALLENGE_EVENT, Arc::new(ChallengeHandler::new("challenge")))
        .on(APP_MENTION_EVENT, Arc::new(MentionHandler::new(store, chat)))
        .build()
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health_check))
        .route(&state.github_path, post(handle_github))
        .route(&state.slack_path, post(handle_slack))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_github(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    dispatch(&state.github, headers, body).await
}

async fn handle_slack(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    dispatch(&state.slack, headers, body).await
}

async fn dispatch(dispatcher: &Dispatcher, headers: HeaderMap, body: Bytes) -> Response {
    match dispatcher.dispatch(InboundRequest::new(headers, body)).await {
        Ok(reply) => reply.into_response(),
        Err(e) => e.into_response(),
    }
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "hookstats",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn service_info(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "hookstats",
        "endpoints": {
            "github": state.github_path,
            "slack": state.slack_path,
            "health": "/health",
            "info": "/"
        },
        "github_events": state.github.event_types(),
        "slack_events": state.slack.event_types(),
    }))
}
