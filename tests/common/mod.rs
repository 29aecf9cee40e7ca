//! Shared fixtures for HTTP-level tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use hookstats::chat::{ChatClient, ChatError};
use hookstats::config::Config;
use hookstats::verifier::sign;
use hookstats::{AppState, EventKind, PayloadStore, router};
use std::sync::{Arc, Mutex};

pub const GITHUB_SECRET: &str = "It's a Secret to Everybody";
pub const SLACK_TOKEN: &str = "Jhj5dZrVaK7ZwHHjRyZWjbDl";
pub const GITHUB_PATH: &str = "/github/webhook";
pub const SLACK_PATH: &str = "/slack/events";

#[derive(Default)]
pub struct RecordingChat {
    pub posted: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl ChatClient for RecordingChat {
    async fn post_message(&self, channel: &str, text: &str) -> Result<(), ChatError> {
        self.posted
            .lock()
            .unwrap()
            .push((channel.to_string(), text.to_string()));
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: PayloadStore,
    pub chat: Arc<RecordingChat>,
}

pub fn test_config() -> Config {
    Config {
        port: 0,
        database: ":memory:".into(),
        github_secret: GITHUB_SECRET.to_string(),
        github_path: GITHUB_PATH.to_string(),
        slack_token: SLACK_TOKEN.to_string(),
        slack_bot_token: "xoxb-test".to_string(),
        slack_path: SLACK_PATH.to_string(),
        slack_api_url: "http://127.0.0.1:9".to_string(),
    }
}

pub fn create_test_app() -> TestApp {
    create_test_app_with_store(PayloadStore::open_in_memory().unwrap())
}

pub fn create_test_app_with_store(store: PayloadStore) -> TestApp {
    let chat = Arc::new(RecordingChat::default());
    let state = AppState::new(&test_config(), store.clone(), chat.clone());
    TestApp {
        router: router(state),
        store,
        chat,
    }
}

pub fn pr_payload(repository: &str, sender: &str, number: u64) -> String {
    serde_json::json!({
        "action": "opened",
        "number": number,
        "repository": {"full_name": repository, "name": repository.rsplit('/').next().unwrap()},
        "sender": {"login": sender},
    })
    .to_string()
}

/// A GitHub delivery with a JSON body signed with `secret`.
pub fn github_request(event_type: &str, body: &str, secret: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(GITHUB_PATH)
        .header("content-type", "application/json")
        .header("x-github-event", event_type)
        .header("x-github-delivery", "72d3162e-cc78-11e3-81ab-4c9367dc0958")
        .header("x-hub-signature-256", sign(body.as_bytes(), secret))
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// A GitHub delivery using the form-encoded `payload=` content type.
pub fn github_form_request(event_type: &str, json: &str, secret: &str) -> Request<Body> {
    let body = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("payload", json)
        .finish();
    Request::builder()
        .method("POST")
        .uri(GITHUB_PATH)
        .header("content-type", "application/x-www-form-urlencoded")
        .header("x-github-event", event_type)
        .header("x-hub-signature-256", sign(body.as_bytes(), secret))
        .body(Body::from(body))
        .unwrap()
}

pub fn slack_request(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(SLACK_PATH)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn mention(token: &str, text: &str) -> serde_json::Value {
    serde_json::json!({
        "token": token,
        "team_id": "T061EG9R6",
        "api_app_id": "A0PNCHHK2",
        "type": "event_callback",
        "event_id": "Ev0PV52K25",
        "event": {
            "type": "app_mention",
            "user": "U061F7AUR",
            "text": text,
            "ts": "1515449522.000016",
            "channel": "C0LAN2Q65",
            "event_ts": "1515449522000016"
        }
    })
}

pub async fn assert_nothing_stored(store: &PayloadStore, repository: &str) {
    for kind in EventKind::ALL {
        assert_eq!(store.count(repository, kind).await.unwrap(), 0, "{kind}");
    }
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
