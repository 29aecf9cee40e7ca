//! Outbound chat messages.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_SLACK_API_URL: &str = "https://slack.com/api";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("can't post message: channel={channel}, err={message}")]
    PostFailed { channel: String, message: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Sends a plain-text message to a conversation channel.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn post_message(&self, channel: &str, text: &str) -> Result<(), ChatError>;
}

#[derive(Serialize)]
struct PostMessage<'a> {
    channel: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct PostMessageResponse {
    ok: bool,
    error: Option<String>,
}

/// Slack Web API client for `chat.postMessage`.
#[derive(Clone)]
pub struct SlackClient {
    http_client: reqwest::Client,
    api_url: String,
    bot_token: String,
}

impl SlackClient {
    pub fn new(
        http_client: reqwest::Client,
        api_url: impl Into<String>,
        bot_token: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
        }
    }
}

impl std::fmt::Debug for SlackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackClient")
            .field("api_url", &self.api_url)
            .field("bot_token", &"<REDACTED>")
            .finish()
    }
}

#[async_trait]
impl ChatClient for SlackClient {
    async fn post_message(&self, channel: &str, text: &str) -> Result<(), ChatError> {
        let response: PostMessageResponse = self
            .http_client
            .post(format!("{}/chat.postMessage", self.api_url))
            .bearer_auth(&self.bot_token)
            .json(&PostMessage { channel, text })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.ok {
            Ok(())
        } else {
            Err(ChatError::PostFailed {
                channel: channel.to_string(),
                message: response.error.unwrap_or_else(|| "unknown error".to_string()),
            })
        }
    }
}
