//! Event handlers registered with the dispatchers.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::chat::ChatClient;
use crate::dispatcher::{EventHandler, Reply};
use crate::error::HookError;
use crate::event::Event;
use crate::stats::{CountSource, StatsAggregator, StatsCommand};
use crate::store::{EventKind, NewPayload, PayloadStore};

/// Answers a handshake by echoing one field of the document verbatim.
///
/// Performs no I/O.
#[derive(Debug, Clone)]
pub struct ChallengeHandler {
    field: &'static str,
}

impl ChallengeHandler {
    pub fn new(field: &'static str) -> Self {
        Self { field }
    }
}

#[async_trait]
impl EventHandler for ChallengeHandler {
    async fn handle(&self, event: Event) -> Result<Reply, HookError> {
        let token = event
            .str_at(self.field)
            .ok_or(HookError::MissingField(self.field))?;
        info!(event_type = %event.event_type, "answered handshake");
        Ok(Reply::Text(token.to_string()))
    }
}

/// Persists the payload into the table for one event kind.
#[derive(Clone)]
pub struct PersistHandler {
    store: PayloadStore,
    kind: EventKind,
}

impl PersistHandler {
    pub fn new(store: PayloadStore, kind: EventKind) -> Self {
        Self { store, kind }
    }
}

/// Reads `repository.full_name` and `sender.login`, refusing empty values.
pub fn payload_origin(event: &Event) -> Result<(String, String), HookError> {
    let repository = event
        .str_at("repository.full_name")
        .filter(|s| !s.is_empty())
        .ok_or(HookError::MissingField("repository.full_name"))?;
    let sender = event
        .str_at("sender.login")
        .filter(|s| !s.is_empty())
        .ok_or(HookError::MissingField("sender.login"))?;
    Ok((repository.to_string(), sender.to_string()))
}

#[async_trait]
impl EventHandler for PersistHandler {
    async fn handle(&self, event: Event) -> Result<Reply, HookError> {
        let (repository, sender) = payload_origin(&event)?;

        let row = NewPayload {
            repository: repository.clone(),
            sender: sender.clone(),
            payload: event.payload,
            created_at: Utc::now(),
            delivery_id: event.delivery_id.clone(),
        };

        match self.store.save(self.kind, row).await {
            Ok(id) => {
                info!(
                    event_type = %self.kind,
                    repository = %repository,
                    sender = %sender,
                    delivery_id = ?event.delivery_id,
                    id,
                    "stored payload"
                );
                Ok(Reply::Ack)
            }
            Err(e) => {
                error!(
                    event_type = %self.kind,
                    repository = %repository,
                    error = %e,
                    "failed to store payload"
                );
                Err(e.into())
            }
        }
    }
}

/// Handles `app_mention`: runs the stats command and posts the summary back
/// to the channel the mention came from.
pub struct MentionHandler<S> {
    aggregator: StatsAggregator<S>,
    chat: Arc<dyn ChatClient>,
}

impl<S: CountSource> MentionHandler<S> {
    pub fn new(source: S, chat: Arc<dyn ChatClient>) -> Self {
        Self {
            aggregator: StatsAggregator::new(source),
            chat,
        }
    }
}

#[async_trait]
impl<S: CountSource + 'static> EventHandler for MentionHandler<S> {
    async fn handle(&self, event: Event) -> Result<Reply, HookError> {
        let text = event
            .str_at("event.text")
            .ok_or(HookError::MissingField("event.text"))?;
        let channel = event
            .str_at("event.channel")
            .ok_or(HookError::MissingField("event.channel"))?;

        let command = match StatsCommand::parse(text) {
            Ok(command) => command,
            Err(e) => {
                // Acknowledged so the source does not redeliver; nothing is posted.
                warn!(channel, error = %e, "ignoring invalid command");
                return Ok(Reply::Ack);
            }
        };

        let stats = self.aggregator.collect(&command).await.map_err(|e| {
            error!(repository = %command.repository, error = %e, "failed to collect stats");
            HookError::from(e)
        })?;

        self.chat
            .post_message(channel, &stats.summary())
            .await
            .map_err(|e| {
                error!(channel, error = %e, "failed to post stats");
                HookError::from(e)
            })?;

        info!(channel, repository = %stats.repository, "posted stats");
        Ok(Reply::Ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatError;
    use crate::dispatcher::Dispatcher;
    use crate::event::InboundRequest;
    use crate::parser::{CHALLENGE_EVENT, EnvelopeEventParser};
    use crate::store::StoreError;
    use crate::verifier::Verifier;
    use axum::body::Bytes;
    use axum::http::HeaderMap;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event(event_type: &str, document: Value) -> Event {
        Event {
            event_type: event_type.into(),
            raw_body: Bytes::new(),
            payload: document.to_string(),
            document,
            headers: HashMap::new(),
            delivery_id: Some("d-1".into()),
        }
    }

    #[derive(Default)]
    struct RecordingChat(Mutex<Vec<(String, String)>>);

    #[async_trait]
    impl ChatClient for RecordingChat {
        async fn post_message(&self, channel: &str, text: &str) -> Result<(), ChatError> {
            self.0.lock().unwrap().push((channel.into(), text.into()));
            Ok(())
        }
    }

    /// Records how many counts were requested, and fails every one.
    #[derive(Clone, Default)]
    struct FailingCounts(Arc<AtomicUsize>);

    impl FailingCounts {
        fn calls(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CountSource for FailingCounts {
        async fn count(&self, _: &str, _: EventKind) -> Result<u64, StoreError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Unavailable {
                operation: "count",
                message: "gone".into(),
            })
        }
    }

    #[tokio::test]
    async fn challenge_echoes_token() {
        let token = "3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P";
        let reply = ChallengeHandler::new("challenge")
            .handle(event("challenge", json!({ "challenge": token })))
            .await
            .unwrap();
        assert_eq!(reply, Reply::Text(token.into()));
    }

    #[tokio::test]
    async fn challenge_without_token_is_malformed() {
        let err = ChallengeHandler::new("challenge")
            .handle(event("challenge", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, HookError::MissingField("challenge")));
    }

    #[tokio::test]
    async fn persist_stores_origin_fields() {
        let store = PayloadStore::open_in_memory().unwrap();
        let handler = PersistHandler::new(store.clone(), EventKind::PullRequestReview);
        let doc = json!({"repository": {"full_name": "octo/repo"}, "sender": {"login": "octocat"}});

        let reply = handler.handle(event("pull_request_review", doc.clone())).await.unwrap();
        assert_eq!(reply, Reply::Ack);

        let rows = store.list("octo/repo", EventKind::PullRequestReview).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sender, "octocat");
        assert_eq!(rows[0].payload, doc.to_string());
        assert_eq!(rows[0].delivery_id.as_deref(), Some("d-1"));
    }

    #[tokio::test]
    async fn persist_refuses_missing_or_empty_origin() {
        let store = PayloadStore::open_in_memory().unwrap();
        let handler = PersistHandler::new(store.clone(), EventKind::PullRequest);

        let err = handler
            .handle(event("pull_request", json!({"sender": {"login": "octocat"}})))
            .await
            .unwrap_err();
        assert!(matches!(err, HookError::MissingField("repository.full_name")));

        let err = handler
            .handle(event(
                "pull_request",
                json!({"repository": {"full_name": "octo/repo"}, "sender": {"login": ""}}),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, HookError::MissingField("sender.login")));

        assert_eq!(store.count("octo/repo", EventKind::PullRequest).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn mention_posts_summary_to_channel() {
        let store = PayloadStore::open_in_memory().unwrap();
        let chat = Arc::new(RecordingChat::default());
        let handler = MentionHandler::new(store, chat.clone());

        let doc = json!({
            "event": {"type": "app_mention", "text": "<@U1> stats octo/repo", "channel": "C42"}
        });
        handler.handle(event("app_mention", doc)).await.unwrap();

        let posted = chat.0.lock().unwrap();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].0, "C42");
        assert!(posted[0].1.contains("total pull-request count is 0"));
    }

    #[tokio::test]
    async fn invalid_mention_posts_nothing_and_counts_nothing() {
        let counts = FailingCounts::default();
        let chat = Arc::new(RecordingChat::default());
        let handler = MentionHandler::new(counts.clone(), chat.clone());

        let doc = json!({"event": {"text": "<@U1> info octo/repo", "channel": "C42"}});
        let reply = handler.handle(event("app_mention", doc)).await.unwrap();

        assert_eq!(reply, Reply::Ack);
        assert_eq!(counts.calls(), 0);
        assert!(chat.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_count_posts_nothing() {
        let chat = Arc::new(RecordingChat::default());
        let handler = MentionHandler::new(FailingCounts::default(), chat.clone());

        let doc = json!({"event": {"text": "<@U1> stats octo/repo", "channel": "C42"}});
        let err = handler.handle(event("app_mention", doc)).await.unwrap_err();

        assert!(matches!(err, HookError::Storage(_)));
        assert!(chat.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn slack_challenge_touches_neither_store_nor_chat() {
        let counts = FailingCounts::default();
        let chat = Arc::new(RecordingChat::default());
        let dispatcher = Dispatcher::builder(
            "slack",
            EnvelopeEventParser,
            Verifier::static_token("tok"),
        )
        .on(CHALLENGE_EVENT, Arc::new(ChallengeHandler::new("challenge")))
        .on("app_mention", Arc::new(MentionHandler::new(counts.clone(), chat.clone())))
        .build();

        let body = r#"{"token":"tok","challenge":"c-123","type":"url_verification"}"#;
        let reply = dispatcher
            .dispatch(InboundRequest::new(HeaderMap::new(), Bytes::from(body)))
            .await
            .unwrap();

        assert_eq!(reply, Reply::Text("c-123".into()));
        assert_eq!(counts.calls(), 0);
        assert!(chat.0.lock().unwrap().is_empty());
    }
}
