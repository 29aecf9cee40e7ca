//! Routing verified events to their handlers.
//!
//! A [`Dispatcher`] owns one integration: its parser, its verification scheme
//! and an immutable table of handlers keyed by event type label. It is built
//! once at startup through [`DispatcherBuilder`] and shared behind an `Arc`.

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::HookError;
use crate::event::{Authenticated, Event, InboundRequest};
use crate::parser::EventParser;
use crate::verifier::{Verification, Verifier};

/// What a handled request answers with. All variants are 200-class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Handled; empty body.
    Ack,
    /// Handled; plain-text body.
    Text(String),
    /// Authenticated but no handler is registered for the type.
    Ignored,
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        match self {
            Reply::Ack | Reply::Ignored => StatusCode::OK.into_response(),
            Reply::Text(text) => (StatusCode::OK, text).into_response(),
        }
    }
}

/// Business logic for one event type.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: Event) -> Result<Reply, HookError>;
}

pub struct Dispatcher {
    name: &'static str,
    parser: Box<dyn EventParser>,
    verifier: Verifier,
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("name", &self.name)
            .field("verifier", &self.verifier)
            .field("events", &self.event_types())
            .finish()
    }
}

impl Dispatcher {
    pub fn builder(
        name: &'static str,
        parser: impl EventParser + 'static,
        verifier: Verifier,
    ) -> DispatcherBuilder {
        DispatcherBuilder {
            name,
            parser: Box::new(parser),
            verifier,
            handlers: HashMap::new(),
        }
    }

    /// Registered event type labels, sorted.
    pub fn event_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Checks the request's credential against this integration's scheme.
    pub fn authenticate(&self, request: InboundRequest) -> Result<Authenticated, HookError> {
        let credential = self.parser.credential(&request)?;
        match self.verifier.verify(&request.body, credential.as_deref()) {
            Verification::Authenticated => Ok(Authenticated::new(request)),
            Verification::Rejected(reason) => {
                warn!(integration = self.name, %reason, "rejected unauthenticated request");
                Err(HookError::Unauthenticated(reason))
            }
        }
    }

    /// Verifies, parses and routes one request.
    ///
    /// No handler runs unless verification succeeded. Unregistered event types
    /// are acknowledged with [`Reply::Ignored`].
    pub async fn dispatch(&self, request: InboundRequest) -> Result<Reply, HookError> {
        let authenticated = self.authenticate(request)?;
        let event = self.parser.parse(authenticated)?;

        let Some(handler) = self.handlers.get(&event.event_type) else {
            info!(
                integration = self.name,
                event_type = %event.event_type,
                "ignoring unregistered event type"
            );
            return Ok(Reply::Ignored);
        };

        debug!(
            integration = self.name,
            event_type = %event.event_type,
            delivery_id = ?event.delivery_id,
            "dispatching event"
        );
        handler.handle(event).await
    }
}

pub struct DispatcherBuilder {
    name: &'static str,
    parser: Box<dyn EventParser>,
    verifier: Verifier,
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

impl DispatcherBuilder {
    /// Registers `handler` for `event_type`, replacing any earlier one.
    pub fn on(mut self, event_type: impl Into<String>, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.insert(event_type.into(), handler);
        self
    }

    pub fn build(self) -> Dispatcher {
        Dispatcher {
            name: self.name,
            parser: self.parser,
            verifier: self.verifier,
            handlers: self.handlers,
        }
    }
}
