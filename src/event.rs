//! Request and event types shared by the parser, dispatcher and handlers.

use axum::body::Bytes;
use axum::http::HeaderMap;
use serde_json::Value;
use std::collections::HashMap;

/// A raw inbound HTTP request, before any verification or decoding.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl InboundRequest {
    pub fn new(headers: HeaderMap, body: Bytes) -> Self {
        Self { headers, body }
    }

    /// Returns a header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// A request whose credential has been checked by the verifier.
///
/// Only the dispatcher constructs these, so a parser can never produce an
/// [`Event`] from an unverified request.
#[derive(Debug)]
pub struct Authenticated(InboundRequest);

impl Authenticated {
    pub(crate) fn new(request: InboundRequest) -> Self {
        Self(request)
    }

    pub fn request(&self) -> &InboundRequest {
        &self.0
    }
}

/// A verified, classified event. Lives for the duration of one request.
#[derive(Debug, Clone)]
pub struct Event {
    /// Declared event type label, e.g. `pull_request` or `app_mention`.
    pub event_type: String,
    /// Body bytes exactly as received.
    pub raw_body: Bytes,
    /// The JSON document text, verbatim. Equal to `raw_body` for JSON bodies,
    /// the decoded `payload` field for form bodies.
    pub payload: String,
    /// `payload` parsed for inspection.
    pub document: Value,
    pub headers: HashMap<String, String>,
    /// Upstream delivery identifier, when the source provides one.
    pub delivery_id: Option<String>,
}

impl Event {
    /// Looks up a string at a dotted path in the document, e.g. `repository.full_name`.
    pub fn str_at(&self, path: &str) -> Option<&str> {
        path.split('.')
            .try_fold(&self.document, |value, key| value.get(key))
            .and_then(Value::as_str)
    }
}

/// Copies headers into a map, skipping values that are not valid UTF-8.
pub(crate) fn header_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.to_string(), v.to_string()))
        })
        .collect()
}
