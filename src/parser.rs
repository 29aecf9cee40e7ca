//! Extracting an [`Event`] from a raw request.
//!
//! Parsing happens in two steps. [`EventParser::credential`] pulls the
//! caller-supplied signature or token out of the request without touching the
//! body bytes, so the verifier always sees exactly what was sent.
//! [`EventParser::parse`] then classifies an [`Authenticated`] request.

use axum::http::header::CONTENT_TYPE;
use percent_encoding::percent_decode;
use serde_json::Value;
use thiserror::Error;

use crate::event::{Authenticated, Event, InboundRequest, header_map};

/// Header carrying the GitHub event type.
pub const HEADER_EVENT: &str = "x-github-event";
/// Header carrying the GitHub delivery id.
pub const HEADER_DELIVERY: &str = "x-github-delivery";
/// HMAC-SHA256 signature header.
pub const HEADER_SIGNATURE_256: &str = "x-hub-signature-256";
/// Legacy HMAC-SHA1 signature header.
pub const HEADER_SIGNATURE: &str = "x-hub-signature";

/// Event type label produced for Slack `url_verification` envelopes.
pub const CHALLENGE_EVENT: &str = "challenge";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Errors that make a request unparseable. All map to 400.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    #[error("missing event type in envelope")]
    MissingEventType,

    #[error("form body has no payload field")]
    MissingPayloadField,

    #[error("request body is not valid UTF-8")]
    InvalidUtf8,

    #[error("invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Turns raw requests into events for one integration.
pub trait EventParser: Send + Sync {
    /// The signature or token the caller supplied, if any.
    fn credential(&self, request: &InboundRequest) -> Result<Option<String>, ParseError>;

    /// Classifies a verified request.
    fn parse(&self, request: Authenticated) -> Result<Event, ParseError>;
}

/// Reads the event type from a fixed header (GitHub style).
#[derive(Debug, Clone, Default)]
pub struct HeaderEventParser;

impl EventParser for HeaderEventParser {
    fn credential(&self, request: &InboundRequest) -> Result<Option<String>, ParseError> {
        let signature = request
            .header(HEADER_SIGNATURE_256)
            .or_else(|| request.header(HEADER_SIGNATURE))
            .map(str::to_string);
        Ok(signature)
    }

    fn parse(&self, request: Authenticated) -> Result<Event, ParseError> {
        let request = request.request();
        let event_type = request
            .header(HEADER_EVENT)
            .ok_or(ParseError::MissingHeader(HEADER_EVENT))?
            .to_string();

        let payload = payload_text(request)?;
        let document: Value = serde_json::from_str(&payload)?;

        Ok(Event {
            event_type,
            raw_body: request.body.clone(),
            payload,
            document,
            headers: header_map(&request.headers),
            delivery_id: request.header(HEADER_DELIVERY).map(str::to_string),
        })
    }
}

/// Reads the event type from inside the body (Slack Events API style).
///
/// `url_verification` envelopes become [`CHALLENGE_EVENT`], `event_callback`
/// envelopes take the inner `event.type`, anything else keeps its own `type`.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeEventParser;

impl EnvelopeEventParser {
    fn envelope(request: &InboundRequest) -> Result<(String, Value), ParseError> {
        let payload = payload_text(request)?;
        let document: Value = serde_json::from_str(&payload)?;
        Ok((payload, document))
    }
}

impl EventParser for EnvelopeEventParser {
    fn credential(&self, request: &InboundRequest) -> Result<Option<String>, ParseError> {
        let (_, document) = Self::envelope(request)?;
        Ok(document
            .get("token")
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    fn parse(&self, request: Authenticated) -> Result<Event, ParseError> {
        let request = request.request();
        let (payload, document) = Self::envelope(request)?;

        let outer = document
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ParseError::MissingEventType)?;
        let event_type = match outer {
            "url_verification" => CHALLENGE_EVENT.to_string(),
            "event_callback" => document
                .get("event")
                .and_then(|e| e.get("type"))
                .and_then(Value::as_str)
                .ok_or(ParseError::MissingEventType)?
                .to_string(),
            other => other.to_string(),
        };

        let delivery_id = document
            .get("event_id")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(Event {
            event_type,
            raw_body: request.body.clone(),
            payload,
            document,
            headers: header_map(&request.headers),
            delivery_id,
        })
    }
}

fn is_form(request: &InboundRequest) -> bool {
    request
        .header(CONTENT_TYPE.as_str())
        .map(|ct| {
            ct.split(';')
                .next()
                .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE))
        })
        .unwrap_or(false)
}

/// The JSON document text carried by the request, without re-encoding it.
fn payload_text(request: &InboundRequest) -> Result<String, ParseError> {
    if is_form(request) {
        form_field(&request.body, "payload")?.ok_or(ParseError::MissingPayloadField)
    } else {
        std::str::from_utf8(&request.body)
            .map(str::to_string)
            .map_err(|_| ParseError::InvalidUtf8)
    }
}

/// Finds `name` in a form body and decodes its value strictly.
///
/// Percent-decoded bytes that are not valid UTF-8 fail with
/// [`ParseError::InvalidUtf8`] instead of being replaced.
fn form_field(body: &[u8], name: &str) -> Result<Option<String>, ParseError> {
    for pair in body.split(|b| *b == b'&').filter(|pair| !pair.is_empty()) {
        let mut parts = pair.splitn(2, |b| *b == b'=');
        let key = parts.next().unwrap_or_default();
        let value = parts.next().unwrap_or_default();
        if percent_decode(&plus_to_space(key)).decode_utf8_lossy() == name {
            let bytes: Vec<u8> = percent_decode(&plus_to_space(value)).collect();
            return String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| ParseError::InvalidUtf8);
        }
    }
    Ok(None)
}

fn plus_to_space(raw: &[u8]) -> Vec<u8> {
    raw.iter()
        .map(|&b| if b == b'+' { b' ' } else { b })
        .collect()
}
