//! Webhook ingestion and repository activity stats.
//!
//! GitHub webhook payloads are verified, classified by event type and stored
//! per repository and sender; a Slack mention of the form
//! `<mention> stats <owner/repo>` replies with per-event-type counts.

pub mod app;
pub mod chat;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod handlers;
pub mod parser;
pub mod stats;
pub mod store;
pub mod verifier;

pub use app::{AppState, router};
pub use config::{Args, Config, ConfigError};
pub use dispatcher::{Dispatcher, EventHandler, Reply};
pub use error::HookError;
pub use store::{EventKind, PayloadStore};
pub use verifier::{Verification, Verifier};
