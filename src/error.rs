use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::chat::ChatError;
use crate::parser::ParseError;
use crate::store::StoreError;
use crate::verifier::RejectReason;

/// Per-request failure. Every variant is handled at the request boundary.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(RejectReason),

    #[error("malformed request: {0}")]
    Malformed(#[from] ParseError),

    #[error("payload is missing {0}")]
    MissingField(&'static str),

    #[error("{0}")]
    Storage(#[from] StoreError),

    #[error("{0}")]
    Chat(#[from] ChatError),
}

impl HookError {
    pub fn status(&self) -> StatusCode {
        match self {
            HookError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            HookError::Malformed(_) | HookError::MissingField(_) => StatusCode::BAD_REQUEST,
            HookError::Storage(_) | HookError::Chat(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HookError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
