//! HTTP API for the web application and for operators.
//!
//! Link endpoints are called by the tournament tracker's web UI; mode and
//! session endpoints by operators and init routines; the update endpoint by
//! the messaging platform (webhook mode) or an external poller.

mod link;
mod ops;
mod server;

pub use server::{build_router, start_web_server, AppState};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::error::BotError;

impl IntoResponse for BotError {
    fn into_response(self) -> Response {
        let status = match &self {
            BotError::Validation { .. }
            | BotError::InvalidCode
            | BotError::CodeExpired
            | BotError::CodeAlreadyUsed
            | BotError::ChatAlreadyLinked { .. }
            | BotError::AccountNotFound { .. }
            | BotError::WebhookUrlMissing
            | BotError::ConfigValidation { .. } => StatusCode::BAD_REQUEST,
            BotError::Platform { .. }
            | BotError::StateSave { .. }
            | BotError::StateLoad { .. }
            | BotError::StateParse { .. }
            | BotError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(serde_json::json!({
            "error": self.kind(),
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}
