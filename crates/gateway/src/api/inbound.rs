//! Inbound connector contract.
//!
//! `POST /v1/inbound` accepts one normalized [`InboundEvent`] and runs it
//! through the chat engine exactly like a Telegram message. Replies go out
//! through the configured platform; the response only reports what the
//! engine did with the event.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

use crate::engine::Disposition;
use crate::platform::InboundEvent;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/inbound
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn inbound(State(state): State<AppState>, Json(event): Json<InboundEvent>) -> Response {
    if event.text.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "text must not be empty" })),
        )
            .into_response();
    }
    if !state.config.telegram.is_chat_allowed(event.chat_id) {
        return (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({ "error": "chat is not on the allow-list" })),
        )
            .into_response();
    }

    let chat_id = event.chat_id;
    let disposition = state.engine.handle_inbound(event).await;
    tracing::debug!(chat_id, ?disposition, "inbound event handled");

    let status = match disposition {
        Disposition::Batched { .. } => StatusCode::ACCEPTED,
        Disposition::Busy => StatusCode::CONFLICT,
        Disposition::Failed => StatusCode::BAD_GATEWAY,
        Disposition::Replied | Disposition::Silent => StatusCode::OK,
    };
    (status, Json(disposition)).into_response()
}
