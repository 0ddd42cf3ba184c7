pub mod health;
pub mod inbound;
pub mod sessions;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the HTTP router.
///
/// `/health` is a liveness probe; the `/v1` routes expose the session
/// registry and accept inbound events from connectors other than the
/// built-in Telegram poller.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/v1/sessions", get(sessions::list_sessions))
        .route("/v1/inbound", post(inbound::inbound))
        .layer(TraceLayer::new_for_http())
}
