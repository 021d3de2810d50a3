use axum::{
    routing::{get, post},
    Router,
};

use crate::server::AppState;

use super::handlers::{inject_event, send_message, webpush};
use super::health::{health, stats};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health & Stats
        .route("/health", get(health))
        .route("/stats", get(stats))
        // Subscription management (action-tagged, client-facing)
        .route("/webpush", post(webpush))
        .nest(
            "/api/v1",
            Router::new()
                // Operator sends
                .route("/notifications/send", post(send_message))
                // Stream-source stand-in
                .route("/events", post(inject_event)),
        )
}
