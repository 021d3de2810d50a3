use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::registry::{Subscription, SubscriptionKeys};
use crate::server::AppState;

/// Action-tagged subscription management request, mirroring the wire
/// format push clients already send.
#[derive(Debug, Deserialize)]
pub struct WebPushRequest {
    /// "subscribe" or "unsubscribe"; anything else is rejected.
    pub action: String,
    /// Full descriptor; required for subscribe.
    pub subscription: Option<SubscriptionDescriptor>,
    /// Optional display identity for targeted sends.
    pub owner: Option<String>,
    /// Bare endpoint; unsubscribe accepts this instead of the full
    /// descriptor.
    pub endpoint: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionDescriptor {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
}

#[derive(Debug, Serialize)]
pub struct WebPushResponse {
    pub text: String,
    /// Subscribe: whether a new entry was added. Unsubscribe: whether
    /// one was found and removed.
    pub changed: bool,
    pub total: usize,
}

/// Operator-sent message.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub title: Option<String>,
    pub body: Option<String>,
    /// When present and non-empty, deliver only to these owners.
    pub target_owners: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub success: bool,
    pub attempted: usize,
    pub notified: usize,
    pub failed: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct InjectEventResponse {
    pub accepted: bool,
}

/// Subscribe/unsubscribe entry point.
///
/// Validation precedes mutation: a rejected request changes nothing.
pub async fn webpush(
    State(state): State<AppState>,
    Json(request): Json<WebPushRequest>,
) -> Result<Json<WebPushResponse>> {
    match request.action.as_str() {
        "subscribe" => {
            let descriptor = request
                .subscription
                .ok_or_else(|| AppError::Validation("Subscription is required".to_string()))?;
            if descriptor.endpoint.is_empty() {
                return Err(AppError::Validation(
                    "Subscription endpoint must not be empty".to_string(),
                ));
            }

            let mut subscription = Subscription::new(descriptor.endpoint, descriptor.keys);
            if let Some(owner) = request.owner.filter(|o| !o.is_empty()) {
                subscription = subscription.with_owner(owner);
            }

            let outcome = state.registry.add(subscription).await;
            Ok(Json(WebPushResponse {
                text: "Subscribed".to_string(),
                changed: !outcome.already_existed,
                total: state.registry.count().await,
            }))
        }
        "unsubscribe" => {
            let endpoint = request
                .endpoint
                .or_else(|| request.subscription.map(|s| s.endpoint))
                .filter(|e| !e.is_empty())
                .ok_or_else(|| AppError::Validation("Endpoint is required".to_string()))?;

            let found = state.registry.remove(&endpoint).await;
            Ok(Json(WebPushResponse {
                text: "Unsubscribed".to_string(),
                changed: found,
                total: state.registry.count().await,
            }))
        }
        other => Err(AppError::UnsupportedAction(other.to_string())),
    }
}

/// Manual broadcast or targeted send.
pub async fn send_message(
    State(state): State<AppState>,
    Json(request): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>> {
    let title = request
        .title
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Validation("Message title is required".to_string()))?;
    let body = request
        .body
        .filter(|b| !b.is_empty())
        .ok_or_else(|| AppError::Validation("Message text is required".to_string()))?;

    let payload = state.composer.from_manual_message(&title, &body);

    // An explicit empty target list is a caller bug, not a broadcast:
    // a targeted send never silently widens to the whole registry.
    let report = match request.target_owners {
        Some(owners) if owners.is_empty() => {
            return Err(AppError::Validation(
                "target_owners must not be empty when present".to_string(),
            ));
        }
        Some(owners) => state.engine.send_to_owners(&payload, &owners).await,
        None => state.engine.broadcast(&payload).await,
    };

    Ok(Json(SendMessageResponse {
        success: report.failed == 0,
        attempted: report.attempted,
        notified: report.succeeded,
        failed: report.failed,
        timestamp: Utc::now(),
    }))
}

/// Raw stream-event injection; stands in for the live stream source.
/// Fire-and-forget: accepted events are processed asynchronously.
pub async fn inject_event(
    State(state): State<AppState>,
    Json(raw): Json<serde_json::Value>,
) -> Result<(StatusCode, Json<InjectEventResponse>)> {
    state
        .event_tx
        .send(raw)
        .await
        .map_err(|_| AppError::Internal("Stream ingester is not running".to_string()))?;

    Ok((StatusCode::ACCEPTED, Json(InjectEventResponse { accepted: true })))
}
