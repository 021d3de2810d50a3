use serde::{Deserialize, Serialize};

/// One action button on a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

impl NotificationAction {
    pub fn new(action: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            title: title.into(),
        }
    }
}

/// A transport-ready notification, field-compatible with the browser
/// Notification API options object.
///
/// Built fresh per event and immutable once composed. `tag` is the
/// client-side deduplication key: the receiving browser collapses
/// notifications sharing a tag, so re-delivery of the same source event
/// is visually idempotent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub icon: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    pub tag: String,
    pub dir: String,
    pub lang: String,
    pub renotify: bool,
    pub require_interaction: bool,
    pub actions: Vec<NotificationAction>,
    pub vibrate: Vec<u32>,
    /// Opaque value forwarded to the client, opened on notification
    /// click (a permalink for stream events).
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Wire wrapper: service workers expect `{"notification": {...}}`.
#[derive(Debug, Serialize)]
struct PushMessage<'a> {
    notification: &'a NotificationPayload,
}

impl NotificationPayload {
    /// Serialize for the push transport.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&PushMessage { notification: self })
    }
}

/// A validated event from the live stream. Consumed once by the
/// composer, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    pub source_id: String,
    pub author_name: String,
    pub author_avatar_url: String,
    pub text: String,
    pub lang: String,
    pub timestamp_ms: u64,
    pub media_url: Option<String>,
}
