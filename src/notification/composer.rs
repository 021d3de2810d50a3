use uuid::Uuid;

use crate::config::NotificationConfig;

use super::{NotificationAction, NotificationPayload, StreamEvent};

/// Vibration pattern attached to every composed notification.
const VIBRATE_PATTERN: [u32; 3] = [300, 100, 400];

/// Tag carried by fallback-tick payloads, fixed so operators can
/// recognize liveness checks on the receiving client.
pub const FALLBACK_TAG: &str = "fallback-tick";

/// Builds transport-ready payloads from domain events.
///
/// Holds only immutable defaults taken from configuration; every method
/// is a pure function of its inputs, safe to call concurrently.
pub struct NotificationComposer {
    default_icon: String,
    badge: Option<String>,
    permalink_base: String,
}

impl NotificationComposer {
    pub fn new(config: &NotificationConfig) -> Self {
        Self {
            default_icon: config.default_icon.clone(),
            badge: config.badge.clone(),
            permalink_base: config.permalink_base.trim_end_matches('/').to_string(),
        }
    }

    fn actions() -> Vec<NotificationAction> {
        vec![
            NotificationAction::new("repost", "Repost"),
            NotificationAction::new("reply", "Reply"),
        ]
    }

    /// Compose from a live stream event.
    ///
    /// `tag` is the event's source id, so clients collapse repeated
    /// deliveries of the same event; `data` carries a permalink the
    /// client opens on notification click.
    pub fn from_stream_event(&self, event: &StreamEvent) -> NotificationPayload {
        NotificationPayload {
            title: event.author_name.clone(),
            body: event.text.clone(),
            icon: event.author_avatar_url.clone(),
            badge: self.badge.clone(),
            tag: event.source_id.clone(),
            dir: "auto".to_string(),
            lang: event.lang.clone(),
            renotify: true,
            require_interaction: true,
            actions: Self::actions(),
            vibrate: VIBRATE_PATTERN.to_vec(),
            data: serde_json::json!(format!("{}/{}", self.permalink_base, event.source_id)),
            image: event.media_url.clone(),
        }
    }

    /// Compose an operator-sent message.
    ///
    /// Tag is a fresh UUID: repeated manual sends are distinct
    /// notifications and must not collapse client-side.
    pub fn from_manual_message(&self, title: &str, body: &str) -> NotificationPayload {
        NotificationPayload {
            title: title.to_string(),
            body: body.to_string(),
            icon: self.default_icon.clone(),
            badge: self.badge.clone(),
            tag: Uuid::new_v4().to_string(),
            dir: "auto".to_string(),
            lang: "en".to_string(),
            renotify: false,
            require_interaction: false,
            actions: Vec::new(),
            vibrate: VIBRATE_PATTERN.to_vec(),
            data: serde_json::Value::Null,
            image: None,
        }
    }

    /// Fixed payload for periodic delivery-path checks.
    pub fn from_fallback_tick(&self) -> NotificationPayload {
        NotificationPayload {
            title: "Delivery check".to_string(),
            body: "The push delivery path is alive".to_string(),
            icon: self.default_icon.clone(),
            badge: self.badge.clone(),
            tag: FALLBACK_TAG.to_string(),
            dir: "auto".to_string(),
            lang: "en".to_string(),
            renotify: true,
            require_interaction: false,
            actions: Self::actions(),
            vibrate: VIBRATE_PATTERN.to_vec(),
            data: serde_json::json!("fallback"),
            image: None,
        }
    }
}
