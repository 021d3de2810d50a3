//! Notification payloads and composition.
//!
//! The composer maps domain events (live stream events, operator
//! messages, fallback ticks) onto the browser Notification options
//! shape; the dispatch engine serializes and delivers the result.

mod composer;
mod types;

pub use composer::{NotificationComposer, FALLBACK_TAG};
pub use types::{NotificationAction, NotificationPayload, StreamEvent};
