//! Push transport: hands a serialized payload plus a subscription
//! descriptor to the Web Push protocol machinery.

mod web_push_transport;

use async_trait::async_trait;
use thiserror::Error;

use crate::registry::Subscription;

pub use web_push_transport::WebPushTransport;

/// Typed failure of a single delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PushError {
    /// The push service reports the endpoint is gone or was never
    /// valid; retrying can never succeed.
    #[error("endpoint gone or invalid")]
    EndpointGone,

    /// The payload was rejected (too large, encryption failure).
    #[error("payload rejected: {0}")]
    Payload(String),

    /// Anything that might succeed on a later attempt.
    #[error("transient delivery failure: {0}")]
    Transient(String),
}

impl PushError {
    /// Permanent failures signal that the subscription may be pruned.
    pub fn is_permanent(&self) -> bool {
        matches!(self, PushError::EndpointGone)
    }
}

/// Performs the actual encrypted transmission to one endpoint.
///
/// Implementations own their transport-level timeout; a `deliver` call
/// never blocks indefinitely.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn deliver(&self, subscription: &Subscription, payload: &[u8]) -> Result<(), PushError>;
}
