use std::sync::Arc;

use async_trait::async_trait;
use web_push::{
    ContentEncoding, SubscriptionInfo, VapidSignatureBuilder, WebPushClient, WebPushError,
    WebPushMessageBuilder, URL_SAFE_NO_PAD,
};

use crate::config::VapidConfig;
use crate::registry::Subscription;

use super::{PushError, PushTransport};

/// VAPID-signed Web Push delivery via the `web-push` crate.
#[derive(Clone)]
pub struct WebPushTransport {
    vapid: VapidConfig,
    client: Arc<WebPushClient>,
}

impl WebPushTransport {
    pub fn new(vapid: VapidConfig) -> Result<Self, WebPushError> {
        let client = WebPushClient::new()?;
        Ok(Self {
            vapid,
            client: Arc::new(client),
        })
    }

    fn build_message(
        &self,
        subscription: &Subscription,
        payload: &[u8],
    ) -> Result<web_push::WebPushMessage, WebPushError> {
        let subscription_info = SubscriptionInfo::new(
            subscription.endpoint.clone(),
            subscription.keys.p256dh.clone(),
            subscription.keys.auth.clone(),
        );
        let mut builder = WebPushMessageBuilder::new(&subscription_info)?;
        builder.set_payload(ContentEncoding::Aes128Gcm, payload);
        let mut signature_builder = VapidSignatureBuilder::from_base64(
            &self.vapid.private_key,
            URL_SAFE_NO_PAD,
            &subscription_info,
        )?;
        signature_builder.add_claim("sub", self.vapid.subject.as_str());
        builder.set_vapid_signature(signature_builder.build()?);
        builder.build()
    }
}

#[async_trait]
impl PushTransport for WebPushTransport {
    async fn deliver(&self, subscription: &Subscription, payload: &[u8]) -> Result<(), PushError> {
        let message = self
            .build_message(subscription, payload)
            .map_err(classify_error)?;
        self.client.send(message).await.map_err(classify_error)
    }
}

fn classify_error(err: WebPushError) -> PushError {
    match err {
        WebPushError::EndpointNotValid | WebPushError::EndpointNotFound => PushError::EndpointGone,
        WebPushError::PayloadTooLarge => PushError::Payload(err.to_string()),
        other => PushError::Transient(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert_eq!(
            classify_error(WebPushError::EndpointNotFound),
            PushError::EndpointGone
        );
        assert_eq!(
            classify_error(WebPushError::EndpointNotValid),
            PushError::EndpointGone
        );
        assert!(matches!(
            classify_error(WebPushError::PayloadTooLarge),
            PushError::Payload(_)
        ));
        assert!(matches!(
            classify_error(WebPushError::Unauthorized),
            PushError::Transient(_)
        ));
    }
}
