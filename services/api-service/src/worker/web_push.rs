use async_trait::async_trait;
use common::VapidConfig;
use contracts::WebPushPayload;
use web_push::{
    ContentEncoding, IsahcWebPushClient, SubscriptionInfo, VapidSignatureBuilder, WebPushClient,
    WebPushMessageBuilder, URL_SAFE_NO_PAD,
};

use super::push::{PushError, PushGateway, PushJob};

const PUSH_TTL_SECS: u32 = 30;

/// Delivers push jobs through the browser vendors' Web Push endpoints,
/// signed with the configured VAPID key.
pub struct WebPushGateway {
    client: IsahcWebPushClient,
    vapid: VapidConfig,
}

impl WebPushGateway {
    pub fn new(vapid: VapidConfig) -> Result<Self, PushError> {
        let client = IsahcWebPushClient::new().map_err(|e| PushError::Gateway(e.to_string()))?;
        Ok(Self { client, vapid })
    }
}

#[async_trait]
impl PushGateway for WebPushGateway {
    async fn deliver(&self, job: &PushJob) -> Result<(), PushError> {
        let payload = serde_json::to_vec(&WebPushPayload {
            title: job.title.clone(),
            message: job.message.clone(),
        })
        .map_err(|e| PushError::Payload(e.to_string()))?;

        let info = SubscriptionInfo::new(
            &job.subscription.endpoint,
            &job.subscription.p256dh,
            &job.subscription.auth,
        );

        let mut signature =
            VapidSignatureBuilder::from_base64(&self.vapid.private_key, URL_SAFE_NO_PAD, &info)
                .map_err(|e| PushError::Gateway(e.to_string()))?;
        signature.add_claim("sub", format!("mailto:{}", self.vapid.email));
        let signature = signature
            .build()
            .map_err(|e| PushError::Gateway(e.to_string()))?;

        let mut builder = WebPushMessageBuilder::new(&info);
        builder.set_payload(ContentEncoding::Aes128Gcm, &payload);
        builder.set_ttl(PUSH_TTL_SECS);
        builder.set_vapid_signature(signature);
        let message = builder
            .build()
            .map_err(|e| PushError::Gateway(e.to_string()))?;

        self.client
            .send(message)
            .await
            .map_err(|e| PushError::Gateway(e.to_string()))
    }
}
