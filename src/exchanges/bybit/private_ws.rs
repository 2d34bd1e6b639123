use crate::core::errors::BybitError;
use crate::core::kernel::rest::current_timestamp_ms;
use crate::core::kernel::{
    EventLoopConfig, KeyedStreamService, SessionState, Signer, SubscriptionRegistry, WsConfig,
    WsSession,
};
use crate::exchanges::bybit::codec::{PrivateTopic, SpotPrivateCodec, SpotPrivateEvent};
use crate::exchanges::bybit::types::{
    BybitExecutionReport, BybitOutboundAccountInfo, BybitTicketInfo,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Lifetime of a stream authentication signature
pub const AUTH_EXPIRY_MS: u64 = 10_000;

/// Build the `auth` request for the private stream.
///
/// The signed message is `GET/realtime` followed by `expires`, signed with the
/// same scheme the signer uses for REST requests.
pub fn auth_message(signer: &dyn Signer, expires: u64) -> Result<String, BybitError> {
    let signature = signer.sign(format!("GET/realtime{}", expires).as_bytes())?;

    let request = serde_json::json!({
        "op": "auth",
        "args": [signer.api_key(), expires, signature],
    });

    Ok(request.to_string())
}

/// Authenticated spot stream carrying account, order and fill updates.
///
/// The server pushes every event type once authenticated; subscribing only
/// attaches a local callback.
#[derive(Clone)]
pub struct SpotPrivateStream {
    service: Arc<KeyedStreamService<SpotPrivateCodec>>,
    signer: Arc<dyn Signer>,
}

impl SpotPrivateStream {
    /// Connect and authenticate
    pub async fn connect(url: &str, signer: Arc<dyn Signer>) -> Result<Self, BybitError> {
        Self::connect_with_config(url, signer, &WsConfig::default()).await
    }

    pub async fn connect_with_config(
        url: &str,
        signer: Arc<dyn Signer>,
        config: &WsConfig,
    ) -> Result<Self, BybitError> {
        let session = WsSession::connect(url, config).await?;
        let stream = Self {
            service: Arc::new(KeyedStreamService::new(session, SpotPrivateCodec::new())),
            signer,
        };

        stream.authenticate().await?;
        Ok(stream)
    }

    /// Send the auth request; the reply arrives as a control frame on the read path
    #[instrument(skip(self), fields(url = %self.service.session().url()))]
    pub async fn authenticate(&self) -> Result<(), BybitError> {
        let expires = current_timestamp_ms() + AUTH_EXPIRY_MS;
        let message = auth_message(self.signer.as_ref(), expires)?;
        self.service.session().send_text(message).await?;
        debug!(expires, "auth request sent");
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.service.session().state()
    }

    pub fn registry(&self) -> &SubscriptionRegistry<PrivateTopic, SpotPrivateEvent> {
        self.service.registry()
    }

    pub async fn subscribe_outbound_account_info<F>(&self, callback: F) -> Result<(), BybitError>
    where
        F: Fn(Vec<BybitOutboundAccountInfo>) -> Result<(), BybitError> + Send + Sync + 'static,
    {
        self.subscribe_with(PrivateTopic::OutboundAccountInfo, move |event| match event {
            SpotPrivateEvent::OutboundAccountInfo(info) => callback(info),
            _ => Err(mismatched(PrivateTopic::OutboundAccountInfo)),
        })
        .await
    }

    pub async fn subscribe_execution_report<F>(&self, callback: F) -> Result<(), BybitError>
    where
        F: Fn(Vec<BybitExecutionReport>) -> Result<(), BybitError> + Send + Sync + 'static,
    {
        self.subscribe_with(PrivateTopic::ExecutionReport, move |event| match event {
            SpotPrivateEvent::ExecutionReport(reports) => callback(reports),
            _ => Err(mismatched(PrivateTopic::ExecutionReport)),
        })
        .await
    }

    pub async fn subscribe_ticket_info<F>(&self, callback: F) -> Result<(), BybitError>
    where
        F: Fn(Vec<BybitTicketInfo>) -> Result<(), BybitError> + Send + Sync + 'static,
    {
        self.subscribe_with(PrivateTopic::TicketInfo, move |event| match event {
            SpotPrivateEvent::TicketInfo(tickets) => callback(tickets),
            _ => Err(mismatched(PrivateTopic::TicketInfo)),
        })
        .await
    }

    pub async fn unsubscribe(&self, topic: PrivateTopic) -> Result<(), BybitError> {
        self.service.unsubscribe(&topic).await
    }

    pub async fn run(&self) -> Result<(), BybitError> {
        self.service.run().await
    }

    pub async fn start(&self, token: CancellationToken) -> Result<(), BybitError> {
        self.service.start(token).await
    }

    pub async fn start_with_config(
        &self,
        token: CancellationToken,
        config: EventLoopConfig,
    ) -> Result<(), BybitError> {
        self.service.start_with_config(token, config).await
    }

    pub async fn close(&self) -> Result<(), BybitError> {
        self.service.close().await
    }

    async fn subscribe_with<F>(&self, topic: PrivateTopic, callback: F) -> Result<(), BybitError>
    where
        F: Fn(SpotPrivateEvent) -> Result<(), BybitError> + Send + Sync + 'static,
    {
        self.service.subscribe(topic, Arc::new(callback)).await
    }
}

fn mismatched(topic: PrivateTopic) -> BybitError {
    BybitError::DecodeError(format!("unexpected event routed to {:?}", topic))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::kernel::HmacSigner;
    use serde_json::Value;

    #[test]
    fn test_auth_message_shape_and_signature() {
        let signer = HmacSigner::new(
            "0s4stkea3xIc44bYoq".to_string(),
            "test_secret_key".to_string(),
            5000,
        );

        let message = auth_message(&signer, 1_658_384_324_791).unwrap();
        let value: Value = serde_json::from_str(&message).unwrap();

        assert_eq!(value["op"], "auth");
        assert_eq!(value["args"][0], "0s4stkea3xIc44bYoq");
        assert_eq!(value["args"][1], 1_658_384_324_791_u64);
        assert_eq!(
            value["args"][2],
            "846b12e1b6ee1c67f454b47e4d146c335f939bdb8c93a401bfb4260bca739306"
        );
    }
}
