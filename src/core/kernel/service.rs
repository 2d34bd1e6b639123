use crate::core::errors::BybitError;
use crate::core::kernel::codec::{Decoded, StreamCodec};
use crate::core::kernel::event_loop::{EventLoop, EventLoopConfig};
use crate::core::kernel::registry::{Callback, SubscriptionRegistry};
use crate::core::kernel::ws::WsSession;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// A streaming session plus the per-key callbacks routed from it.
///
/// Shared by every stream kind: the codec decides the key and event types,
/// how subscriptions are encoded, and how frames are routed.
pub struct KeyedStreamService<C: StreamCodec> {
    session: WsSession,
    registry: SubscriptionRegistry<C::Key, C::Event>,
    codec: C,
}

impl<C: StreamCodec> KeyedStreamService<C> {
    pub fn new(session: WsSession, codec: C) -> Self {
        Self {
            session,
            registry: SubscriptionRegistry::new(),
            codec,
        }
    }

    pub fn session(&self) -> &WsSession {
        &self.session
    }

    pub fn registry(&self) -> &SubscriptionRegistry<C::Key, C::Event> {
        &self.registry
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Register `callback` for `key` and ask the server to start pushing it.
    ///
    /// The registration is rolled back if the request cannot be sent.
    pub async fn subscribe(
        &self,
        key: C::Key,
        callback: Callback<C::Event>,
    ) -> Result<(), BybitError> {
        let request = self.codec.encode_subscription(&key)?;
        self.registry.register(key.clone(), callback)?;

        if let Some(message) = request {
            if let Err(e) = self.session.send(message).await {
                self.registry.unregister(&key);
                return Err(e);
            }
        }

        debug!(?key, "subscribed");
        Ok(())
    }

    pub async fn unsubscribe(&self, key: &C::Key) -> Result<(), BybitError> {
        self.registry.unregister(key);

        if let Some(message) = self.codec.encode_unsubscription(key)? {
            self.session.send(message).await?;
        }

        debug!(?key, "unsubscribed");
        Ok(())
    }

    /// Read one frame and route it.
    ///
    /// Unknown discriminators and events for keys without a registration are
    /// logged and skipped; transport, decode and callback errors are returned.
    pub async fn run(&self) -> Result<(), BybitError> {
        let text = self.session.read_one().await?;

        match self.codec.decode(&text)? {
            Decoded::Event { key, event } => match self.registry.dispatch(&key, event) {
                Err(BybitError::UnregisteredTopic(key)) => {
                    warn!(%key, "event for unregistered subscription ignored");
                    Ok(())
                }
                other => other,
            },
            Decoded::Control(description) => {
                debug!(%description, "control frame");
                Ok(())
            }
            Decoded::Unknown(discriminator) => {
                warn!(%discriminator, "unknown stream discriminator ignored");
                Ok(())
            }
        }
    }

    /// Dispatch frames until the connection ends or an error occurs.
    ///
    /// A normal closure ends quietly; anything else is logged.
    pub async fn read_loop(&self) {
        loop {
            match self.run().await {
                Ok(()) => {}
                Err(e) if e.is_connection_closed() => {
                    debug!(url = %self.session.url(), "stream closed");
                    return;
                }
                Err(e) => {
                    error!(url = %self.session.url(), error = %e, "stream read loop terminated");
                    return;
                }
            }
        }
    }

    pub async fn ping(&self) -> Result<(), BybitError> {
        self.session.ping().await
    }

    pub async fn close(&self) -> Result<(), BybitError> {
        self.session.close_normal().await
    }

    /// Drive the session until `token` is cancelled or the connection ends
    pub async fn start(self: &Arc<Self>, token: CancellationToken) -> Result<(), BybitError> {
        EventLoop::new(Arc::clone(self), EventLoopConfig::default())
            .start(token)
            .await
    }

    /// Same as [`KeyedStreamService::start`] with explicit timings
    pub async fn start_with_config(
        self: &Arc<Self>,
        token: CancellationToken,
        config: EventLoopConfig,
    ) -> Result<(), BybitError> {
        EventLoop::new(Arc::clone(self), config).start(token).await
    }
}
