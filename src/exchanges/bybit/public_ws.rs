use crate::core::errors::BybitError;
use crate::core::kernel::{
    EventLoopConfig, KeyedStreamService, SessionState, SubscriptionRegistry, WsConfig, WsSession,
};
use crate::exchanges::bybit::codec::{PublicTopic, PublicTopicKey, SpotPublicCodec, SpotPublicEvent};
use crate::exchanges::bybit::types::{
    BybitDepthEvent, BybitKlineEvent, BybitTickerEvent, BybitTradeEvent,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Public spot market-data stream.
///
/// One callback per topic and symbol; subscribing twice to the same pair
/// fails with [`BybitError::DuplicateSubscription`].
#[derive(Clone)]
pub struct SpotPublicStream {
    service: Arc<KeyedStreamService<SpotPublicCodec>>,
}

impl SpotPublicStream {
    pub async fn connect(url: &str) -> Result<Self, BybitError> {
        Self::connect_with_config(url, &WsConfig::default()).await
    }

    pub async fn connect_with_config(url: &str, config: &WsConfig) -> Result<Self, BybitError> {
        let session = WsSession::connect(url, config).await?;
        Ok(Self {
            service: Arc::new(KeyedStreamService::new(session, SpotPublicCodec::new())),
        })
    }

    pub fn state(&self) -> SessionState {
        self.service.session().state()
    }

    pub fn registry(&self) -> &SubscriptionRegistry<PublicTopicKey, SpotPublicEvent> {
        self.service.registry()
    }

    pub async fn subscribe_trade<F>(&self, symbol: &str, callback: F) -> Result<(), BybitError>
    where
        F: Fn(BybitTradeEvent) -> Result<(), BybitError> + Send + Sync + 'static,
    {
        self.subscribe_with(PublicTopic::Trade, symbol, move |event| match event {
            SpotPublicEvent::Trade(trade) => callback(trade),
            other => Err(mismatched(&other)),
        })
        .await
    }

    pub async fn subscribe_depth<F>(&self, symbol: &str, callback: F) -> Result<(), BybitError>
    where
        F: Fn(BybitDepthEvent) -> Result<(), BybitError> + Send + Sync + 'static,
    {
        self.subscribe_with(PublicTopic::Depth, symbol, move |event| match event {
            SpotPublicEvent::Depth(depth) => callback(depth),
            other => Err(mismatched(&other)),
        })
        .await
    }

    /// Candles for `symbol` at `interval` (`1m`, `5m`, `1h`, `1d`, ...)
    pub async fn subscribe_kline<F>(
        &self,
        symbol: &str,
        interval: &str,
        callback: F,
    ) -> Result<(), BybitError>
    where
        F: Fn(BybitKlineEvent) -> Result<(), BybitError> + Send + Sync + 'static,
    {
        let topic = PublicTopic::Kline(interval.to_string());
        self.subscribe_with(topic, symbol, move |event| match event {
            SpotPublicEvent::Kline(kline) => callback(kline),
            other => Err(mismatched(&other)),
        })
        .await
    }

    pub async fn subscribe_ticker<F>(&self, symbol: &str, callback: F) -> Result<(), BybitError>
    where
        F: Fn(BybitTickerEvent) -> Result<(), BybitError> + Send + Sync + 'static,
    {
        self.subscribe_with(PublicTopic::Ticker, symbol, move |event| match event {
            SpotPublicEvent::Ticker(ticker) => callback(ticker),
            other => Err(mismatched(&other)),
        })
        .await
    }

    pub async fn unsubscribe_trade(&self, symbol: &str) -> Result<(), BybitError> {
        self.unsubscribe(PublicTopic::Trade, symbol).await
    }

    pub async fn unsubscribe_depth(&self, symbol: &str) -> Result<(), BybitError> {
        self.unsubscribe(PublicTopic::Depth, symbol).await
    }

    pub async fn unsubscribe_kline(&self, symbol: &str, interval: &str) -> Result<(), BybitError> {
        self.unsubscribe(PublicTopic::Kline(interval.to_string()), symbol)
            .await
    }

    pub async fn unsubscribe_ticker(&self, symbol: &str) -> Result<(), BybitError> {
        self.unsubscribe(PublicTopic::Ticker, symbol).await
    }

    /// Read and dispatch a single frame
    pub async fn run(&self) -> Result<(), BybitError> {
        self.service.run().await
    }

    /// Drive the stream until `token` is cancelled or the connection ends
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

    /// Send a normal close frame
    pub async fn close(&self) -> Result<(), BybitError> {
        self.service.close().await
    }

    async fn subscribe_with<F>(
        &self,
        topic: PublicTopic,
        symbol: &str,
        callback: F,
    ) -> Result<(), BybitError>
    where
        F: Fn(SpotPublicEvent) -> Result<(), BybitError> + Send + Sync + 'static,
    {
        self.service
            .subscribe(PublicTopicKey::new(topic, symbol), Arc::new(callback))
            .await
    }

    async fn unsubscribe(&self, topic: PublicTopic, symbol: &str) -> Result<(), BybitError> {
        self.service
            .unsubscribe(&PublicTopicKey::new(topic, symbol))
            .await
    }
}

fn mismatched(event: &SpotPublicEvent) -> BybitError {
    let topic = match event {
        SpotPublicEvent::Trade(_) => "trade",
        SpotPublicEvent::Depth(_) => "depth",
        SpotPublicEvent::Kline(_) => "kline",
        SpotPublicEvent::Ticker(_) => "realtimes",
    };
    BybitError::DecodeError(format!("{} event routed to the wrong subscription", topic))
}
