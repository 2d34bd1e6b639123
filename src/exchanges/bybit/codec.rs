use crate::core::errors::BybitError;
use crate::core::kernel::{FrameKind, StreamCodec, TopicTable};
use crate::exchanges::bybit::types::{
    BybitDepthEvent, BybitExecutionReport, BybitKlineEvent, BybitOutboundAccountInfo,
    BybitTickerEvent, BybitTicketInfo, BybitTradeEvent,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;

/// Public spot topics
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PublicTopic {
    Trade,
    Depth,
    /// Candles for the given interval, e.g. `1m`
    Kline(String),
    /// Rolling 24h ticker
    Ticker,
}

impl PublicTopic {
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Trade => "trade",
            Self::Depth => "depth",
            Self::Kline(_) => "kline",
            Self::Ticker => "realtimes",
        }
    }
}

/// Routing key of a public subscription
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PublicTopicKey {
    pub topic: PublicTopic,
    pub symbol: String,
}

impl PublicTopicKey {
    pub fn new(topic: PublicTopic, symbol: impl Into<String>) -> Self {
        Self {
            topic,
            symbol: symbol.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SpotPublicEvent {
    Trade(BybitTradeEvent),
    Depth(BybitDepthEvent),
    Kline(BybitKlineEvent),
    Ticker(BybitTickerEvent),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PublicRequestParams<'a> {
    binary: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    kline_type: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct PublicRequest<'a> {
    symbol: &'a str,
    topic: &'a str,
    event: &'a str,
    params: PublicRequestParams<'a>,
}

/// Codec for the public spot stream, routed by the `topic` field
pub struct SpotPublicCodec {
    topics: TopicTable<PublicTopicKey, SpotPublicEvent>,
}

impl Default for SpotPublicCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl SpotPublicCodec {
    pub fn new() -> Self {
        Self {
            topics: TopicTable::new()
                .with("trade", parse_trade)
                .with("depth", parse_depth)
                .with("kline", parse_kline)
                .with("realtimes", parse_ticker),
        }
    }

    fn encode(key: &PublicTopicKey, event: &str) -> Result<Message, BybitError> {
        let kline_type = match &key.topic {
            PublicTopic::Kline(interval) => Some(interval.as_str()),
            _ => None,
        };

        let request = PublicRequest {
            symbol: &key.symbol,
            topic: key.topic.wire_name(),
            event,
            params: PublicRequestParams {
                binary: false,
                kline_type,
            },
        };

        let text = serde_json::to_string(&request).map_err(|e| {
            BybitError::InvalidParameters(format!("Failed to encode subscription: {}", e))
        })?;

        Ok(Message::Text(text))
    }
}

impl StreamCodec for SpotPublicCodec {
    type Key = PublicTopicKey;
    type Event = SpotPublicEvent;

    fn encode_subscription(&self, key: &PublicTopicKey) -> Result<Option<Message>, BybitError> {
        Self::encode(key, "sub").map(Some)
    }

    fn encode_unsubscription(&self, key: &PublicTopicKey) -> Result<Option<Message>, BybitError> {
        Self::encode(key, "cancel").map(Some)
    }

    fn classify(&self, frame: &Value) -> Option<FrameKind> {
        if frame.get("pong").is_some() {
            return Some(FrameKind::Control("pong".to_string()));
        }

        // Acknowledgements echo the request's `event` next to a `code`
        if let Some(event) = frame.get("event").and_then(Value::as_str) {
            return Some(FrameKind::Control(format!(
                "{} ack for {} {}: code {}",
                event,
                frame["topic"].as_str().unwrap_or_default(),
                frame["symbol"].as_str().unwrap_or_default(),
                frame["code"]
            )));
        }

        if let Some(topic) = frame.get("topic").and_then(Value::as_str) {
            return Some(FrameKind::Data(topic.to_string()));
        }

        frame
            .get("code")
            .map(|code| FrameKind::Control(format!("error {}: {}", code, frame["desc"])))
    }

    fn topics(&self) -> &TopicTable<PublicTopicKey, SpotPublicEvent> {
        &self.topics
    }
}

fn parse_trade(frame: &Value) -> Result<(PublicTopicKey, SpotPublicEvent), BybitError> {
    let event = BybitTradeEvent::deserialize(frame)?;
    let key = PublicTopicKey::new(PublicTopic::Trade, event.symbol.clone());
    Ok((key, SpotPublicEvent::Trade(event)))
}

fn parse_depth(frame: &Value) -> Result<(PublicTopicKey, SpotPublicEvent), BybitError> {
    let event = BybitDepthEvent::deserialize(frame)?;
    let key = PublicTopicKey::new(PublicTopic::Depth, event.symbol.clone());
    Ok((key, SpotPublicEvent::Depth(event)))
}

fn parse_kline(frame: &Value) -> Result<(PublicTopicKey, SpotPublicEvent), BybitError> {
    let event = BybitKlineEvent::deserialize(frame)?;
    let interval = event
        .params
        .kline_type
        .clone()
        .ok_or_else(|| BybitError::DecodeError("kline frame without klineType".to_string()))?;
    let key = PublicTopicKey::new(PublicTopic::Kline(interval), event.symbol.clone());
    Ok((key, SpotPublicEvent::Kline(event)))
}

fn parse_ticker(frame: &Value) -> Result<(PublicTopicKey, SpotPublicEvent), BybitError> {
    let event = BybitTickerEvent::deserialize(frame)?;
    let key = PublicTopicKey::new(PublicTopic::Ticker, event.symbol.clone());
    Ok((key, SpotPublicEvent::Ticker(event)))
}

/// Private spot event types, routed by the `e` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrivateTopic {
    OutboundAccountInfo,
    ExecutionReport,
    TicketInfo,
}

#[derive(Debug, Clone)]
pub enum SpotPrivateEvent {
    OutboundAccountInfo(Vec<BybitOutboundAccountInfo>),
    ExecutionReport(Vec<BybitExecutionReport>),
    TicketInfo(Vec<BybitTicketInfo>),
}

/// Codec for the private spot stream.
///
/// The server pushes every event after authentication, so subscriptions are
/// local registrations with no wire message.
pub struct SpotPrivateCodec {
    topics: TopicTable<PrivateTopic, SpotPrivateEvent>,
}

impl Default for SpotPrivateCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl SpotPrivateCodec {
    pub fn new() -> Self {
        Self {
            topics: TopicTable::new()
                .with("outboundAccountInfo", |frame| {
                    Ok((
                        PrivateTopic::OutboundAccountInfo,
                        SpotPrivateEvent::OutboundAccountInfo(Vec::deserialize(frame)?),
                    ))
                })
                .with("executionReport", |frame| {
                    Ok((
                        PrivateTopic::ExecutionReport,
                        SpotPrivateEvent::ExecutionReport(Vec::deserialize(frame)?),
                    ))
                })
                .with("ticketInfo", |frame| {
                    Ok((
                        PrivateTopic::TicketInfo,
                        SpotPrivateEvent::TicketInfo(Vec::deserialize(frame)?),
                    ))
                }),
        }
    }
}

impl StreamCodec for SpotPrivateCodec {
    type Key = PrivateTopic;
    type Event = SpotPrivateEvent;

    fn encode_subscription(&self, _key: &PrivateTopic) -> Result<Option<Message>, BybitError> {
        Ok(None)
    }

    fn encode_unsubscription(&self, _key: &PrivateTopic) -> Result<Option<Message>, BybitError> {
        Ok(None)
    }

    fn classify(&self, frame: &Value) -> Option<FrameKind> {
        if let Some(events) = frame.as_array() {
            return events
                .first()
                .and_then(|first| first.get("e"))
                .and_then(Value::as_str)
                .map(|e| FrameKind::Data(e.to_string()));
        }

        if frame.get("pong").is_some() {
            return Some(FrameKind::Control("pong".to_string()));
        }

        frame
            .get("auth")
            .map(|auth| FrameKind::Control(format!("auth {}", auth)))
    }

    fn topics(&self) -> &TopicTable<PrivateTopic, SpotPrivateEvent> {
        &self.topics
    }
}
