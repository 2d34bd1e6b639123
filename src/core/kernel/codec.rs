use crate::core::errors::BybitError;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use tokio_tungstenite::tungstenite::Message;

/// Parses a full frame for one discriminator into its routing key and event
pub type TopicParser<K, E> = fn(&Value) -> Result<(K, E), BybitError>;

/// Lookup table from discriminator value to a typed parser.
///
/// New topics are added by registering another parser, not by extending a
/// central match.
pub struct TopicTable<K, E> {
    parsers: HashMap<&'static str, TopicParser<K, E>>,
}

impl<K, E> Default for TopicTable<K, E> {
    fn default() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }
}

impl<K, E> TopicTable<K, E> {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, discriminator: &'static str, parser: TopicParser<K, E>) -> Self {
        self.parsers.insert(discriminator, parser);
        self
    }

    pub fn get(&self, discriminator: &str) -> Option<TopicParser<K, E>> {
        self.parsers.get(discriminator).copied()
    }

    pub fn discriminators(&self) -> impl Iterator<Item = &&'static str> {
        self.parsers.keys()
    }
}

/// What a frame is, judged from its discriminator alone
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    /// A data frame routed by this discriminator value
    Data(String),
    /// Subscription acknowledgements, pongs, auth replies
    Control(String),
}

/// Outcome of decoding one inbound frame
#[derive(Debug)]
pub enum Decoded<K, E> {
    Event { key: K, event: E },
    Control(String),
    Unknown(String),
}

/// Codec trait for exchange-specific stream message encoding/decoding
pub trait StreamCodec: Send + Sync + 'static {
    type Key: Eq + Hash + Clone + Debug + Send + Sync + 'static;
    type Event: Send + 'static;

    /// Wire message asking the server to start pushing `key`.
    ///
    /// `None` for streams that push every event without a subscription.
    fn encode_subscription(&self, key: &Self::Key) -> Result<Option<Message>, BybitError>;

    /// Wire message asking the server to stop pushing `key`
    fn encode_unsubscription(&self, key: &Self::Key) -> Result<Option<Message>, BybitError>;

    /// Inspect only the discriminator of a frame.
    ///
    /// `None` when the frame carries no recognisable discriminator at all.
    fn classify(&self, frame: &Value) -> Option<FrameKind>;

    fn topics(&self) -> &TopicTable<Self::Key, Self::Event>;

    /// Decode the discriminator first, then the payload through the table
    fn decode(&self, text: &str) -> Result<Decoded<Self::Key, Self::Event>, BybitError> {
        let frame: Value = serde_json::from_str(text)?;

        match self.classify(&frame) {
            Some(FrameKind::Control(description)) => Ok(Decoded::Control(description)),
            Some(FrameKind::Data(discriminator)) => match self.topics().get(&discriminator) {
                Some(parser) => {
                    let (key, event) = parser(&frame)?;
                    Ok(Decoded::Event { key, event })
                }
                None => Ok(Decoded::Unknown(discriminator)),
            },
            None => Ok(Decoded::Unknown(text.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoCodec {
        topics: TopicTable<String, i64>,
    }

    fn parse_number(frame: &Value) -> Result<(String, i64), BybitError> {
        let n = frame["n"]
            .as_i64()
            .ok_or_else(|| BybitError::DecodeError("missing n".to_string()))?;
        Ok(("number".to_string(), n))
    }

    impl StreamCodec for EchoCodec {
        type Key = String;
        type Event = i64;

        fn encode_subscription(&self, _key: &String) -> Result<Option<Message>, BybitError> {
            Ok(None)
        }

        fn encode_unsubscription(&self, _key: &String) -> Result<Option<Message>, BybitError> {
            Ok(None)
        }

        fn classify(&self, frame: &Value) -> Option<FrameKind> {
            if frame.get("pong").is_some() {
                return Some(FrameKind::Control("pong".to_string()));
            }
            frame
                .get("kind")
                .and_then(Value::as_str)
                .map(|kind| FrameKind::Data(kind.to_string()))
        }

        fn topics(&self) -> &TopicTable<String, i64> {
            &self.topics
        }
    }

    fn codec() -> EchoCodec {
        EchoCodec {
            topics: TopicTable::new().with("number", parse_number),
        }
    }

    #[test]
    fn test_decode_routes_through_table() {
        match codec().decode(r#"{"kind":"number","n":42}"#).unwrap() {
            Decoded::Event { key, event } => {
                assert_eq!(key, "number");
                assert_eq!(event, 42);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_discriminator() {
        assert!(matches!(
            codec().decode(r#"{"kind":"letters"}"#).unwrap(),
            Decoded::Unknown(ref d) if d == "letters"
        ));
        assert!(matches!(
            codec().decode(r#"{"other":1}"#).unwrap(),
            Decoded::Unknown(_)
        ));
    }

    #[test]
    fn test_control_frame() {
        assert!(matches!(
            codec().decode(r#"{"pong":1}"#).unwrap(),
            Decoded::Control(_)
        ));
    }

    #[test]
    fn test_bad_payload_for_known_topic_is_error() {
        assert!(matches!(
            codec().decode(r#"{"kind":"number"}"#),
            Err(BybitError::DecodeError(_))
        ));
        assert!(codec().decode("not json").is_err());
    }
}
