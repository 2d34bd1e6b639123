use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Error, Debug)]
pub enum BybitError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Decode error: {0}")]
    DecodeError(String),

    #[error("Rate limit exceeded: {message}")]
    RateLimitError {
        message: String,
        limit: Option<u64>,
        remaining: Option<u64>,
        reset_at_ms: Option<u64>,
    },

    #[error("API error: {code} - {message}")]
    BusinessError { code: i64, message: String },

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("Invalid private key: {0}")]
    KeyFormatError(String),

    #[error("Unsupported key type: {0}")]
    UnsupportedKeyType(String),

    #[error("Already subscribed: {0}")]
    DuplicateSubscription(String),

    #[error("No subscription registered for {0}")]
    UnregisteredTopic(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::core::config::ConfigError),
}

impl BybitError {
    /// Normal closure of a stream; a quiet termination signal rather than a failure.
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed)
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimitError { .. })
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::HttpError(_) | Self::NetworkError(_))
    }

    /// The exchange `retCode` for business errors and rate limits
    pub fn business_code(&self) -> Option<i64> {
        match self {
            Self::BusinessError { code, .. } => Some(*code),
            Self::RateLimitError { .. } => Some(crate::core::kernel::rest::RATE_LIMIT_RET_CODE),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for BybitError {
    fn from(err: serde_json::Error) -> Self {
        Self::DecodeError(err.to_string())
    }
}

impl From<tungstenite::Error> for BybitError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                Self::ConnectionClosed
            }
            other => Self::NetworkError(format!("WebSocket error: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_socket_maps_to_quiet_closure() {
        let err: BybitError = tungstenite::Error::ConnectionClosed.into();
        assert!(err.is_connection_closed());

        let err: BybitError = tungstenite::Error::AlreadyClosed.into();
        assert!(err.is_connection_closed());
    }

    #[test]
    fn test_protocol_error_is_transport() {
        let err: BybitError = tungstenite::Error::Protocol(
            tungstenite::error::ProtocolError::ResetWithoutClosingHandshake,
        )
        .into();
        assert!(err.is_transport());
        assert!(!err.is_connection_closed());
    }

    #[test]
    fn test_business_code() {
        let err = BybitError::BusinessError {
            code: 34036,
            message: "leverage not modified".to_string(),
        };
        assert_eq!(err.business_code(), Some(34036));
        assert!(!err.is_rate_limited());

        let err = BybitError::RateLimitError {
            message: "Too many visits!".to_string(),
            limit: None,
            remaining: None,
            reset_at_ms: None,
        };
        assert_eq!(err.business_code(), Some(10006));
        assert!(err.is_rate_limited());
    }

    #[test]
    fn test_json_error_is_decode_error() {
        let err: BybitError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, BybitError::DecodeError(_)));
    }
}
