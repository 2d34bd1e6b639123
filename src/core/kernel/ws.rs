use crate::core::errors::BybitError;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, instrument};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket configuration
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// How long to wait for the transport to end once close frames crossed
    pub close_timeout_ms: u64,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            close_timeout_ms: 500,
        }
    }
}

/// Lifecycle of a streaming connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl SessionState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// One duplex streaming connection.
///
/// The write half and the read half are locked independently, so the read
/// task can stay parked in [`WsSession::read_one`] while the driving loop
/// sends heartbeats, subscriptions or the close frame.
pub struct WsSession {
    url: String,
    state: AtomicU8,
    close_timeout: Duration,
    writer: Mutex<SplitSink<WsStream, Message>>,
    reader: Mutex<SplitStream<WsStream>>,
}

impl std::fmt::Debug for WsSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsSession")
            .field("url", &self.url)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl WsSession {
    /// Perform the handshake and return an open session
    #[instrument(skip(config))]
    pub async fn connect(url: &str, config: &WsConfig) -> Result<Self, BybitError> {
        let connect_timeout = Duration::from_millis(config.connect_timeout_ms);

        let (stream, _) = tokio::time::timeout(connect_timeout, connect_async(url))
            .await
            .map_err(|_| BybitError::NetworkError("WebSocket connection timeout".to_string()))?
            .map_err(|e| BybitError::NetworkError(format!("WebSocket connection failed: {}", e)))?;

        let (write, read) = stream.split();
        debug!("WebSocket connected");

        Ok(Self {
            url: url.to_string(),
            state: AtomicU8::new(SessionState::Open as u8),
            close_timeout: Duration::from_millis(config.close_timeout_ms),
            writer: Mutex::new(write),
            reader: Mutex::new(read),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Move to `Closing` unless the session is already past it
    fn begin_closing(&self) {
        let _ = self.state.compare_exchange(
            SessionState::Open as u8,
            SessionState::Closing as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Write a text or control frame
    #[instrument(skip(self, message), fields(url = %self.url))]
    pub async fn send(&self, message: Message) -> Result<(), BybitError> {
        if !self.is_open() {
            return Err(BybitError::ConnectionClosed);
        }

        let mut writer = self.writer.lock().await;
        writer.send(message).await.map_err(|e| {
            self.set_state(SessionState::Closed);
            BybitError::from(e)
        })
    }

    pub async fn send_text(&self, text: String) -> Result<(), BybitError> {
        self.send(Message::Text(text)).await
    }

    pub async fn ping(&self) -> Result<(), BybitError> {
        self.send(Message::Ping(Vec::new())).await
    }

    /// Block until one data frame arrives.
    ///
    /// Ping and pong frames are consumed here. A close frame, whether it
    /// starts the closing handshake or answers ours, moves the session to
    /// `Closing`; the stream is then drained so the reply gets flushed and the
    /// transport released, and the session ends `Closed`. A normal closure
    /// yields [`BybitError::ConnectionClosed`].
    pub async fn read_one(&self) -> Result<String, BybitError> {
        let mut reader = self.reader.lock().await;

        loop {
            match reader.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text),
                Some(Ok(Message::Binary(data))) => {
                    return String::from_utf8(data).map_err(|e| {
                        BybitError::DecodeError(format!("Binary frame is not UTF-8: {}", e))
                    });
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    self.begin_closing();
                    let error = close_error(frame.as_ref());

                    // Polling past the close frame flushes the queued reply
                    // and ends once the transport is gone.
                    let drained = tokio::time::timeout(self.close_timeout, async {
                        while let Some(Ok(_)) = reader.next().await {}
                    })
                    .await;
                    if drained.is_err() {
                        debug!("transport still open after close handshake");
                    }

                    self.set_state(SessionState::Closed);
                    return Err(error);
                }
                Some(Err(e)) => {
                    self.set_state(SessionState::Closed);
                    return Err(e.into());
                }
                None => {
                    self.set_state(SessionState::Closed);
                    return Err(BybitError::ConnectionClosed);
                }
            }
        }
    }

    /// Send a close frame; does not wait for the peer's acknowledgement
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn close(&self, code: CloseCode, reason: &str) -> Result<(), BybitError> {
        if !self.is_open() {
            return Err(BybitError::ConnectionClosed);
        }

        let frame = CloseFrame {
            code,
            reason: reason.to_string().into(),
        };

        let mut writer = self.writer.lock().await;
        self.set_state(SessionState::Closing);
        writer.send(Message::Close(Some(frame))).await.map_err(|e| {
            self.set_state(SessionState::Closed);
            BybitError::from(e)
        })
    }

    /// Close with the normal-closure code and an empty reason
    pub async fn close_normal(&self) -> Result<(), BybitError> {
        self.close(CloseCode::Normal, "").await
    }
}

fn close_error(frame: Option<&CloseFrame<'_>>) -> BybitError {
    match frame {
        None => BybitError::ConnectionClosed,
        Some(frame) if frame.code == CloseCode::Normal || frame.code == CloseCode::Away => {
            BybitError::ConnectionClosed
        }
        Some(frame) => BybitError::NetworkError(format!(
            "Connection closed by peer: {} {}",
            u16::from(frame.code),
            frame.reason
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trip() {
        for state in [
            SessionState::Connecting,
            SessionState::Open,
            SessionState::Closing,
            SessionState::Closed,
        ] {
            assert_eq!(SessionState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn test_close_error_classification() {
        assert!(close_error(None).is_connection_closed());

        let normal = CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        };
        assert!(close_error(Some(&normal)).is_connection_closed());

        let abnormal = CloseFrame {
            code: CloseCode::Policy,
            reason: "bye".into(),
        };
        assert!(close_error(Some(&abnormal)).is_transport());
    }

    #[tokio::test]
    async fn test_connect_refused_is_network_error() {
        let config = WsConfig {
            connect_timeout_ms: 2_000,
            ..WsConfig::default()
        };
        let err = WsSession::connect("ws://127.0.0.1:1", &config)
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }
}
