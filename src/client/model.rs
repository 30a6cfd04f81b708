/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/5/25
******************************************************************************/
use crate::utils::LightstreamerError;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Represents the current status of the `LightstreamerClient`.
///
/// The textual form, e.g. `CONNECTED:WS-STREAMING`, is the one used by every Lightstreamer
/// client library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    Connecting,
    Connected(ConnectionType),
    /// No data received for longer than the keepalive plus the stalled timeout.
    Stalled,
    Disconnected(DisconnectionType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    HttpPolling,
    HttpStreaming,
    /// The transport is being negotiated.
    StreamSensing,
    WsPolling,
    WsStreaming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectionType {
    /// Disconnected on request, or after a fatal error. No reconnection will be attempted.
    Stopped,
    /// The connection was lost; a new session will be opened after the retry delay.
    WillRetry,
    /// The connection was lost; the client is trying to resume the same session.
    TryingRecovery,
}

impl Display for ClientStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ClientStatus::Connecting => write!(f, "CONNECTING"),
            ClientStatus::Connected(ConnectionType::StreamSensing) => {
                write!(f, "CONNECTED:STREAM-SENSING")
            }
            ClientStatus::Connected(ConnectionType::WsStreaming) => write!(f, "CONNECTED:WS-STREAMING"),
            ClientStatus::Connected(ConnectionType::HttpStreaming) => {
                write!(f, "CONNECTED:HTTP-STREAMING")
            }
            ClientStatus::Connected(ConnectionType::WsPolling) => write!(f, "CONNECTED:WS-POLLING"),
            ClientStatus::Connected(ConnectionType::HttpPolling) => write!(f, "CONNECTED:HTTP-POLLING"),
            ClientStatus::Stalled => write!(f, "STALLED"),
            ClientStatus::Disconnected(DisconnectionType::Stopped) => write!(f, "DISCONNECTED"),
            ClientStatus::Disconnected(DisconnectionType::WillRetry) => {
                write!(f, "DISCONNECTED:WILL-RETRY")
            }
            ClientStatus::Disconnected(DisconnectionType::TryingRecovery) => {
                write!(f, "DISCONNECTED:TRYING-RECOVERY")
            }
        }
    }
}

impl FromStr for ClientStatus {
    type Err = LightstreamerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match s {
            "CONNECTING" => ClientStatus::Connecting,
            "CONNECTED:STREAM-SENSING" => ClientStatus::Connected(ConnectionType::StreamSensing),
            "CONNECTED:WS-STREAMING" => ClientStatus::Connected(ConnectionType::WsStreaming),
            "CONNECTED:HTTP-STREAMING" => ClientStatus::Connected(ConnectionType::HttpStreaming),
            "CONNECTED:WS-POLLING" => ClientStatus::Connected(ConnectionType::WsPolling),
            "CONNECTED:HTTP-POLLING" => ClientStatus::Connected(ConnectionType::HttpPolling),
            "STALLED" => ClientStatus::Stalled,
            "DISCONNECTED" => ClientStatus::Disconnected(DisconnectionType::Stopped),
            "DISCONNECTED:WILL-RETRY" => ClientStatus::Disconnected(DisconnectionType::WillRetry),
            "DISCONNECTED:TRYING-RECOVERY" => {
                ClientStatus::Disconnected(DisconnectionType::TryingRecovery)
            }
            other => {
                return Err(LightstreamerError::illegal_argument(format!(
                    "unknown client status '{}'",
                    other
                )));
            }
        };
        Ok(status)
    }
}

/// The transport type to be used by the client.
/// - WS: the Stream-Sense algorithm is enabled as in the `None` case but the client will
///   only use WebSocket based connections. If a connection over WebSocket is not possible
///   because of the environment the client will not connect at all.
/// - HTTP: the Stream-Sense algorithm is enabled as in the `None` case but the client
///   will only use HTTP based connections. If a connection over HTTP is not possible because
///   of the environment the client will not connect at all.
/// - WS-STREAMING: the Stream-Sense algorithm is disabled and the client will only connect
///   on Streaming over WebSocket.
/// - HTTP-STREAMING, WS-POLLING, HTTP-POLLING: the Stream-Sense algorithm is disabled and
///   the client will only use the named transport.
///
/// This client speaks WebSocket streaming only: forcing an HTTP or polling transport makes
/// `LightstreamerClient::connect` fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// WebSocket transport with Stream-Sense algorithm enabled.
    Ws,
    /// HTTP transport with Stream-Sense algorithm enabled.
    Http,
    /// Streaming over WebSocket only.
    WsStreaming,
    /// Streaming over HTTP only.
    HttpStreaming,
    /// Polling over WebSocket only.
    WsPolling,
    /// Polling over HTTP only.
    HttpPolling,
}

impl Transport {
    pub(crate) fn is_supported(&self) -> bool {
        matches!(self, Transport::Ws | Transport::WsStreaming)
    }
}

impl Display for Transport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Ws => write!(f, "WS"),
            Transport::Http => write!(f, "HTTP"),
            Transport::WsStreaming => write!(f, "WS-STREAMING"),
            Transport::HttpStreaming => write!(f, "HTTP-STREAMING"),
            Transport::WsPolling => write!(f, "WS-POLLING"),
            Transport::HttpPolling => write!(f, "HTTP-POLLING"),
        }
    }
}

impl FromStr for Transport {
    type Err = LightstreamerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WS" => Ok(Transport::Ws),
            "HTTP" => Ok(Transport::Http),
            "WS-STREAMING" => Ok(Transport::WsStreaming),
            "HTTP-STREAMING" => Ok(Transport::HttpStreaming),
            "WS-POLLING" => Ok(Transport::WsPolling),
            "HTTP-POLLING" => Ok(Transport::HttpPolling),
            other => Err(LightstreamerError::illegal_argument(format!(
                "unknown transport '{}'",
                other
            ))),
        }
    }
}
