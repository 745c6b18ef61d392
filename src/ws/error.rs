#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use crate::error::Kind;

/// WebSocket error variants.
#[non_exhaustive]
#[derive(Debug)]
pub enum WsError {
    /// Error connecting to or communicating with the WebSocket server
    Connection(tokio_tungstenite::tungstenite::Error),
    /// The endpoint is not a usable `ws://` or `wss://` URL
    InvalidEndpoint {
        endpoint: String,
        reason: String,
    },
    /// WebSocket connection was closed
    ConnectionClosed,
    /// Connection attempt did not complete in time
    ConnectTimeout(Duration),
    /// No PONG arrived within the heartbeat timeout
    HeartbeatTimeout(Duration),
}

impl WsError {
    /// Classify this error into the crate-wide error taxonomy.
    #[must_use]
    pub fn kind(&self) -> Kind {
        match self {
            Self::InvalidEndpoint { .. } => Kind::Configuration,
            Self::Connection(tokio_tungstenite::tungstenite::Error::Url(_)) => Kind::Configuration,
            _ => Kind::Transport,
        }
    }
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "WebSocket connection error: {e}"),
            Self::InvalidEndpoint { endpoint, reason } => {
                write!(f, "Invalid WebSocket endpoint {endpoint:?}: {reason}")
            }
            Self::ConnectionClosed => write!(f, "WebSocket connection closed"),
            Self::ConnectTimeout(after) => {
                write!(f, "WebSocket connection attempt timed out after {after:?}")
            }
            Self::HeartbeatTimeout(after) => {
                write!(f, "Heartbeat timeout: no PONG received within {after:?}")
            }
        }
    }
}

impl StdError for WsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Connection(e) => Some(e),
            _ => None,
        }
    }
}

// Integration with main Error type
impl From<WsError> for crate::error::Error {
    fn from(e: WsError) -> Self {
        crate::error::Error::with_source(e.kind(), e)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for crate::error::Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        WsError::Connection(e).into()
    }
}
