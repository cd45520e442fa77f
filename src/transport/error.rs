//! Errors raised by connectors and the reconnecting transport.

use thiserror::Error;

use crate::settings::SettingsError;

/// Failure to open, use or keep a socket.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connector could not open a socket to `url`.
    #[error("failed to open {url}: {source}")]
    Open {
        /// Endpoint that was dialled.
        url: String,
        /// Underlying failure.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// The connection descriptor could not be resolved.
    #[error("failed to resolve connection descriptor: {0}")]
    Descriptor(#[from] SettingsError),
    /// WebSocket protocol or I/O failure on an open socket.
    #[error("websocket error: {0}")]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),
    /// The peer closed the socket.
    #[error("connection closed by peer (code {code:?}): {reason}")]
    ClosedByPeer {
        /// Close code, when the peer sent one.
        code: Option<u16>,
        /// Close reason text.
        reason: String,
    },
    /// The in-memory peer hung up.
    #[error("in-memory peer disconnected")]
    PeerGone,
    /// The transport has been disposed and cannot connect again.
    #[error("transport disposed")]
    Disposed,
}

impl TransportError {
    /// Wrap an arbitrary error as an [`TransportError::Open`] failure.
    #[must_use]
    pub fn open(
        url: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Open {
            url: url.into(),
            source: source.into(),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self { Self::WebSocket(Box::new(value)) }
}
