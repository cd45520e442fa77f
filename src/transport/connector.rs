//! Socket-opening seam between the transport and concrete network stacks.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Sink, stream::BoxStream};

use super::TransportError;
use crate::settings::{StreamSettings, append_settings_to_url};

/// Where to connect and which sub-protocols to offer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    /// Absolute `ws://` or `wss://` endpoint, including any credentials.
    pub url: String,
    /// Sub-protocols offered in the opening handshake.
    pub protocols: Vec<String>,
}

impl ConnectionDescriptor {
    /// Descriptor for `url` with no sub-protocols.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            protocols: Vec::new(),
        }
    }

    /// Offer `protocol` during the handshake.
    #[must_use]
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocols.push(protocol.into());
        self
    }

    /// Return a copy whose URL carries `settings` as query parameters.
    ///
    /// # Errors
    /// Returns [`TransportError::Descriptor`] when the URL is invalid.
    pub fn with_settings(&self, settings: &StreamSettings) -> Result<Self, TransportError> {
        Ok(Self {
            url: append_settings_to_url(&self.url, settings)?,
            protocols: self.protocols.clone(),
        })
    }
}

/// Supplies a fresh descriptor for every connection attempt.
///
/// Reconnection asks again, so providers can rotate tokens embedded in the
/// URL between attempts.
#[async_trait]
pub trait UrlProvider: Send + Sync {
    /// Resolve the descriptor for the next attempt.
    async fn descriptor(&self) -> Result<ConnectionDescriptor, TransportError>;
}

#[async_trait]
impl UrlProvider for ConnectionDescriptor {
    async fn descriptor(&self) -> Result<ConnectionDescriptor, TransportError> { Ok(self.clone()) }
}

/// Outbound half of an open socket.
pub type FrameSink = Pin<Box<dyn Sink<Bytes, Error = TransportError> + Send>>;

/// Inbound half of an open socket; ends when the socket closes.
pub type FrameStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// An open, message-oriented socket.
pub struct Link {
    /// Frames written to the peer.
    pub sink: FrameSink,
    /// Frames read from the peer.
    pub stream: FrameStream,
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link").finish_non_exhaustive()
    }
}

/// Opens sockets for the transport.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a socket described by `descriptor`.
    async fn open(&self, descriptor: &ConnectionDescriptor) -> Result<Link, TransportError>;
}
