//! In-process connector for tests and embedding.
//!
//! [`memory_pair`] returns a [`MemoryConnector`] for the transport and a
//! [`MemoryServer`] that accepts each socket it opens as a [`MemoryPeer`].
//! Frames travel over unbounded channels, so ordering matches a real socket
//! and no I/O is involved.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{StreamExt, sink, stream};
use tokio::sync::mpsc;

use super::{ConnectionDescriptor, Connector, Link, TransportError};

/// Create a connected connector/server pair.
#[must_use]
pub fn memory_pair() -> (MemoryConnector, MemoryServer) {
    let (accept_tx, accept_rx) = mpsc::unbounded_channel();
    let refusals = Arc::new(AtomicUsize::new(0));
    (
        MemoryConnector {
            accept: accept_tx,
            refusals: Arc::clone(&refusals),
        },
        MemoryServer {
            accept: accept_rx,
            refusals,
        },
    )
}

/// Client side of an in-memory endpoint.
#[derive(Clone, Debug)]
pub struct MemoryConnector {
    accept: mpsc::UnboundedSender<MemoryPeer>,
    refusals: Arc<AtomicUsize>,
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, descriptor: &ConnectionDescriptor) -> Result<Link, TransportError> {
        let refused = self
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if refused {
            return Err(TransportError::open(&descriptor.url, "connection refused"));
        }

        let (to_peer, from_client) = mpsc::unbounded_channel();
        let (to_client, from_peer) = mpsc::unbounded_channel();
        let peer = MemoryPeer {
            descriptor: descriptor.clone(),
            outbound: to_client,
            inbound: from_client,
        };
        self.accept
            .send(peer)
            .map_err(|_| TransportError::open(&descriptor.url, "in-memory server dropped"))?;

        let sink = sink::unfold(to_peer, |to_peer, frame: Bytes| async move {
            to_peer.send(frame).map_err(|_| TransportError::PeerGone)?;
            Ok::<_, TransportError>(to_peer)
        });
        let stream = stream::unfold(from_peer, |mut from_peer| async move {
            from_peer.recv().await.map(|item| (item, from_peer))
        });
        Ok(Link {
            sink: Box::pin(sink),
            stream: stream.boxed(),
        })
    }
}

/// Server side of an in-memory endpoint.
#[derive(Debug)]
pub struct MemoryServer {
    accept: mpsc::UnboundedReceiver<MemoryPeer>,
    refusals: Arc<AtomicUsize>,
}

impl MemoryServer {
    /// Wait for the next socket opened by the connector.
    ///
    /// Returns `None` once every connector clone has been dropped.
    pub async fn accept(&mut self) -> Option<MemoryPeer> { self.accept.recv().await }

    /// Refuse the next `count` connection attempts.
    pub fn refuse_next(&self, count: usize) { self.refusals.store(count, Ordering::SeqCst); }
}

/// One accepted in-memory socket, seen from the server.
///
/// Dropping the peer closes the socket from the server side.
#[derive(Debug)]
pub struct MemoryPeer {
    descriptor: ConnectionDescriptor,
    outbound: mpsc::UnboundedSender<Result<Bytes, TransportError>>,
    inbound: mpsc::UnboundedReceiver<Bytes>,
}

impl MemoryPeer {
    /// Descriptor the client dialled.
    #[must_use]
    pub const fn descriptor(&self) -> &ConnectionDescriptor { &self.descriptor }

    /// Deliver a frame to the client. Returns `false` if the client is gone.
    #[must_use]
    pub fn send(&self, frame: Bytes) -> bool { self.outbound.send(Ok(frame)).is_ok() }

    /// Next frame written by the client, or `None` once it has closed.
    pub async fn recv(&mut self) -> Option<Bytes> { self.inbound.recv().await }

    /// Close with a close code and reason, as a server shutting down would.
    pub fn close(self, code: u16, reason: &str) {
        let closed = TransportError::ClosedByPeer {
            code: Some(code),
            reason: reason.to_owned(),
        };
        if self.outbound.send(Err(closed)).is_err() {
            tracing::debug!("in-memory client already gone");
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_util::SinkExt;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[tokio::test]
    async fn frames_flow_both_ways() {
        let (connector, mut server) = memory_pair();
        let descriptor = ConnectionDescriptor::new("ws://memory/stream").with_protocol("render");
        let mut link = connector.open(&descriptor).await.expect("open");
        let mut peer = server.accept().await.expect("accept");
        assert_eq!(peer.descriptor(), &descriptor);

        link.sink.send(Bytes::from_static(b"up")).await.expect("send");
        assert_eq!(peer.recv().await, Some(Bytes::from_static(b"up")));

        assert!(peer.send(Bytes::from_static(b"down")));
        let frame = link.stream.next().await.expect("frame").expect("ok frame");
        assert_eq!(frame, Bytes::from_static(b"down"));

        drop(peer);
        assert!(link.stream.next().await.is_none());
    }

    #[rstest]
    #[tokio::test]
    async fn refusals_are_counted_down() {
        let (connector, mut server) = memory_pair();
        server.refuse_next(2);
        let descriptor = ConnectionDescriptor::new("ws://memory/stream");

        assert!(connector.open(&descriptor).await.is_err());
        assert!(connector.open(&descriptor).await.is_err());
        assert!(connector.open(&descriptor).await.is_ok());
        assert!(server.accept().await.is_some());
    }
}
