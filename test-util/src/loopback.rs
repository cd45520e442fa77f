//! Loopback WebSocket server for exercising the real connector.
//!
//! [`LoopbackServer::start`] binds an ephemeral port on 127.0.0.1 and
//! completes the WebSocket handshake for every inbound connection, echoing
//! the first offered sub-protocol. Each accepted socket is handed to the
//! test as a [`LoopbackPeer`] together with the request URI it dialled.

use std::net::SocketAddr;

use anyhow::{Context as _, Result};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use render_stream::wire::{self, messages::Envelope};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc,
    task::JoinHandle,
};
use tokio_tungstenite::{
    WebSocketStream,
    accept_hdr_async,
    tungstenite::{
        Message,
        handshake::server::{ErrorResponse, Request, Response},
        http::{HeaderValue, header::SEC_WEBSOCKET_PROTOCOL},
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};
use tracing::{debug, warn};

/// Accepts WebSocket connections on an ephemeral local port.
///
/// The accept loop stops when the server is dropped.
#[derive(Debug)]
pub struct LoopbackServer {
    addr: SocketAddr,
    accepted: mpsc::UnboundedReceiver<LoopbackPeer>,
    task: JoinHandle<()>,
}

impl LoopbackServer {
    /// Bind and start accepting.
    ///
    /// # Errors
    /// Returns the bind error.
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("binding loopback listener")?;
        let addr = listener.local_addr()?;
        let (accepted_tx, accepted) = mpsc::unbounded_channel();
        let task = tokio::spawn(accept_loop(listener, accepted_tx));
        debug!(%addr, "loopback server listening");
        Ok(Self {
            addr,
            accepted,
            task,
        })
    }

    /// `ws://` URL for `path` on this server.
    #[must_use]
    pub fn url(&self, path: &str) -> String { format!("ws://{}{path}", self.addr) }

    /// Next handshaken socket, or `None` if the accept loop has stopped.
    pub async fn accept(&mut self) -> Option<LoopbackPeer> { self.accepted.recv().await }
}

impl Drop for LoopbackServer {
    fn drop(&mut self) { self.task.abort(); }
}

async fn accept_loop(listener: TcpListener, accepted: mpsc::UnboundedSender<LoopbackPeer>) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(connection) => connection,
            Err(error) => {
                warn!(%error, "loopback accept failed");
                return;
            }
        };
        let sender = accepted.clone();
        tokio::spawn(async move {
            match handshake(stream).await {
                Ok(socket) => {
                    if sender.send(socket).is_err() {
                        debug!(%peer, "loopback server dropped before accept");
                    }
                }
                Err(error) => warn!(%peer, %error, "loopback handshake failed"),
            }
        });
    }
}

async fn handshake(stream: TcpStream) -> Result<LoopbackPeer> {
    let mut uri = String::new();
    let mut protocols = Vec::new();
    let callback = |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
        uri = request.uri().to_string();
        protocols = request
            .headers()
            .get_all(SEC_WEBSOCKET_PROTOCOL)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .map(|protocol| protocol.trim().to_owned())
            .filter(|protocol| !protocol.is_empty())
            .collect();
        if let Some(chosen) = protocols.first().and_then(|first| HeaderValue::from_str(first).ok()) {
            response.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, chosen);
        }
        Ok(response)
    };
    let socket = accept_hdr_async(stream, callback).await?;
    Ok(LoopbackPeer {
        uri,
        protocols,
        socket,
    })
}

/// One accepted socket, seen from the server.
pub struct LoopbackPeer {
    uri: String,
    protocols: Vec<String>,
    socket: WebSocketStream<TcpStream>,
}

impl std::fmt::Debug for LoopbackPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackPeer")
            .field("uri", &self.uri)
            .field("protocols", &self.protocols)
            .finish_non_exhaustive()
    }
}

impl LoopbackPeer {
    /// Request URI from the handshake, including the query string.
    #[must_use]
    pub fn uri(&self) -> &str { &self.uri }

    /// Sub-protocols the client offered, in order.
    #[must_use]
    pub fn protocols(&self) -> &[String] { &self.protocols }

    /// Send one envelope as a binary frame.
    ///
    /// # Errors
    /// Returns encode or socket errors.
    pub async fn send(&mut self, envelope: &Envelope) -> Result<()> {
        self.send_raw(wire::encode(envelope)?).await
    }

    /// Send arbitrary bytes as a binary frame.
    ///
    /// # Errors
    /// Returns the socket error.
    pub async fn send_raw(&mut self, frame: Bytes) -> Result<()> {
        self.socket.send(Message::Binary(frame)).await?;
        Ok(())
    }

    /// Next envelope from the client, skipping control and text frames.
    ///
    /// Returns `None` once the client has closed the socket.
    ///
    /// # Errors
    /// Returns socket errors and frames that do not decode.
    pub async fn recv(&mut self) -> Option<Result<Envelope>> {
        while let Some(message) = self.socket.next().await {
            match message {
                Ok(Message::Binary(frame)) => return Some(wire::decode(&frame).context("decoding client frame")),
                Ok(Message::Close(_)) => return None,
                Ok(_) => {}
                Err(error) => return Some(Err(error.into())),
            }
        }
        None
    }

    /// Close the socket with `code` and `reason`.
    ///
    /// # Errors
    /// Returns the socket error.
    pub async fn close(mut self, code: u16, reason: &str) -> Result<()> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_owned().into(),
        };
        self.socket.close(Some(frame)).await?;
        Ok(())
    }
}
