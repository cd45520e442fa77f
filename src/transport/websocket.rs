//! WebSocket connector backed by `tokio-tungstenite`.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt, future};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        self,
        Message,
        client::IntoClientRequest,
        http::{HeaderValue, header::SEC_WEBSOCKET_PROTOCOL},
    },
};
use tracing::debug;

use super::{ConnectionDescriptor, Connector, Link, TransportError};

/// Opens binary WebSocket connections.
#[derive(Clone, Copy, Debug, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, descriptor: &ConnectionDescriptor) -> Result<Link, TransportError> {
        let url = descriptor.url.as_str();
        let mut request = url
            .into_client_request()
            .map_err(|error| TransportError::open(url, error))?;
        if !descriptor.protocols.is_empty() {
            let offered = HeaderValue::from_str(&descriptor.protocols.join(", "))
                .map_err(|error| TransportError::open(url, error))?;
            request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, offered);
        }
        let (socket, response) = connect_async(request)
            .await
            .map_err(|error| TransportError::open(url, error))?;
        debug!(status = %response.status(), "websocket handshake complete");

        let (writer, reader) = socket.split();
        let sink = writer
            .sink_map_err(TransportError::from)
            .with(|frame: Bytes| future::ready(Ok::<_, TransportError>(Message::Binary(frame))));
        let stream = reader.filter_map(|message| future::ready(inbound(message)));
        Ok(Link {
            sink: Box::pin(sink),
            stream: stream.boxed(),
        })
    }
}

fn inbound(message: Result<Message, tungstenite::Error>) -> Option<Result<Bytes, TransportError>> {
    match message {
        Ok(Message::Binary(frame)) => Some(Ok(frame)),
        Ok(Message::Close(close)) => Some(Err(match close {
            Some(frame) => TransportError::ClosedByPeer {
                code: Some(u16::from(frame.code)),
                reason: frame.reason.as_str().to_owned(),
            },
            None => TransportError::ClosedByPeer {
                code: None,
                reason: String::new(),
            },
        })),
        Ok(Message::Text(text)) => {
            debug!(len = text.len(), "ignoring text frame");
            None
        }
        Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => None,
        Err(error) => Some(Err(error.into())),
    }
}
