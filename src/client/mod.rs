//! Request/response correlation over a reconnecting transport.
//!
//! [`StreamClient`] turns typed operations into envelopes, tracks requests
//! that expect a response, and fans inbound requests, events and socket
//! closes out to subscribers. Each inbound frame is decoded once: responses
//! settle their pending request exactly once, and anything that fails to
//! decode is logged and dropped without disturbing later frames.

mod error;
mod operations;
mod pending;

use std::{
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;
use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use self::error::RequestError;
use self::pending::{PendingGuard, PendingRequests};
use crate::{
    dispatch::{Disposer, EventDispatcher, HandlerError},
    interaction::{DEFAULT_COOLDOWN, InteractionTracker, ReconnectWindow, await_reconnect_window},
    sync::lock,
    transport::{
        CloseEvent,
        Connector,
        Transport,
        TransportError,
        TransportOptions,
        UrlProvider,
        WebSocketConnector,
    },
    validate::{validate_request, validate_result},
    wire::{
        self,
        messages::{
            CorrelationId,
            Envelope,
            EventBody,
            GracefulReconnection,
            Payload,
            Request,
            RequestBody,
            Response,
            ResponseOutcome,
            ResponseResult,
        },
    },
};

/// Client tuning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientOptions {
    /// Socket and reconnection tuning.
    pub transport: TransportOptions,
    /// Idle time after end-interaction before the user counts as idle.
    pub cooldown: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            transport: TransportOptions::default(),
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

struct ClientInner {
    transport: Transport,
    pending: PendingRequests,
    requests: EventDispatcher<Request>,
    events: EventDispatcher<EventBody>,
    closes: EventDispatcher<CloseEvent>,
    interaction: InteractionTracker,
    disposed: AtomicBool,
    wiring: Mutex<Vec<Disposer>>,
    window_task: Mutex<Option<JoinHandle<()>>>,
}

/// Streaming render client.
///
/// Cloning is cheap; clones share the connection, pending requests and
/// subscribers.
#[derive(Clone)]
pub struct StreamClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for StreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamClient")
            .field("transport", &self.inner.transport)
            .field("pending", &self.inner.pending.len())
            .field("interaction", &self.inner.interaction.state())
            .finish_non_exhaustive()
    }
}

impl StreamClient {
    /// Create a client whose sockets are opened by `connector`.
    #[must_use]
    pub fn new(connector: impl Connector, options: ClientOptions) -> Self {
        let inner = Arc::new(ClientInner {
            transport: Transport::new(connector, options.transport),
            pending: PendingRequests::default(),
            requests: EventDispatcher::new("client.request"),
            events: EventDispatcher::new("client.event"),
            closes: EventDispatcher::new("client.close"),
            interaction: InteractionTracker::new(options.cooldown),
            disposed: AtomicBool::new(false),
            wiring: Mutex::new(Vec::new()),
            window_task: Mutex::new(None),
        });

        let frames = Arc::downgrade(&inner);
        let on_message = inner.transport.on_message(move |frame| {
            if let Some(live) = frames.upgrade() {
                live.handle_frame(frame);
            }
            Ok(())
        });
        let closes = Arc::downgrade(&inner);
        let on_close = inner.transport.on_close(move |event| {
            if let Some(live) = closes.upgrade() {
                live.closes.emit(event);
            }
            Ok(())
        });
        lock(&inner.wiring).extend([on_message, on_close]);
        Self { inner }
    }

    /// Create a client that connects over WebSocket.
    #[must_use]
    pub fn websocket(options: ClientOptions) -> Self { Self::new(WebSocketConnector, options) }

    /// Underlying transport.
    #[must_use]
    pub fn transport(&self) -> &Transport { &self.inner.transport }

    /// Interaction tracker driven by begin/end-interaction.
    #[must_use]
    pub fn interaction(&self) -> &InteractionTracker { &self.inner.interaction }

    /// Number of requests still awaiting a response.
    #[must_use]
    pub fn pending_requests(&self) -> usize { self.inner.pending.len() }

    /// Open the connection.
    ///
    /// # Errors
    /// Returns the transport's open failure.
    pub async fn connect(&self, provider: Arc<dyn UrlProvider>) -> Result<(), TransportError> {
        self.inner.transport.connect(provider).await
    }

    /// Send `body` and wait for the matching response.
    ///
    /// There is no built-in timeout; race the returned future against one
    /// if needed. Dropping the future forgets the request, so a late
    /// response is ignored. Requests sent while disconnected are dropped by
    /// the transport and wait until the client is disposed.
    ///
    /// # Errors
    /// Returns [`RequestError::NonFinitePayload`] without sending when the
    /// body fails validation, [`RequestError::Server`] for an error outcome
    /// and [`RequestError::Disposed`] once the client is disposed.
    pub async fn send_with_response(&self, body: RequestBody) -> Result<ResponseResult, RequestError> {
        validate_request(&body)?;
        if self.is_disposed() {
            return Err(RequestError::Disposed);
        }
        let operation = body.name();
        let (correlation_id, completion) = self.inner.pending.register(body.clone());
        let _abandoned = PendingGuard::new(&self.inner.pending, correlation_id.clone());
        if self.is_disposed() {
            return Err(RequestError::Disposed);
        }
        let envelope = Envelope::stamped(Payload::Request(Request {
            correlation_id: Some(correlation_id.clone()),
            body,
        }));
        let frame = wire::encode(&envelope)?;
        debug!(%correlation_id, operation, "sending request");
        self.inner.transport.send(frame);
        completion.await.unwrap_or(Err(RequestError::Disposed))
    }

    /// Send `body` without expecting a response.
    ///
    /// # Errors
    /// Returns [`RequestError::NonFinitePayload`] without sending when the
    /// body fails validation.
    pub fn send_fire_and_forget(&self, body: RequestBody) -> Result<(), RequestError> {
        validate_request(&body)?;
        debug!(operation = body.name(), "sending request");
        self.send_payload(Payload::Request(Request {
            correlation_id: None,
            body,
        }))
    }

    /// Answer a server request successfully.
    ///
    /// # Errors
    /// Returns [`RequestError::NonFinitePayload`] without sending when the
    /// result fails validation, or [`RequestError::Wire`] if the response
    /// cannot be encoded.
    pub fn reply_result(&self, correlation_id: CorrelationId, result: ResponseResult) -> Result<(), RequestError> {
        validate_result(&result)?;
        self.send_payload(Payload::Response(Response {
            correlation_id,
            outcome: ResponseOutcome::Result(result),
        }))
    }

    /// Answer a server request with an error.
    ///
    /// # Errors
    /// Returns [`RequestError::Wire`] if the response cannot be encoded.
    pub fn reply_error(
        &self,
        correlation_id: CorrelationId,
        summary: impl Into<String>,
        details: Option<String>,
    ) -> Result<(), RequestError> {
        self.send_payload(Payload::Response(Response {
            correlation_id,
            outcome: ResponseOutcome::Error(wire::messages::ServerError {
                summary: summary.into(),
                details,
            }),
        }))
    }

    /// Subscribe to requests pushed by the server.
    pub fn on_request<F>(&self, handler: F) -> Disposer
    where
        F: Fn(&Request) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.inner.requests.subscribe(handler)
    }

    /// Subscribe to server events.
    pub fn on_event<F>(&self, handler: F) -> Disposer
    where
        F: Fn(&EventBody) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.inner.events.subscribe(handler)
    }

    /// Subscribe to socket closes.
    pub fn on_close<F>(&self, handler: F) -> Disposer
    where
        F: Fn(&CloseEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.inner.closes.subscribe(handler)
    }

    /// Whether [`StreamClient::dispose`] has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool { self.inner.disposed.load(Ordering::SeqCst) }

    /// Close the connection, drop subscribers and reject outstanding
    /// requests with [`RequestError::Disposed`].
    pub async fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = lock(&self.inner.window_task).take() {
            task.abort();
        }
        self.inner.transport.dispose().await;
        let rejected = self.inner.pending.reject_all(|| RequestError::Disposed);
        let wiring: Vec<Disposer> = lock(&self.inner.wiring).drain(..).collect();
        for subscription in wiring {
            subscription.dispose();
        }
        self.inner.requests.clear();
        self.inner.events.clear();
        self.inner.closes.clear();
        info!(rejected, "stream client disposed");
    }

    fn send_payload(&self, payload: Payload) -> Result<(), RequestError> {
        let frame = wire::encode(&Envelope::stamped(payload))?;
        self.inner.transport.send(frame);
        Ok(())
    }
}

impl ClientInner {
    fn handle_frame(&self, frame: &Bytes) {
        let envelope = match wire::decode(frame) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(%error, len = frame.len(), "dropping malformed frame");
                return;
            }
        };
        match envelope.payload {
            Payload::Response(response) => {
                self.pending.resolve(response);
            }
            Payload::Request(request) => {
                if let RequestBody::GracefulReconnection(advisory) = &request.body {
                    self.schedule_reconnect(advisory);
                }
                self.requests.emit(&request);
            }
            Payload::Event(event) => self.events.emit(&event.body),
            Payload::Unrecognized(opaque) => {
                debug!(tag = opaque.tag, "ignoring unrecognized payload");
            }
        }
    }

    fn schedule_reconnect(&self, advisory: &GracefulReconnection) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        let window = ReconnectWindow::from_advisory(advisory, Utc::now());
        info!(start = %window.start, end = %window.end, "server requested a graceful reconnect");
        let transport = self.transport.clone();
        let tracker = self.interaction.clone();
        let task = tokio::spawn(async move {
            let outcome = await_reconnect_window(window, &tracker).await;
            info!(?outcome, "switching connection");
            transport.recycle().await;
        });
        if let Some(previous) = lock(&self.window_task).replace(task) {
            previous.abort();
        }
    }
}
