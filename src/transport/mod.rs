//! Socket lifecycle and automatic reconnection.
//!
//! A [`Transport`] owns at most one live socket. Each socket runs in its own
//! task that multiplexes inbound frames with queued writes, so inbound
//! frames are dispatched in delivery order and outbound frames leave in
//! call order. When a socket closes for any reason other than an explicit
//! [`Transport::close`], the transport reconnects with escalating backoff,
//! asking its [`UrlProvider`] for a fresh descriptor on every attempt.

mod connector;
mod error;
mod memory;
mod websocket;

use std::{
    sync::{
        Arc,
        Mutex,
        Weak,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

pub use self::{
    connector::{ConnectionDescriptor, Connector, FrameSink, FrameStream, Link, UrlProvider},
    error::TransportError,
    memory::{MemoryConnector, MemoryPeer, MemoryServer, memory_pair},
    websocket::WebSocketConnector,
};
use crate::{
    dispatch::{Disposer, EventDispatcher, HandlerError},
    sync::lock,
};

/// Backoff applied before successive reconnection attempts.
pub const DEFAULT_RECONNECT_DELAYS: [Duration; 4] = [
    Duration::ZERO,
    Duration::from_secs(1),
    Duration::from_secs(1),
    Duration::from_secs(5),
];

/// Lifecycle of the transport's socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No socket is open.
    Disconnected,
    /// A socket is being opened.
    Connecting,
    /// A socket is open; sends are written.
    Connected,
    /// A requested close is in progress.
    Closing,
}

/// Why a socket closed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// [`Transport::close`] or [`Transport::dispose`] was called.
    Requested,
    /// [`Transport::recycle`] closed the socket so a fresh one can replace it.
    Recycled,
    /// The peer closed the socket.
    Remote {
        /// Close code, when the peer sent one.
        code: Option<u16>,
        /// Close reason text.
        reason: String,
    },
    /// The socket failed with an I/O or protocol error.
    Failed(String),
}

impl CloseReason {
    /// Whether this close leads to an automatic reconnect.
    #[must_use]
    pub const fn triggers_reconnect(&self) -> bool { !matches!(self, Self::Requested) }
}

/// Published to `on_close` subscribers whenever the live socket closes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseEvent {
    /// Why the socket closed.
    pub reason: CloseReason,
    /// Whether the transport is about to reconnect.
    pub reconnecting: bool,
}

/// Transport tuning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportOptions {
    /// Delay before attempt `n` is `reconnect_delays[min(n, len - 1)]`.
    pub reconnect_delays: Vec<Duration>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            reconnect_delays: DEFAULT_RECONNECT_DELAYS.to_vec(),
        }
    }
}

enum Outbound {
    Frame(Bytes),
    Close(CloseReason),
}

struct Socket {
    generation: u64,
    outbound: mpsc::UnboundedSender<Outbound>,
    closed: watch::Receiver<bool>,
}

struct Inner {
    connector: Arc<dyn Connector>,
    delays: Vec<Duration>,
    state: watch::Sender<ConnectionState>,
    attempts: AtomicUsize,
    generation: AtomicU64,
    disposed: AtomicBool,
    socket: Mutex<Option<Socket>>,
    provider: Mutex<Option<Arc<dyn UrlProvider>>>,
    reconnect_task: Mutex<Option<JoinHandle<()>>>,
    messages: EventDispatcher<Bytes>,
    closes: EventDispatcher<CloseEvent>,
}

/// Reconnecting, message-oriented socket.
///
/// Cloning is cheap; clones share the same socket.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("state", &self.state())
            .field("reconnect_attempts", &self.reconnect_attempts())
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Create a disconnected transport that opens sockets with `connector`.
    #[must_use]
    pub fn new(connector: impl Connector, options: TransportOptions) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                connector: Arc::new(connector),
                delays: options.reconnect_delays,
                state,
                attempts: AtomicUsize::new(0),
                generation: AtomicU64::new(0),
                disposed: AtomicBool::new(false),
                socket: Mutex::new(None),
                provider: Mutex::new(None),
                reconnect_task: Mutex::new(None),
                messages: EventDispatcher::new("transport.message"),
                closes: EventDispatcher::new("transport.close"),
            }),
        }
    }

    /// Create a transport that speaks WebSocket.
    #[must_use]
    pub fn websocket(options: TransportOptions) -> Self { Self::new(WebSocketConnector, options) }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState { *self.inner.state.borrow() }

    /// Resolve once the transport reaches `target`.
    pub async fn wait_for_state(&self, target: ConnectionState) {
        let mut states = self.inner.state.subscribe();
        // The sender lives in `self.inner`, so the channel never closes here.
        if states.wait_for(|state| *state == target).await.is_err() {
            debug!("connection state channel closed");
        }
    }

    /// Attempts made since the last successful connection.
    #[must_use]
    pub fn reconnect_attempts(&self) -> usize { self.inner.attempts.load(Ordering::SeqCst) }

    /// Subscribe to raw inbound frames.
    pub fn on_message<F>(&self, handler: F) -> Disposer
    where
        F: Fn(&Bytes) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.inner.messages.subscribe(handler)
    }

    /// Subscribe to socket closes.
    pub fn on_close<F>(&self, handler: F) -> Disposer
    where
        F: Fn(&CloseEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.inner.closes.subscribe(handler)
    }

    /// Open a socket using the descriptor from `provider`.
    ///
    /// Any pending automatic reconnect is cancelled. A live socket is
    /// replaced once the new one opens. The provider is kept for later
    /// reconnects.
    ///
    /// # Errors
    /// Returns the descriptor or open failure, or
    /// [`TransportError::Disposed`] after [`Transport::dispose`].
    pub async fn connect(&self, provider: Arc<dyn UrlProvider>) -> Result<(), TransportError> {
        self.cancel_reconnect();
        self.open(provider).await
    }

    /// Wait out the backoff for the current attempt, then connect.
    ///
    /// The attempt counter is incremented before connecting. Any
    /// successful open, including [`Transport::connect`], resets it. Failures are logged and reported as `false`.
    #[must_use = "a `false` result means the transport is still disconnected"]
    pub async fn reconnect(&self, provider: Arc<dyn UrlProvider>) -> bool {
        let attempt = self.reconnect_attempts();
        let delay = self.backoff(attempt);
        debug!(attempt, ?delay, "waiting before reconnect");
        tokio::time::sleep(delay).await;
        self.inner.attempts.fetch_add(1, Ordering::SeqCst);
        match self.open(provider).await {
            Ok(()) => {
                info!(attempt, "reconnected");
                true
            }
            Err(error) => {
                warn!(attempt, %error, "reconnect attempt failed");
                false
            }
        }
    }

    /// Queue `frame` for the live socket; dropped unless connected.
    pub fn send(&self, frame: Bytes) {
        if self.state() != ConnectionState::Connected {
            debug!(len = frame.len(), "dropping frame while not connected");
            return;
        }
        let queued = lock(&self.inner.socket)
            .as_ref()
            .is_some_and(|live| live.outbound.send(Outbound::Frame(frame)).is_ok());
        if !queued {
            debug!("dropping frame for a closed socket");
        }
    }

    /// Close the live socket without reconnecting.
    pub async fn close(&self) {
        self.cancel_reconnect();
        self.shutdown(CloseReason::Requested).await;
    }

    /// Close the live socket and let automatic reconnection replace it.
    pub async fn recycle(&self) { self.shutdown(CloseReason::Recycled).await; }

    /// Close for good: later connects fail and subscribers are dropped.
    pub async fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.close().await;
        lock(&self.inner.provider).take();
        self.inner.messages.clear();
        self.inner.closes.clear();
    }

    /// Whether [`Transport::dispose`] has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool { self.inner.disposed.load(Ordering::SeqCst) }

    fn backoff(&self, attempt: usize) -> Duration {
        let last = self.inner.delays.len().saturating_sub(1);
        self.inner
            .delays
            .get(attempt.min(last))
            .copied()
            .unwrap_or_default()
    }

    async fn open(&self, provider: Arc<dyn UrlProvider>) -> Result<(), TransportError> {
        if self.is_disposed() {
            return Err(TransportError::Disposed);
        }
        lock(&self.inner.provider).replace(Arc::clone(&provider));
        self.inner.state.send_replace(ConnectionState::Connecting);

        let opened = match provider.descriptor().await {
            Ok(descriptor) => self.inner.connector.open(&descriptor).await,
            Err(error) => Err(error),
        };
        let link = match opened {
            Ok(link) if !self.is_disposed() => link,
            Ok(_) => {
                self.restore_state();
                return Err(TransportError::Disposed);
            }
            Err(error) => {
                self.restore_state();
                return Err(error);
            }
        };
        self.install(link);
        Ok(())
    }

    fn install(&self, link: Link) {
        self.inner.attempts.store(0, Ordering::SeqCst);
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let (outbound, commands) = mpsc::unbounded_channel();
        let (closed_tx, closed) = watch::channel(false);
        let previous = {
            let mut socket = lock(&self.inner.socket);
            let replaced = socket.replace(Socket {
                generation,
                outbound,
                closed,
            });
            self.inner.state.send_replace(ConnectionState::Connected);
            replaced
        };
        if let Some(previous) = previous {
            debug!(generation = previous.generation, "closing superseded socket");
            if previous
                .outbound
                .send(Outbound::Close(CloseReason::Recycled))
                .is_err()
            {
                debug!("superseded socket already finished");
            }
        }
        tokio::spawn(run_socket(
            Arc::downgrade(&self.inner),
            generation,
            link,
            commands,
            closed_tx,
        ));
        info!(generation, "connected");
    }

    /// After a failed open, fall back to whatever the live socket says.
    fn restore_state(&self) {
        let socket = lock(&self.inner.socket);
        let state = if socket.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        };
        self.inner.state.send_replace(state);
    }

    async fn shutdown(&self, reason: CloseReason) {
        let mut closed = {
            let guard = lock(&self.inner.socket);
            let Some(live) = guard.as_ref() else {
                return;
            };
            self.inner.state.send_replace(ConnectionState::Closing);
            if live.outbound.send(Outbound::Close(reason)).is_err() {
                debug!("socket task already finished");
            }
            live.closed.clone()
        };
        if closed.wait_for(|done| *done).await.is_err() {
            debug!("socket task dropped its close signal");
        }
    }

    fn spawn_reconnect(&self) {
        let Some(provider) = lock(&self.inner.provider).clone() else {
            warn!("no connection descriptor to reconnect with");
            return;
        };
        let transport = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            while let Some(inner) = transport.upgrade() {
                let live = Self { inner };
                if live.is_disposed() || live.reconnect(Arc::clone(&provider)).await {
                    break;
                }
            }
        });
        if let Some(previous) = lock(&self.inner.reconnect_task).replace(task) {
            previous.abort();
        }
    }

    fn cancel_reconnect(&self) {
        let Some(task) = lock(&self.inner.reconnect_task).take() else {
            return;
        };
        if !task.is_finished() {
            task.abort();
            debug!("cancelled pending reconnect");
            self.restore_state();
        }
    }

    fn socket_closed(&self, generation: u64, reason: CloseReason) {
        {
            let mut socket = lock(&self.inner.socket);
            if socket
                .as_ref()
                .is_none_or(|live| live.generation != generation)
            {
                debug!(generation, "superseded socket closed");
                return;
            }
            socket.take();
            self.inner.state.send_replace(ConnectionState::Disconnected);
        }
        let reconnecting = reason.triggers_reconnect() && !self.is_disposed();
        info!(generation, ?reason, reconnecting, "connection closed");
        self.inner.closes.emit(&CloseEvent {
            reason,
            reconnecting,
        });
        if reconnecting {
            self.spawn_reconnect();
        }
    }
}

async fn run_socket(
    inner: Weak<Inner>,
    generation: u64,
    link: Link,
    mut commands: mpsc::UnboundedReceiver<Outbound>,
    closed: watch::Sender<bool>,
) {
    let Link {
        mut sink,
        mut stream,
    } = link;
    let reason = loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Outbound::Frame(frame)) => {
                    if let Err(error) = sink.send(frame).await {
                        break CloseReason::Failed(error.to_string());
                    }
                }
                Some(Outbound::Close(reason)) => {
                    if let Err(error) = sink.close().await {
                        debug!(%error, "error while closing socket");
                    }
                    break reason;
                }
                None => break CloseReason::Requested,
            },
            frame = stream.next() => match frame {
                Some(Ok(frame)) => match inner.upgrade() {
                    Some(live) => live.messages.emit(&frame),
                    None => break CloseReason::Requested,
                },
                Some(Err(TransportError::ClosedByPeer { code, reason })) => {
                    break CloseReason::Remote { code, reason };
                }
                Some(Err(error)) => break CloseReason::Failed(error.to_string()),
                None => {
                    break CloseReason::Remote {
                        code: None,
                        reason: String::new(),
                    };
                }
            },
        }
    };
    drop(sink);
    drop(stream);
    if let Some(live) = inner.upgrade() {
        Transport { inner: live }.socket_closed(generation, reason);
    }
    closed.send_replace(true);
}

#[cfg(test)]
mod tests;
