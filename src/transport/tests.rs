//! Lifecycle and reconnection tests driven through the in-memory connector.

use std::sync::{
    Arc,
    Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use bytes::Bytes;
use rstest::{fixture, rstest};
use tokio::time::{Duration, Instant, timeout};

use super::*;
use crate::{dispatch::Disposer, sync::lock};

struct Harness {
    transport: Transport,
    server: MemoryServer,
    closes: Arc<Mutex<Vec<CloseEvent>>>,
    _close_subscription: Disposer,
}

impl Harness {
    fn closes(&self) -> Vec<CloseEvent> { lock(&self.closes).clone() }

    async fn accept(&mut self) -> MemoryPeer {
        timeout(Duration::from_secs(60), self.server.accept())
            .await
            .expect("accept timed out")
            .expect("connector alive")
    }
}

#[fixture]
fn harness() -> Harness {
    let (connector, server) = memory_pair();
    let transport = Transport::new(connector, TransportOptions::default());
    let closes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&closes);
    let subscription = transport.on_close(move |event| {
        lock(&sink).push(event.clone());
        Ok(())
    });
    Harness {
        transport,
        server,
        closes,
        _close_subscription: subscription,
    }
}

fn provider() -> Arc<dyn UrlProvider> { Arc::new(ConnectionDescriptor::new("ws://memory/stream")) }

#[rstest]
#[tokio::test]
async fn frames_flow_in_order(mut harness: Harness) {
    let (frames_tx, mut frames) = tokio::sync::mpsc::unbounded_channel();
    let _subscription = harness.transport.on_message(move |frame| {
        frames_tx.send(frame.clone())?;
        Ok(())
    });

    harness.transport.connect(provider()).await.expect("connect");
    assert_eq!(harness.transport.state(), ConnectionState::Connected);
    let mut peer = harness.accept().await;

    harness.transport.send(Bytes::from_static(b"one"));
    harness.transport.send(Bytes::from_static(b"two"));
    assert_eq!(peer.recv().await, Some(Bytes::from_static(b"one")));
    assert_eq!(peer.recv().await, Some(Bytes::from_static(b"two")));

    assert!(peer.send(Bytes::from_static(b"a")));
    assert!(peer.send(Bytes::from_static(b"b")));
    assert_eq!(frames.recv().await, Some(Bytes::from_static(b"a")));
    assert_eq!(frames.recv().await, Some(Bytes::from_static(b"b")));
}

#[rstest]
#[tokio::test]
async fn sends_are_dropped_while_disconnected(mut harness: Harness) {
    harness.transport.send(Bytes::from_static(b"lost"));
    harness.transport.connect(provider()).await.expect("connect");
    let mut peer = harness.accept().await;
    harness.transport.send(Bytes::from_static(b"kept"));
    assert_eq!(peer.recv().await, Some(Bytes::from_static(b"kept")));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn requested_close_does_not_reconnect(mut harness: Harness) {
    harness.transport.connect(provider()).await.expect("connect");
    let mut peer = harness.accept().await;

    harness.transport.close().await;

    assert_eq!(harness.transport.state(), ConnectionState::Disconnected);
    assert_eq!(peer.recv().await, None);
    assert_eq!(
        harness.closes(),
        [CloseEvent {
            reason: CloseReason::Requested,
            reconnecting: false,
        }]
    );
    assert!(
        timeout(Duration::from_secs(30), harness.server.accept())
            .await
            .is_err()
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn remote_close_reconnects(mut harness: Harness) {
    harness.transport.connect(provider()).await.expect("connect");
    let peer = harness.accept().await;

    peer.close(1001, "going away");
    let mut replacement = harness.accept().await;
    harness
        .transport
        .wait_for_state(ConnectionState::Connected)
        .await;

    assert_eq!(
        harness.closes(),
        [CloseEvent {
            reason: CloseReason::Remote {
                code: Some(1001),
                reason: "going away".to_owned(),
            },
            reconnecting: true,
        }]
    );
    assert_eq!(harness.transport.reconnect_attempts(), 0);
    harness.transport.send(Bytes::from_static(b"after"));
    assert_eq!(replacement.recv().await, Some(Bytes::from_static(b"after")));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn backoff_escalates_then_holds(mut harness: Harness) {
    harness.transport.connect(provider()).await.expect("connect");
    let peer = harness.accept().await;

    harness.server.refuse_next(4);
    let started = Instant::now();
    drop(peer);
    let _replacement = harness.accept().await;

    // 0 s, 1 s, 1 s and 5 s for the refused attempts, then 5 s again.
    assert_eq!(started.elapsed(), Duration::from_secs(12));
    harness
        .transport
        .wait_for_state(ConnectionState::Connected)
        .await;
    assert_eq!(harness.transport.reconnect_attempts(), 0);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn explicit_reconnect_counts_failures(harness: Harness) {
    harness.server.refuse_next(2);

    assert!(!harness.transport.reconnect(provider()).await);
    assert_eq!(harness.transport.reconnect_attempts(), 1);
    assert!(!harness.transport.reconnect(provider()).await);
    assert_eq!(harness.transport.reconnect_attempts(), 2);
    assert!(harness.transport.reconnect(provider()).await);
    assert_eq!(harness.transport.reconnect_attempts(), 0);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn explicit_connect_resets_the_backoff(mut harness: Harness) {
    harness.server.refuse_next(2);
    assert!(!harness.transport.reconnect(provider()).await);
    assert!(!harness.transport.reconnect(provider()).await);

    harness.transport.connect(provider()).await.expect("connect");
    assert_eq!(harness.transport.reconnect_attempts(), 0);
    let peer = harness.accept().await;

    let dropped = Instant::now();
    drop(peer);
    let _replacement = harness.accept().await;
    assert_eq!(dropped.elapsed(), Duration::ZERO);
}

#[rstest]
#[tokio::test]
async fn reconnecting_supersedes_the_previous_socket(mut harness: Harness) {
    harness.transport.connect(provider()).await.expect("connect");
    let mut first = harness.accept().await;

    harness.transport.connect(provider()).await.expect("reconnect");
    let mut second = harness.accept().await;

    assert_eq!(first.recv().await, None);
    harness.transport.send(Bytes::from_static(b"fresh"));
    assert_eq!(second.recv().await, Some(Bytes::from_static(b"fresh")));
    assert!(harness.closes().is_empty());
    assert_eq!(harness.transport.state(), ConnectionState::Connected);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn recycle_closes_and_reconnects(mut harness: Harness) {
    harness.transport.connect(provider()).await.expect("connect");
    let mut first = harness.accept().await;

    harness.transport.recycle().await;
    assert_eq!(first.recv().await, None);
    let _second = harness.accept().await;

    assert_eq!(
        harness.closes(),
        [CloseEvent {
            reason: CloseReason::Recycled,
            reconnecting: true,
        }]
    );
}

#[rstest]
#[tokio::test]
async fn disposed_transport_refuses_to_connect(mut harness: Harness) {
    harness.transport.connect(provider()).await.expect("connect");
    let _peer = harness.accept().await;

    harness.transport.dispose().await;

    assert!(harness.transport.is_disposed());
    let err = harness
        .transport
        .connect(provider())
        .await
        .expect_err("disposed");
    assert!(matches!(err, TransportError::Disposed));
}

struct RotatingProvider {
    calls: AtomicUsize,
}

#[async_trait]
impl UrlProvider for RotatingProvider {
    async fn descriptor(&self) -> Result<ConnectionDescriptor, TransportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ConnectionDescriptor::new(format!("ws://memory/stream?token={call}")))
    }
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn each_attempt_resolves_a_fresh_descriptor(mut harness: Harness) {
    let rotating = Arc::new(RotatingProvider {
        calls: AtomicUsize::new(0),
    });
    harness
        .transport
        .connect(Arc::clone(&rotating) as Arc<dyn UrlProvider>)
        .await
        .expect("connect");
    let first = harness.accept().await;
    assert_eq!(first.descriptor().url, "ws://memory/stream?token=0");

    drop(first);
    let second = harness.accept().await;
    assert_eq!(second.descriptor().url, "ws://memory/stream?token=1");
}
