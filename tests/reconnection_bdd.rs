#![allow(
    unfulfilled_lint_expectations,
    reason = "test lint expectations may not all trigger"
)]
#![expect(clippy::expect_used, reason = "test assertions")]
#![expect(clippy::let_underscore_must_use, reason = "scenario fixtures")]

//! Behaviour-driven tests for automatic reconnection.
//!
//! Drives a [`Transport`] against the in-memory server on a paused-clock
//! runtime so backoff delays can be asserted exactly.

use std::{
    cell::{Cell, RefCell},
    sync::{Arc, Mutex},
};

use render_stream::{
    dispatch::Disposer,
    transport::{CloseEvent, ConnectionDescriptor, ConnectionState, Transport, TransportOptions},
};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use test_util::{MemoryPeer, MemoryServer, memory_pair};
use tokio::{
    runtime::{Builder, Runtime},
    time::{Duration, Instant, timeout},
};

struct ReconnectWorld {
    runtime: Runtime,
    transport: Transport,
    server: RefCell<MemoryServer>,
    peer: RefCell<Option<MemoryPeer>>,
    closes: Arc<Mutex<Vec<CloseEvent>>>,
    dropped_at: Cell<Option<Instant>>,
    _subscription: Disposer,
}

impl ReconnectWorld {
    fn new() -> Self {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .expect("runtime");
        let (connector, server) = memory_pair();
        let transport = Transport::new(connector, TransportOptions::default());
        let closes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&closes);
        let subscription = transport.on_close(move |event| {
            sink.lock().expect("close log").push(event.clone());
            Ok(())
        });
        Self {
            runtime,
            transport,
            server: RefCell::new(server),
            peer: RefCell::new(None),
            closes,
            dropped_at: Cell::new(None),
            _subscription: subscription,
        }
    }

    fn last_close(&self) -> CloseEvent {
        self.closes
            .lock()
            .expect("close log")
            .last()
            .cloned()
            .expect("a close was reported")
    }
}

#[fixture]
fn world() -> ReconnectWorld { ReconnectWorld::new() }

#[given("a client connected to an in-memory server")]
fn connected(world: &ReconnectWorld) {
    let peer = world.runtime.block_on(async {
        world
            .transport
            .connect(Arc::new(ConnectionDescriptor::new("ws://memory/stream")))
            .await
            .expect("connect");
        world.server.borrow_mut().accept().await.expect("accept")
    });
    world.peer.replace(Some(peer));
}

#[given("the server refuses the next {count:usize} connections")]
fn refuse(world: &ReconnectWorld, count: usize) { world.server.borrow().refuse_next(count); }

#[when("the server drops the connection")]
fn server_drops(world: &ReconnectWorld) {
    let now = world.runtime.block_on(async { Instant::now() });
    world.dropped_at.set(Some(now));
    drop(world.peer.take());
}

#[when("the client closes the connection")]
fn client_closes(world: &ReconnectWorld) { world.runtime.block_on(world.transport.close()); }

#[then("the client reconnects after {seconds:u64} seconds")]
fn reconnects_after(world: &ReconnectWorld, seconds: u64) {
    let dropped_at = world.dropped_at.get().expect("connection dropped");
    let (peer, elapsed) = world.runtime.block_on(async {
        let peer = timeout(Duration::from_secs(120), world.server.borrow_mut().accept())
            .await
            .expect("reconnected in time")
            .expect("server alive");
        let elapsed = dropped_at.elapsed();
        world
            .transport
            .wait_for_state(ConnectionState::Connected)
            .await;
        (peer, elapsed)
    });
    assert_eq!(elapsed, Duration::from_secs(seconds));
    world.peer.replace(Some(peer));
}

#[then("the close was reported as reconnecting")]
fn reported_reconnecting(world: &ReconnectWorld) { assert!(world.last_close().reconnecting); }

#[then("the close was reported as final")]
fn reported_final(world: &ReconnectWorld) { assert!(!world.last_close().reconnecting); }

#[then("the reconnect attempt counter is reset")]
fn counter_reset(world: &ReconnectWorld) { assert_eq!(world.transport.reconnect_attempts(), 0); }

#[then("no reconnection is attempted within {seconds:u64} seconds")]
fn stays_closed(world: &ReconnectWorld, seconds: u64) {
    let accepted = world.runtime.block_on(async {
        timeout(Duration::from_secs(seconds), world.server.borrow_mut().accept()).await
    });
    assert!(accepted.is_err(), "unexpected reconnection");
    assert_eq!(world.transport.state(), ConnectionState::Disconnected);
}

#[scenario(path = "tests/features/reconnection.feature", index = 0)]
fn dropped_connection_reconnects(world: ReconnectWorld) { let _ = world; }

#[scenario(path = "tests/features/reconnection.feature", index = 1)]
fn refused_attempts_escalate(world: ReconnectWorld) { let _ = world; }

#[scenario(path = "tests/features/reconnection.feature", index = 2)]
fn requested_close_stays_closed(world: ReconnectWorld) { let _ = world; }
