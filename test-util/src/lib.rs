//! Utilities for integration tests.
//!
//! The `test-util` crate provides a loopback WebSocket server that speaks
//! the envelope protocol, the in-memory connector re-exported from the
//! library, and helpers for building and reading envelopes in tests.

mod envelopes;
mod loopback;

pub use render_stream::transport::{MemoryConnector, MemoryPeer, MemoryServer, memory_pair};

pub use crate::{
    envelopes::{ack, expect_request, frame, response, server_error},
    loopback::{LoopbackPeer, LoopbackServer},
};
