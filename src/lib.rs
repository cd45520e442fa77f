//! Client library for streaming 3D render services.
//!
//! A render service draws a scene server-side and pushes frames to the
//! client over a WebSocket. This crate speaks its envelope protocol:
//!
//! - [`time`] converts wall-clock instants and spans to wire form.
//! - [`settings`] serialises stream tuning into connection URL parameters.
//! - [`wire`] encodes and decodes envelopes, tolerating unknown variants.
//! - [`transport`] owns the socket and reconnects with escalating backoff.
//! - [`client`] correlates requests with responses and fans out pushes.
//! - [`interaction`] tracks user gestures and the graceful reconnect window.
//!
//! The library logs through `tracing` and never installs a subscriber.

pub mod client;
pub mod dispatch;
pub mod interaction;
pub mod probe;
pub mod settings;
pub(crate) mod sync;
pub mod time;
pub mod transport;
pub mod validate;
pub mod wire;

#[cfg(test)]
mod test_helpers;

pub use crate::client::{ClientOptions, RequestError, StreamClient};
