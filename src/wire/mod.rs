//! Binary wire protocol for the render stream.
//!
//! The [`messages`] module defines the envelope and every body the client
//! and server exchange, [`geometry`] holds the numeric value types those
//! bodies share, and [`encode`]/[`decode`] convert envelopes to and from
//! socket frames.

#[macro_use]
mod tagged;
mod codec;
pub mod geometry;
pub mod messages;

pub use self::{
    codec::{MAX_FRAME_LEN, WireError, decode, encode},
    tagged::Opaque,
};
