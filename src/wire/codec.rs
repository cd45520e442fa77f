//! Envelope framing.
//!
//! One [`Envelope`] travels per binary socket frame. The encoding is bincode
//! with the standard (little-endian, varint) configuration and a hard size
//! limit, so a hostile length prefix cannot trigger an unbounded allocation.

use bincode::{
    config::{self, Config},
    error::{DecodeError, EncodeError},
};
use bytes::Bytes;
use thiserror::Error;

use super::messages::Envelope;

/// Largest frame the codec will encode or decode.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

pub(crate) fn wire_config() -> impl Config { config::standard().with_limit::<MAX_FRAME_LEN>() }

/// Errors raised while converting envelopes to and from frames.
#[derive(Debug, Error)]
pub enum WireError {
    /// The frame is larger than [`MAX_FRAME_LEN`].
    #[error("frame of {len} bytes exceeds the {max} byte limit", max = MAX_FRAME_LEN)]
    FrameTooLarge {
        /// Actual frame length.
        len: usize,
    },
    /// bincode could not serialise the envelope.
    #[error("failed to encode envelope: {0}")]
    Encode(#[from] EncodeError),
    /// The frame is not a well-formed envelope.
    #[error("failed to decode envelope: {0}")]
    Decode(#[from] DecodeError),
}

/// Serialise an envelope into a single frame.
///
/// # Errors
/// Returns [`WireError::Encode`] if serialisation fails or
/// [`WireError::FrameTooLarge`] if the result exceeds the frame limit.
pub fn encode(envelope: &Envelope) -> Result<Bytes, WireError> {
    let bytes = bincode::encode_to_vec(envelope, wire_config())?;
    if bytes.len() > MAX_FRAME_LEN {
        return Err(WireError::FrameTooLarge { len: bytes.len() });
    }
    Ok(Bytes::from(bytes))
}

/// Deserialise one frame into an envelope.
///
/// Unknown payload kinds decode successfully as `Unrecognized` variants;
/// only structurally malformed frames produce an error.
///
/// # Errors
/// Returns [`WireError::FrameTooLarge`] for oversized frames and
/// [`WireError::Decode`] for malformed ones.
pub fn decode(frame: &[u8]) -> Result<Envelope, WireError> {
    if frame.len() > MAX_FRAME_LEN {
        return Err(WireError::FrameTooLarge { len: frame.len() });
    }
    let (envelope, _) = bincode::decode_from_slice(frame, wire_config())?;
    Ok(envelope)
}
