//! Envelope builders shared by the in-memory and loopback harnesses.

use anyhow::{Result, bail};
use bytes::Bytes;
use render_stream::wire::{
    self,
    messages::{
        Ack,
        CorrelationId,
        Envelope,
        Payload,
        Request,
        Response,
        ResponseOutcome,
        ResponseResult,
        ServerError,
    },
};

/// Encode `payload` as a freshly stamped frame.
///
/// # Errors
/// Returns the codec error if the envelope cannot be encoded.
pub fn frame(payload: Payload) -> Result<Bytes> { Ok(wire::encode(&Envelope::stamped(payload))?) }

/// Successful response payload.
#[must_use]
pub const fn response(correlation_id: CorrelationId, result: ResponseResult) -> Payload {
    Payload::Response(Response {
        correlation_id,
        outcome: ResponseOutcome::Result(result),
    })
}

/// Acknowledgement for `correlation_id`.
#[must_use]
pub const fn ack(correlation_id: CorrelationId) -> Payload { response(correlation_id, ResponseResult::Ack(Ack)) }

/// Error response for `correlation_id`.
#[must_use]
pub fn server_error(correlation_id: CorrelationId, summary: &str) -> Payload {
    Payload::Response(Response {
        correlation_id,
        outcome: ResponseOutcome::Error(ServerError {
            summary: summary.to_owned(),
            details: None,
        }),
    })
}

/// Decode `frame` and require a request payload.
///
/// # Errors
/// Fails if the frame does not decode or carries another payload kind.
pub fn expect_request(frame: &[u8]) -> Result<Request> {
    match wire::decode(frame)?.payload {
        Payload::Request(request) => Ok(request),
        other => bail!("expected a request, got {other:?}"),
    }
}
