//! Errors surfaced to callers awaiting a request.

use thiserror::Error;

use crate::{
    validate::NonFiniteField,
    wire::{
        WireError,
        messages::{CorrelationId, RequestBody},
    },
};

/// Why a request did not produce a result.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The server answered with an error outcome.
    #[error("request {correlation_id} failed: {summary}")]
    Server {
        /// Identifier the request was sent with.
        correlation_id: CorrelationId,
        /// The request as it was sent.
        request: Box<RequestBody>,
        /// One-line description from the server.
        summary: String,
        /// Longer explanation, if the server sent one.
        details: Option<String>,
    },
    /// The request carried a `NaN` or infinite value and was not sent.
    #[error(transparent)]
    NonFinitePayload(#[from] NonFiniteField),
    /// The client was disposed before a response arrived.
    #[error("stream client disposed")]
    Disposed,
    /// The response carried a different result kind than the operation expects.
    #[error("expected a {expected} result, received result tag {received}")]
    UnexpectedResult {
        /// Result kind the operation expects.
        expected: &'static str,
        /// Wire tag of the result that arrived.
        received: u32,
    },
    /// The request could not be encoded.
    #[error(transparent)]
    Wire(#[from] WireError),
}
