//! Outstanding requests keyed by correlation identifier.

use std::{
    collections::{HashMap, hash_map::Entry},
    sync::Mutex,
};

use tokio::{sync::oneshot, time::Instant};
use tracing::debug;

use super::RequestError;
use crate::{
    sync::lock,
    wire::messages::{CorrelationId, RequestBody, Response, ResponseOutcome, ResponseResult},
};

/// Settles one awaiting caller.
pub(crate) type Completion = oneshot::Receiver<Result<ResponseResult, RequestError>>;

struct PendingRequest {
    created_at: Instant,
    request: RequestBody,
    completion: oneshot::Sender<Result<ResponseResult, RequestError>>,
}

/// Pending map guarded by a single mutex.
#[derive(Default)]
pub(crate) struct PendingRequests {
    records: Mutex<HashMap<CorrelationId, PendingRequest>>,
}

impl PendingRequests {
    /// Store `request` under a fresh identifier not currently in use.
    pub(crate) fn register(&self, request: RequestBody) -> (CorrelationId, Completion) {
        let (completion, receiver) = oneshot::channel();
        let mut records = lock(&self.records);
        loop {
            if let Entry::Vacant(slot) = records.entry(CorrelationId::random()) {
                let id = slot.key().clone();
                slot.insert(PendingRequest {
                    created_at: Instant::now(),
                    request,
                    completion,
                });
                return (id, receiver);
            }
        }
    }

    /// Settle the record matching `response`, if there is one.
    ///
    /// Returns `false` for unknown or already settled identifiers.
    pub(crate) fn resolve(&self, response: Response) -> bool {
        let Response {
            correlation_id,
            outcome,
        } = response;
        let Some(record) = lock(&self.records).remove(&correlation_id) else {
            debug!(%correlation_id, "ignoring response with no pending request");
            return false;
        };
        debug!(
            %correlation_id,
            operation = record.request.name(),
            elapsed = ?record.created_at.elapsed(),
            "response received"
        );
        let settled = match outcome {
            ResponseOutcome::Result(result) => Ok(result),
            ResponseOutcome::Error(error) => Err(RequestError::Server {
                correlation_id,
                request: Box::new(record.request),
                summary: error.summary,
                details: error.details,
            }),
        };
        if record.completion.send(settled).is_err() {
            debug!("caller stopped waiting for the response");
        }
        true
    }

    /// Drop the record for `id` without settling it.
    pub(crate) fn remove(&self, id: &CorrelationId) -> bool { lock(&self.records).remove(id).is_some() }

    /// Settle every outstanding record with `error()`; returns how many.
    pub(crate) fn reject_all(&self, error: impl Fn() -> RequestError) -> usize {
        let drained: Vec<PendingRequest> = lock(&self.records).drain().map(|(_, record)| record).collect();
        let count = drained.len();
        for record in drained {
            if record.completion.send(Err(error())).is_err() {
                debug!(operation = record.request.name(), "caller stopped waiting");
            }
        }
        count
    }

    pub(crate) fn len(&self) -> usize { lock(&self.records).len() }
}

/// Removes a record when its caller stops waiting.
///
/// Settled records are already gone, so dropping the guard after a
/// response arrives is a no-op.
pub(crate) struct PendingGuard<'a> {
    pending: &'a PendingRequests,
    correlation_id: CorrelationId,
}

impl<'a> PendingGuard<'a> {
    pub(crate) const fn new(pending: &'a PendingRequests, correlation_id: CorrelationId) -> Self {
        Self {
            pending,
            correlation_id,
        }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.pending.remove(&self.correlation_id) {
            debug!(correlation_id = %self.correlation_id, "caller abandoned request");
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;
    use crate::{
        test_helpers::tracing::capture_single_event,
        wire::messages::{Ack, ResetSceneView, ServerError},
    };

    #[fixture]
    fn pending() -> PendingRequests { PendingRequests::default() }

    fn reset() -> RequestBody {
        RequestBody::ResetSceneView(ResetSceneView {
            include_camera: true,
        })
    }

    fn ack(correlation_id: &CorrelationId) -> Response {
        Response {
            correlation_id: correlation_id.clone(),
            outcome: ResponseOutcome::Result(ResponseResult::Ack(Ack)),
        }
    }

    #[rstest]
    #[tokio::test]
    async fn resolves_exactly_once(pending: PendingRequests) {
        let (id, completion) = pending.register(reset());

        assert!(pending.resolve(ack(&id)));
        assert!(!pending.resolve(ack(&id)));
        assert!(!pending.resolve(ack(&id)));

        let result = completion.await.expect("settled");
        assert!(matches!(result, Ok(ResponseResult::Ack(_))));
        assert_eq!(pending.len(), 0);
    }

    #[rstest]
    fn unmatched_responses_are_inert(pending: PendingRequests) {
        let (_id, _completion) = pending.register(reset());

        let event = capture_single_event(|| {
            assert!(!pending.resolve(ack(&CorrelationId::new("stranger"))));
        });

        assert_eq!(event.level(), tracing::Level::DEBUG);
        assert_eq!(event.field("correlation_id"), Some("stranger"));
        assert_eq!(pending.len(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn error_outcomes_carry_the_original_request(pending: PendingRequests) {
        let (id, completion) = pending.register(reset());
        pending.resolve(Response {
            correlation_id: id.clone(),
            outcome: ResponseOutcome::Error(ServerError {
                summary: "no scene".to_owned(),
                details: Some("scene was unloaded".to_owned()),
            }),
        });

        match completion.await.expect("settled") {
            Err(RequestError::Server {
                correlation_id,
                request,
                summary,
                details,
            }) => {
                assert_eq!(correlation_id, id);
                assert_eq!(*request, reset());
                assert_eq!(summary, "no scene");
                assert_eq!(details.as_deref(), Some("scene was unloaded"));
            }
            other => panic!("unexpected settlement: {other:?}"),
        }
    }

    #[rstest]
    #[tokio::test]
    async fn reject_all_settles_every_caller(pending: PendingRequests) {
        let (_a, first) = pending.register(reset());
        let (_b, second) = pending.register(reset());

        assert_eq!(pending.reject_all(|| RequestError::Disposed), 2);

        assert!(matches!(first.await, Ok(Err(RequestError::Disposed))));
        assert!(matches!(second.await, Ok(Err(RequestError::Disposed))));
        assert_eq!(pending.len(), 0);
    }

    #[rstest]
    fn identifiers_are_unique(pending: PendingRequests) {
        let ids: std::collections::HashSet<CorrelationId> =
            (0..256).map(|_| pending.register(reset()).0).collect();
        assert_eq!(ids.len(), 256);
        assert_eq!(pending.len(), 256);
    }
}
