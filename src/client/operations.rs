//! Typed request operations.

use super::{RequestError, StreamClient};
use crate::wire::{
    geometry::{Camera, Dimensions, Point, SectionPlane},
    messages::{
        AnimationParams,
        BeginInteraction,
        CreateSceneAlteration,
        EndInteraction,
        FlyTo,
        FlyToTarget,
        FrameTiming,
        GetStencilBuffer,
        Hit,
        HitItems,
        LoadSceneViewState,
        Reconnect,
        RecordPerformance,
        RefreshToken,
        ReplaceCamera,
        RequestBody,
        ResetSceneView,
        ResponseResult,
        SceneOperation,
        StartStream,
        StartStreamResult,
        StencilBufferResult,
        StreamAttributes,
        SyncTime,
        SyncTimeResult,
        Token,
        UpdateCrossSectioning,
        UpdateDimensions,
        UpdateStream,
    },
};
use crate::time::Timestamp;

fn expect_ack(result: ResponseResult) -> Result<(), RequestError> {
    match result {
        ResponseResult::Ack(_) => Ok(()),
        other => Err(unexpected("ack", &other)),
    }
}

const fn unexpected(expected: &'static str, received: &ResponseResult) -> RequestError {
    RequestError::UnexpectedResult {
        expected,
        received: received.tag(),
    }
}

/// Each method sends one request and waits for its response.
///
/// Methods that return `()` require an acknowledgement; any other result
/// kind yields [`RequestError::UnexpectedResult`].
impl StreamClient {
    /// Signal the start of a user gesture.
    ///
    /// The interaction tracker enters the interacting state before the
    /// request is sent.
    ///
    /// # Errors
    /// See [`StreamClient::send_with_response`].
    pub async fn begin_interaction(&self) -> Result<(), RequestError> {
        self.interaction().begin();
        expect_ack(
            self.send_with_response(RequestBody::BeginInteraction(BeginInteraction))
                .await?,
        )
    }

    /// Signal the end of a user gesture and start the cool-down.
    ///
    /// # Errors
    /// See [`StreamClient::send_with_response`].
    pub async fn end_interaction(&self) -> Result<(), RequestError> {
        self.interaction().end();
        expect_ack(
            self.send_with_response(RequestBody::EndInteraction(EndInteraction))
                .await?,
        )
    }

    /// Replace the active camera.
    ///
    /// # Errors
    /// Fails without sending if any camera component is non-finite.
    pub async fn replace_camera(&self, camera: Camera) -> Result<(), RequestError> {
        expect_ack(
            self.send_with_response(RequestBody::ReplaceCamera(ReplaceCamera { camera }))
                .await?,
        )
    }

    /// Move the camera to `target`, animated when `animation` is given.
    ///
    /// # Errors
    /// Fails without sending if a box or camera target is non-finite.
    pub async fn fly_to(
        &self,
        target: FlyToTarget,
        animation: Option<AnimationParams>,
    ) -> Result<(), RequestError> {
        expect_ack(
            self.send_with_response(RequestBody::FlyTo(FlyTo { target, animation }))
                .await?,
        )
    }

    /// Resize the rendered viewport.
    ///
    /// # Errors
    /// See [`StreamClient::send_with_response`].
    pub async fn update_dimensions(&self, dimensions: Dimensions) -> Result<(), RequestError> {
        expect_ack(
            self.send_with_response(RequestBody::UpdateDimensions(UpdateDimensions { dimensions }))
                .await?,
        )
    }

    /// Hit-test a viewport position; nearest hit first.
    ///
    /// # Errors
    /// Fails without sending if `point` is non-finite.
    pub async fn hit_items(&self, point: Point, include_metadata: bool) -> Result<Vec<Hit>, RequestError> {
        let body = RequestBody::HitItems(HitItems {
            point,
            include_metadata,
        });
        match self.send_with_response(body).await? {
            ResponseResult::HitItems(result) => Ok(result.hits),
            other => Err(unexpected("hit-items", &other)),
        }
    }

    /// Replace the cross-section planes; an empty list disables sectioning.
    ///
    /// # Errors
    /// Fails without sending if a plane is non-finite.
    pub async fn update_cross_sectioning(&self, section_planes: Vec<SectionPlane>) -> Result<(), RequestError> {
        expect_ack(
            self.send_with_response(RequestBody::UpdateCrossSectioning(UpdateCrossSectioning {
                section_planes,
            }))
            .await?,
        )
    }

    /// Apply scene operations in order.
    ///
    /// # Errors
    /// Fails without sending if a transform is non-finite.
    pub async fn create_scene_alteration(&self, operations: Vec<SceneOperation>) -> Result<(), RequestError> {
        expect_ack(
            self.send_with_response(RequestBody::CreateSceneAlteration(CreateSceneAlteration {
                operations,
            }))
            .await?,
        )
    }

    /// Restore the initial scene view.
    ///
    /// # Errors
    /// See [`StreamClient::send_with_response`].
    pub async fn reset_scene_view(&self, include_camera: bool) -> Result<(), RequestError> {
        expect_ack(
            self.send_with_response(RequestBody::ResetSceneView(ResetSceneView { include_camera }))
                .await?,
        )
    }

    /// Read the server clock, stamping the request with the local clock.
    ///
    /// # Errors
    /// See [`StreamClient::send_with_response`].
    pub async fn sync_time(&self) -> Result<SyncTimeResult, RequestError> {
        let body = RequestBody::SyncTime(SyncTime {
            request_time: Timestamp::now(),
        });
        match self.send_with_response(body).await? {
            ResponseResult::SyncTime(result) => Ok(result),
            other => Err(unexpected("sync-time", &other)),
        }
    }

    /// Report frame timings.
    ///
    /// # Errors
    /// See [`StreamClient::send_with_response`].
    pub async fn record_performance(&self, timings: Vec<FrameTiming>) -> Result<(), RequestError> {
        expect_ack(
            self.send_with_response(RequestBody::RecordPerformance(RecordPerformance { timings }))
                .await?,
        )
    }

    /// Load a saved scene view state.
    ///
    /// # Errors
    /// See [`StreamClient::send_with_response`].
    pub async fn load_scene_view_state(&self, scene_view_state_id: impl Into<String>) -> Result<(), RequestError> {
        let body = RequestBody::LoadSceneViewState(LoadSceneViewState {
            scene_view_state_id: scene_view_state_id.into(),
        });
        expect_ack(self.send_with_response(body).await?)
    }

    /// Fetch the stencil buffer for the current frame.
    ///
    /// # Errors
    /// See [`StreamClient::send_with_response`].
    pub async fn get_stencil_buffer(&self) -> Result<StencilBufferResult, RequestError> {
        match self
            .send_with_response(RequestBody::GetStencilBuffer(GetStencilBuffer))
            .await?
        {
            ResponseResult::GetStencilBuffer(result) => Ok(result),
            other => Err(unexpected("stencil-buffer", &other)),
        }
    }

    /// Obtain a fresh access token.
    ///
    /// # Errors
    /// See [`StreamClient::send_with_response`].
    pub async fn refresh_token(&self) -> Result<Token, RequestError> {
        match self
            .send_with_response(RequestBody::RefreshToken(RefreshToken))
            .await?
        {
            ResponseResult::RefreshToken(result) => Ok(result.token),
            other => Err(unexpected("refresh-token", &other)),
        }
    }

    /// Open a stream at `dimensions`.
    ///
    /// # Errors
    /// See [`StreamClient::send_with_response`].
    pub async fn start_stream(&self, start: StartStream) -> Result<StartStreamResult, RequestError> {
        match self.send_with_response(RequestBody::StartStream(start)).await? {
            ResponseResult::StartStream(result) => Ok(result),
            other => Err(unexpected("start-stream", &other)),
        }
    }

    /// Resume a stream on the current connection.
    ///
    /// # Errors
    /// See [`StreamClient::send_with_response`].
    pub async fn reconnect(&self, reconnect: Reconnect) -> Result<(), RequestError> {
        expect_ack(self.send_with_response(RequestBody::Reconnect(reconnect)).await?)
    }

    /// Change stream features; no response is expected.
    ///
    /// # Errors
    /// Returns [`RequestError::Wire`] if the request cannot be encoded.
    pub fn update_stream(&self, stream_attributes: StreamAttributes) -> Result<(), RequestError> {
        self.send_fire_and_forget(RequestBody::UpdateStream(UpdateStream { stream_attributes }))
    }
}
