//! Request, response and event bodies exchanged with the stream service.
//!
//! Tags are part of the wire contract and must never be renumbered. New
//! variants take the next free tag; retired tags stay reserved.

use std::fmt;

use bincode::{Decode, Encode};
use uuid::Uuid;

use super::geometry::{
    BoundingBox,
    Camera,
    Color,
    Dimensions,
    Matrix4,
    Point,
    SectionPlane,
    Vector3,
};
use crate::time::{Timestamp, WireDuration};

/// Token written into a request and echoed by its response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Decode)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Wrap an existing identifier.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self { Self(value.into()) }

    /// Generate a random UUID v4 identifier.
    #[must_use]
    pub fn random() -> Self { Self(Uuid::new_v4().to_string()) }

    /// Borrow the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self { Self(value.to_owned()) }
}

impl From<String> for CorrelationId {
    fn from(value: String) -> Self { Self(value) }
}

// ────────────────────────────────────────────────────────────────────────────
// Shared payload fragments
// ────────────────────────────────────────────────────────────────────────────

/// Stream features negotiated when starting or updating a stream.
#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct StreamAttributes {
    /// Deliver a depth buffer alongside each frame.
    pub depth_buffers: bool,
    /// Render hidden items translucently instead of omitting them.
    pub ghosting: bool,
    /// Upper bound on frames per second; `None` lets the server decide.
    pub max_frame_rate: Option<u32>,
}

/// Optional camera animation applied to a fly-to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct AnimationParams {
    /// Total animation time.
    pub duration: WireDuration,
}

/// Destination of a fly-to request.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub enum FlyToTarget {
    /// Frame the item with this identifier.
    ItemId(String),
    /// Frame the item with this caller-supplied identifier.
    ItemSuppliedId(String),
    /// Frame this box.
    BoundingBox(BoundingBox),
    /// Move to this exact camera.
    Camera(Camera),
}

/// What a scene alteration does to its selected items.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub enum AlterationKind {
    /// Make the items visible.
    Show,
    /// Hide the items.
    Hide,
    /// Highlight the items.
    Select {
        /// Highlight colour.
        color: Color,
    },
    /// Remove highlighting.
    Deselect,
    /// Replace the items' local transform.
    ChangeTransform {
        /// New transform.
        transform: Matrix4,
    },
    /// Restore the items' authored transform.
    ClearTransform,
}

/// One alteration applied to a set of items.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct SceneOperation {
    /// Items to alter.
    pub item_ids: Vec<String>,
    /// Alteration to apply.
    pub kind: AlterationKind,
}

/// Client-side timing for a displayed frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct FrameTiming {
    /// Time from frame receipt to paint.
    pub receive_to_paint: WireDuration,
}

/// A rendered frame pushed by the server.
#[derive(Clone, Debug, Default, PartialEq, Encode, Decode)]
pub struct Frame {
    /// Monotonic frame counter for the stream.
    pub sequence_number: u64,
    /// Encoded image bytes (JPEG or PNG).
    pub image: Vec<u8>,
    /// Size the image was rendered at.
    pub dimensions: Dimensions,
    /// Camera the frame was rendered from.
    pub camera: Camera,
    /// Bounds of the visible scene.
    pub visible_bounding_box: BoundingBox,
}

/// Access token issued by the server.
#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct Token {
    /// Opaque bearer token.
    pub token: String,
    /// Lifetime from issue.
    pub expires_in: WireDuration,
}

/// A single hit-test result.
#[derive(Clone, Debug, Default, PartialEq, Encode, Decode)]
pub struct Hit {
    /// Identifier of the item under the cursor.
    pub item_id: String,
    /// World-space intersection point.
    pub hit_point: Vector3,
    /// Surface normal at the intersection.
    pub hit_normal: Vector3,
}

// ────────────────────────────────────────────────────────────────────────────
// Request bodies
// ────────────────────────────────────────────────────────────────────────────

empty_body! {
    /// Marks the start of a user gesture.
    BeginInteraction;
    /// Marks the end of a user gesture.
    EndInteraction;
    /// Requests the stencil buffer for the current frame.
    GetStencilBuffer;
    /// Requests a fresh access token.
    RefreshToken;
    /// Response result with no payload.
    Ack;
}

/// Replace the active camera.
#[derive(Clone, Copy, Debug, Default, PartialEq, Encode, Decode)]
pub struct ReplaceCamera {
    /// New camera.
    pub camera: Camera,
}

/// Animate the camera to a target.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct FlyTo {
    /// Destination.
    pub target: FlyToTarget,
    /// Animation parameters; `None` jumps immediately.
    pub animation: Option<AnimationParams>,
}

/// Resize the rendered viewport.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct UpdateDimensions {
    /// New size.
    pub dimensions: Dimensions,
}

/// Hit-test a viewport position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Encode, Decode)]
pub struct HitItems {
    /// Viewport position to test.
    pub point: Point,
    /// Include item metadata in the results.
    pub include_metadata: bool,
}

/// Replace the active cross-section planes.
#[derive(Clone, Debug, Default, PartialEq, Encode, Decode)]
pub struct UpdateCrossSectioning {
    /// Planes to apply; empty disables sectioning.
    pub section_planes: Vec<SectionPlane>,
}

/// Apply a batch of scene operations.
#[derive(Clone, Debug, Default, PartialEq, Encode, Decode)]
pub struct CreateSceneAlteration {
    /// Operations in application order.
    pub operations: Vec<SceneOperation>,
}

/// Restore the scene view to its initial state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct ResetSceneView {
    /// Also reset the camera.
    pub include_camera: bool,
}

/// Ask the server for its clock to estimate round-trip time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct SyncTime {
    /// Client clock when the request was issued.
    pub request_time: Timestamp,
}

/// Report client-side frame timings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct RecordPerformance {
    /// Timings gathered since the previous report.
    pub timings: Vec<FrameTiming>,
}

/// Load a saved scene view state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct LoadSceneViewState {
    /// Identifier of the saved state.
    pub scene_view_state_id: String,
}

/// Open a new stream.
#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct StartStream {
    /// Initial viewport size.
    pub dimensions: Dimensions,
    /// Background behind the rendered scene.
    pub frame_background_color: Option<Color>,
    /// Requested stream features.
    pub stream_attributes: Option<StreamAttributes>,
}

/// Resume an existing stream on a fresh connection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct Reconnect {
    /// Stream to resume.
    pub stream_id: String,
    /// Current viewport size.
    pub dimensions: Dimensions,
    /// Stream features to restore.
    pub stream_attributes: Option<StreamAttributes>,
}

/// Change stream features without restarting.
#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct UpdateStream {
    /// New stream features.
    pub stream_attributes: StreamAttributes,
}

/// Server push: display this frame.
#[derive(Clone, Debug, Default, PartialEq, Encode, Decode)]
pub struct DrawFrame {
    /// Frame to display.
    pub frame: Frame,
}

/// Server push: this connection will close; reconnect inside the window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct GracefulReconnection {
    /// Time until the server force-closes the connection.
    pub time_to_connection_close: WireDuration,
    /// Earliest instant to switch connections.
    pub reconnect_window_start_time: Timestamp,
    /// Latest instant to switch connections.
    pub reconnect_window_end_time: Timestamp,
}

tagged_union! {
    /// Operation carried by a request, in either direction.
    pub enum RequestBody {
        /// See [`BeginInteraction`].
        1 => BeginInteraction(BeginInteraction),
        /// See [`EndInteraction`].
        2 => EndInteraction(EndInteraction),
        /// See [`ReplaceCamera`].
        3 => ReplaceCamera(ReplaceCamera),
        /// See [`FlyTo`].
        4 => FlyTo(FlyTo),
        /// See [`UpdateDimensions`].
        5 => UpdateDimensions(UpdateDimensions),
        /// See [`HitItems`].
        6 => HitItems(HitItems),
        /// See [`UpdateCrossSectioning`].
        7 => UpdateCrossSectioning(UpdateCrossSectioning),
        /// See [`CreateSceneAlteration`].
        8 => CreateSceneAlteration(CreateSceneAlteration),
        /// See [`ResetSceneView`].
        9 => ResetSceneView(ResetSceneView),
        /// See [`SyncTime`].
        10 => SyncTime(SyncTime),
        /// See [`RecordPerformance`].
        11 => RecordPerformance(RecordPerformance),
        /// See [`LoadSceneViewState`].
        12 => LoadSceneViewState(LoadSceneViewState),
        /// See [`GetStencilBuffer`].
        13 => GetStencilBuffer(GetStencilBuffer),
        /// See [`RefreshToken`].
        14 => RefreshToken(RefreshToken),
        /// See [`StartStream`].
        15 => StartStream(StartStream),
        /// See [`Reconnect`].
        16 => Reconnect(Reconnect),
        /// See [`UpdateStream`].
        17 => UpdateStream(UpdateStream),
        /// See [`DrawFrame`].
        64 => DrawFrame(DrawFrame),
        /// See [`GracefulReconnection`].
        65 => GracefulReconnection(GracefulReconnection),
    }
}

impl RequestBody {
    /// Short operation name for logs and errors.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::BeginInteraction(_) => "begin-interaction",
            Self::EndInteraction(_) => "end-interaction",
            Self::ReplaceCamera(_) => "replace-camera",
            Self::FlyTo(_) => "fly-to",
            Self::UpdateDimensions(_) => "update-dimensions",
            Self::HitItems(_) => "hit-items",
            Self::UpdateCrossSectioning(_) => "update-cross-sectioning",
            Self::CreateSceneAlteration(_) => "create-scene-alteration",
            Self::ResetSceneView(_) => "reset-scene-view",
            Self::SyncTime(_) => "sync-time",
            Self::RecordPerformance(_) => "record-performance",
            Self::LoadSceneViewState(_) => "load-scene-view-state",
            Self::GetStencilBuffer(_) => "get-stencil-buffer",
            Self::RefreshToken(_) => "refresh-token",
            Self::StartStream(_) => "start-stream",
            Self::Reconnect(_) => "reconnect",
            Self::UpdateStream(_) => "update-stream",
            Self::DrawFrame(_) => "draw-frame",
            Self::GracefulReconnection(_) => "graceful-reconnection",
            Self::Unrecognized(_) => "unrecognized",
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Response results
// ────────────────────────────────────────────────────────────────────────────

/// Identifiers for a freshly started stream.
#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct StartStreamResult {
    /// Stream identifier, needed to reconnect.
    pub stream_id: String,
    /// Scene being streamed.
    pub scene_id: String,
    /// Server session identifier.
    pub session_id: String,
    /// Access token for the session.
    pub token: Option<Token>,
}

/// Server clock reading.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct SyncTimeResult {
    /// Server clock when the reply was produced.
    pub reply_time: Timestamp,
}

/// Hit-test results, nearest first.
#[derive(Clone, Debug, Default, PartialEq, Encode, Decode)]
pub struct HitItemsResult {
    /// Items under the tested point.
    pub hits: Vec<Hit>,
}

/// Stencil buffer image.
#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct StencilBufferResult {
    /// Encoded stencil image.
    pub image: Vec<u8>,
    /// Image size.
    pub dimensions: Dimensions,
}

/// Refreshed access token.
#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct RefreshTokenResult {
    /// New token.
    pub token: Token,
}

tagged_union! {
    /// Successful outcome of a request.
    pub enum ResponseResult {
        /// No payload.
        1 => Ack(Ack),
        /// Reply to [`StartStream`].
        2 => StartStream(StartStreamResult),
        /// Reply to [`SyncTime`].
        3 => SyncTime(SyncTimeResult),
        /// Reply to [`HitItems`].
        4 => HitItems(HitItemsResult),
        /// Reply to [`GetStencilBuffer`].
        5 => GetStencilBuffer(StencilBufferResult),
        /// Reply to [`RefreshToken`].
        6 => RefreshToken(RefreshTokenResult),
    }
}

/// Failure reported by the peer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct ServerError {
    /// One-line description.
    pub summary: String,
    /// Longer explanation, if any.
    pub details: Option<String>,
}

/// Either a result or an error; exactly one is set.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub enum ResponseOutcome {
    /// The request succeeded.
    Result(ResponseResult),
    /// The request failed.
    Error(ServerError),
}

// ────────────────────────────────────────────────────────────────────────────
// Events
// ────────────────────────────────────────────────────────────────────────────

/// A camera animation has finished.
#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct AnimationCompleted {
    /// Identifier of the finished animation.
    pub animation_id: String,
}

/// The streamed scene was modified by another party.
#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct SceneChanged {
    /// Scene that changed.
    pub scene_id: String,
}

tagged_union! {
    /// Unsolicited notification from the server.
    pub enum EventBody {
        /// See [`AnimationCompleted`].
        1 => AnimationCompleted(AnimationCompleted),
        /// See [`SceneChanged`].
        2 => SceneChanged(SceneChanged),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Envelope payloads
// ────────────────────────────────────────────────────────────────────────────

/// Request payload; `correlation_id` is set when a response is expected.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct Request {
    /// Correlation token, absent for fire-and-forget requests.
    pub correlation_id: Option<CorrelationId>,
    /// Requested operation.
    pub body: RequestBody,
}

/// Response payload.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct Response {
    /// Token copied from the originating request.
    pub correlation_id: CorrelationId,
    /// Result or error.
    pub outcome: ResponseOutcome,
}

/// Event payload.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct Event {
    /// Notification body.
    pub body: EventBody,
}

tagged_union! {
    /// Exactly one of request, response or event.
    pub enum Payload {
        /// See [`Request`].
        1 => Request(Request),
        /// See [`Response`].
        2 => Response(Response),
        /// See [`Event`].
        3 => Event(Event),
    }
}

/// Outer wire structure: a send-time stamp and one payload.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct Envelope {
    /// Sender's clock when the envelope was encoded.
    pub sent_at: Timestamp,
    /// Carried message.
    pub payload: Payload,
}

impl Envelope {
    /// Wrap `payload`, stamping it with the current wall-clock time.
    #[must_use]
    pub fn stamped(payload: Payload) -> Self {
        Self {
            sent_at: Timestamp::now(),
            payload,
        }
    }
}
