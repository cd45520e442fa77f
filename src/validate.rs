//! Finiteness gate applied to every outbound request and reply.
//!
//! Camera vectors, bounding boxes, viewport points, plane normals and
//! offsets, and transforms must all be finite. A request carrying `NaN` or
//! an infinity is refused before it reaches the wire.

use thiserror::Error;

use crate::wire::{
    geometry::{BoundingBox, Camera, Matrix4, Point, SectionPlane, Vector3},
    messages::{AlterationKind, FlyToTarget, Hit, RequestBody, ResponseResult},
};

/// A numeric field that is `NaN` or infinite.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("{operation} has a non-finite {field}")]
pub struct NonFiniteField {
    /// Operation name, e.g. `hit-items`.
    pub operation: &'static str,
    /// Offending field group, e.g. `point`.
    pub field: &'static str,
}

/// Values whose every numeric component can be checked for finiteness.
pub trait Finite {
    /// Return `true` when every component is finite.
    fn is_finite(&self) -> bool;
}

impl Finite for f32 {
    fn is_finite(&self) -> bool { f32::is_finite(*self) }
}

impl Finite for Vector3 {
    fn is_finite(&self) -> bool { self.x.is_finite() && self.y.is_finite() && self.z.is_finite() }
}

impl Finite for Point {
    fn is_finite(&self) -> bool { self.x.is_finite() && self.y.is_finite() }
}

impl Finite for BoundingBox {
    fn is_finite(&self) -> bool { self.min.is_finite() && self.max.is_finite() }
}

impl Finite for Camera {
    fn is_finite(&self) -> bool {
        self.position.is_finite() && self.look_at.is_finite() && self.up.is_finite()
    }
}

impl Finite for SectionPlane {
    fn is_finite(&self) -> bool { self.normal.is_finite() && self.offset.is_finite() }
}

impl Finite for Hit {
    fn is_finite(&self) -> bool { self.hit_point.is_finite() && self.hit_normal.is_finite() }
}

impl Finite for Matrix4 {
    fn is_finite(&self) -> bool { self.0.iter().all(|value| value.is_finite()) }
}

fn check(operation: &'static str, field: &'static str, ok: bool) -> Result<(), NonFiniteField> {
    if ok {
        Ok(())
    } else {
        Err(NonFiniteField { operation, field })
    }
}

/// Validate every numeric field of an outbound request body.
///
/// # Errors
/// Returns the first [`NonFiniteField`] found.
pub fn validate_request(body: &RequestBody) -> Result<(), NonFiniteField> {
    let operation = body.name();
    match body {
        RequestBody::ReplaceCamera(replace) => check(operation, "camera", replace.camera.is_finite()),
        RequestBody::FlyTo(fly_to) => match &fly_to.target {
            FlyToTarget::BoundingBox(bounds) => check(operation, "bounding box", bounds.is_finite()),
            FlyToTarget::Camera(camera) => check(operation, "camera", camera.is_finite()),
            FlyToTarget::ItemId(_) | FlyToTarget::ItemSuppliedId(_) => Ok(()),
        },
        RequestBody::HitItems(hit) => check(operation, "point", hit.point.is_finite()),
        RequestBody::UpdateCrossSectioning(sectioning) => check(
            operation,
            "section plane",
            sectioning.section_planes.iter().all(Finite::is_finite),
        ),
        RequestBody::CreateSceneAlteration(alteration) => check(
            operation,
            "transform",
            alteration
                .operations
                .iter()
                .all(|op| match &op.kind {
                    AlterationKind::ChangeTransform { transform } => transform.is_finite(),
                    _ => true,
                }),
        ),
        RequestBody::DrawFrame(draw) => check(
            operation,
            "frame camera",
            draw.frame.camera.is_finite() && draw.frame.visible_bounding_box.is_finite(),
        ),
        _ => Ok(()),
    }
}

/// Validate a result the client sends back in reply to a server request.
///
/// # Errors
/// Returns the first [`NonFiniteField`] found.
pub fn validate_result(result: &ResponseResult) -> Result<(), NonFiniteField> {
    match result {
        ResponseResult::HitItems(reply) => check("hit-items reply", "hit", reply.hits.iter().all(Finite::is_finite)),
        _ => Ok(()),
    }
}
