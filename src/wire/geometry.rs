//! Geometric value types shared by camera, hit-test and sectioning messages.

use bincode::{Decode, Encode};

/// Three-component single-precision vector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Encode, Decode)]
pub struct Vector3 {
    /// X component.
    pub x: f32,
    /// Y component.
    pub y: f32,
    /// Z component.
    pub z: f32,
}

impl Vector3 {
    /// Build a vector from its components.
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self { Self { x, y, z } }
}

/// Viewport position in pixels, measured from the top-left corner.
#[derive(Clone, Copy, Debug, Default, PartialEq, Encode, Decode)]
pub struct Point {
    /// Horizontal offset.
    pub x: f32,
    /// Vertical offset.
    pub y: f32,
}

impl Point {
    /// Build a point from its coordinates.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self { Self { x, y } }
}

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, Default, PartialEq, Encode, Decode)]
pub struct BoundingBox {
    /// Minimum corner.
    pub min: Vector3,
    /// Maximum corner.
    pub max: Vector3,
}

/// Perspective camera.
#[derive(Clone, Copy, Debug, Default, PartialEq, Encode, Decode)]
pub struct Camera {
    /// Eye position.
    pub position: Vector3,
    /// Point the camera is aimed at.
    pub look_at: Vector3,
    /// Up direction.
    pub up: Vector3,
}

/// Viewport size in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Encode, Decode)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Build dimensions from width and height.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self { Self { width, height } }
}

/// Cross-section plane: points `p` with `normal · p = offset` are cut.
#[derive(Clone, Copy, Debug, Default, PartialEq, Encode, Decode)]
pub struct SectionPlane {
    /// Plane normal.
    pub normal: Vector3,
    /// Signed distance from the origin along `normal`.
    pub offset: f32,
}

/// Column-major 4×4 transform.
#[derive(Clone, Copy, Debug, PartialEq, Encode, Decode)]
pub struct Matrix4(pub [f32; 16]);

impl Default for Matrix4 {
    fn default() -> Self {
        Self([
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ])
    }
}

/// RGBA colour.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Encode, Decode)]
pub struct Color {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
    /// Alpha channel.
    pub a: u8,
}
