use serde::{Deserialize, Serialize};

/// Integer pixel rectangle for a detected face region.
///
/// Refined boxes may extend past the frame borders; clamping is the
/// consumer's concern (see [`crate::frame::Frame::crop`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl FaceRect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }
}

/// One decoded face proposal from the primary detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: i32,
    pub confidence: f32,
    pub rect: FaceRect,
}
