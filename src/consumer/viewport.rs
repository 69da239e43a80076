use crate::protocol::codec::NormalizedPoint;

/// Host-space rectangle a normalized point is placed into.
/// Camera coordinates grow downwards, host coordinates upwards, so Y is flipped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub center_x: f32,
    pub center_y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(center_x: f32, center_y: f32, width: f32, height: f32) -> Self {
        Self {
            center_x,
            center_y,
            width,
            height,
        }
    }

    /// Out-of-range inputs are clamped to the rectangle's edges.
    pub fn to_world(&self, point: NormalizedPoint) -> (f32, f32) {
        let p = point.clamped();
        let left = self.center_x - self.width / 2.0;
        let bottom = self.center_y - self.height / 2.0;
        (left + p.x * self.width, bottom + (1.0 - p.y) * self.height)
    }
}

impl Default for Viewport {
    /// Unit square centred on the origin.
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, 1.0)
    }
}
