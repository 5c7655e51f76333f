//! Camera Snapshot
//!
//! Immutable per-stage camera state captured by the scene manager before
//! stage tasks launch, so concurrent stages never race on live camera data.

use glam::{Mat4, Vec3};

/// View/projection state for one stage's pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraSnapshot {
    pub view: Mat4,
    pub projection: Mat4,
    pub inv_projection: Mat4,
    /// World-space camera position, derived from the view matrix.
    pub position: Vec3,
    pub near: f32,
    pub far: f32,
}

impl CameraSnapshot {
    #[must_use]
    pub fn new(view: Mat4, projection: Mat4, near: f32, far: f32) -> Self {
        let inv_view = view.inverse();
        Self {
            view,
            projection,
            inv_projection: projection.inverse(),
            position: inv_view.w_axis.truncate(),
            near,
            far,
        }
    }

    /// Combined view-projection matrix.
    #[inline]
    #[must_use]
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    /// Squared distance from the camera to `point`; used for draw sorting.
    #[inline]
    #[must_use]
    pub fn distance_sq(&self, point: Vec3) -> f32 {
        self.position.distance_squared(point)
    }
}

impl Default for CameraSnapshot {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY, 0.1, 1000.0)
    }
}
