use crate::{Interval, Vec3};

/// A camera ray bounded by near and far depths.
///
/// `direction` scales the depth parameter and is not required to be unit
/// length. `view_dir` is the unit direction handed to the radiance field for
/// view-dependent appearance.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    pub view_dir: Vec3,
    pub near: f32,
    pub far: f32,
}

impl Ray {
    /// Create a new ray. The view direction is the normalized `direction`.
    pub fn new(origin: Vec3, direction: Vec3, near: f32, far: f32) -> Self {
        Self {
            origin,
            direction,
            view_dir: direction.normalize_or_zero(),
            near,
            far,
        }
    }

    /// Override the view direction (normalized).
    pub fn with_view_dir(mut self, view_dir: Vec3) -> Self {
        self.view_dir = view_dir.normalize_or_zero();
        self
    }

    /// Get the point along the ray at depth t.
    ///
    /// Returns: origin + t * direction
    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// The `[near, far]` depth range of the ray.
    #[inline]
    pub fn depth_range(&self) -> Interval {
        Interval::new(self.near, self.far)
    }

    /// True when near < far, both are finite and far > 0.
    pub fn has_valid_range(&self) -> bool {
        self.depth_range().is_valid_depth_range()
    }
}
