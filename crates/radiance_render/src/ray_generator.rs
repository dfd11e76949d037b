//! Camera ray generation.
//!
//! Turns a pinhole camera (intrinsics + camera-to-world pose) into one world
//! space ray per pixel, row-major.

use radiance_math::{CameraPose, Interval, Intrinsics, Ray, Vec3};
use rayon::prelude::*;

use crate::error::{RenderError, Result};

/// Near plane of the synthetic Blender scenes.
pub const DEFAULT_NEAR: f32 = 2.0;
/// Far plane of the synthetic Blender scenes.
pub const DEFAULT_FAR: f32 = 6.0;

/// Everything needed to cast the rays of one image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraView {
    pub width: u32,
    pub height: u32,
    pub intrinsics: Intrinsics,
    pub pose: CameraPose,
    pub near: f32,
    pub far: f32,
}

impl CameraView {
    /// Create a view with the default near/far range.
    pub fn new(width: u32, height: u32, intrinsics: Intrinsics, pose: CameraPose) -> Self {
        Self {
            width,
            height,
            intrinsics,
            pose,
            near: DEFAULT_NEAR,
            far: DEFAULT_FAR,
        }
    }

    /// Set the near/far depth range.
    pub fn with_depth_range(mut self, near: f32, far: f32) -> Self {
        self.near = near;
        self.far = far;
        self
    }

    /// Total number of pixels (and rays).
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(RenderError::InvalidCamera(format!(
                "image size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if !self.intrinsics.has_valid_focal() {
            return Err(RenderError::InvalidCamera(format!(
                "focal lengths must be positive, got fx={} fy={}",
                self.intrinsics.fx, self.intrinsics.fy
            )));
        }
        if self.pose.is_degenerate() {
            return Err(RenderError::InvalidCamera(
                "camera-to-world rotation is degenerate".to_string(),
            ));
        }
        check_range(self.near, self.far)
    }
}

pub(crate) fn check_range(near: f32, far: f32) -> Result<()> {
    if Interval::new(near, far).is_valid_depth_range() {
        Ok(())
    } else {
        Err(RenderError::InvalidRange { near, far })
    }
}

/// Check every ray's depth range.
pub(crate) fn validate_rays(rays: &[Ray]) -> Result<()> {
    rays.iter().try_for_each(|ray| check_range(ray.near, ray.far))
}

/// Generate one ray per pixel, row-major.
///
/// Pixel (row r, col c) maps to the camera-space direction
/// `((c - cx) / fx, -(r - cy) / fy, -1)`, which is rotated into world space
/// and normalized. Every ray starts at the camera centre.
pub fn generate_rays(view: &CameraView) -> Result<Vec<Ray>> {
    view.validate()?;

    let CameraView {
        width,
        height,
        intrinsics,
        pose,
        near,
        far,
    } = *view;

    let rays: Vec<Ray> = (0..height)
        .into_par_iter()
        .flat_map_iter(|row| {
            (0..width).map(move |col| {
                let camera_dir = intrinsics.pixel_direction(row as f32, col as f32);
                let direction = pose.transform_direction(camera_dir).normalize();
                Ray::new(pose.translation, direction, near, far)
            })
        })
        .collect();

    log::debug!(
        "Generated {} rays for {}x{} view (near={}, far={})",
        rays.len(),
        width,
        height,
        near,
        far
    );

    Ok(rays)
}

/// Build a ray batch from parallel arrays, as a dataset hands them out.
///
/// `near` and `far` hold either a single scene-wide value or one value per
/// ray. View directions are the normalized ray directions.
pub fn rays_from_arrays(
    origins: &[Vec3],
    directions: &[Vec3],
    near: &[f32],
    far: &[f32],
) -> Result<Vec<Ray>> {
    let count = origins.len();
    if directions.len() != count {
        return Err(RenderError::InvalidRayBatch(format!(
            "{} origins but {} directions",
            count,
            directions.len()
        )));
    }
    let near = broadcast("near", near, count)?;
    let far = broadcast("far", far, count)?;

    let rays: Vec<Ray> = origins
        .iter()
        .zip(directions)
        .zip(near.iter().zip(&far))
        .map(|((&origin, &direction), (&near, &far))| Ray::new(origin, direction, near, far))
        .collect();

    validate_rays(&rays)?;
    Ok(rays)
}

fn broadcast(name: &str, values: &[f32], count: usize) -> Result<Vec<f32>> {
    match values.len() {
        1 => Ok(vec![values[0]; count]),
        n if n == count => Ok(values.to_vec()),
        n => Err(RenderError::InvalidRayBatch(format!(
            "{name} has {n} entries, expected 1 or {count}"
        ))),
    }
}
