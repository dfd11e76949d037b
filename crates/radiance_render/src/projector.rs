//! Depth samples to flat point batches for field queries.

use radiance_math::{Ray, Vec3};

use crate::error::{RenderError, Result};
use crate::sampler::DepthBatch;

/// Query points for a ray batch, flattened ray-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedBatch {
    pub points: Vec<Vec3>,
    pub view_dirs: Vec<Vec3>,
    pub rays: usize,
    pub samples_per_ray: usize,
}

impl ProjectedBatch {
    /// Flat index range belonging to ray `index`.
    pub fn ray_range(&self, index: usize) -> std::ops::Range<usize> {
        let start = index * self.samples_per_ray;
        start..start + self.samples_per_ray
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Place every depth sample on its ray: `origin + direction * depth`.
///
/// Each ray's view direction is repeated once per sample so the field sees
/// matching point/direction pairs.
pub fn project(rays: &[Ray], depths: &DepthBatch) -> Result<ProjectedBatch> {
    if depths.rays() != rays.len() {
        return Err(RenderError::InvalidRayBatch(format!(
            "{} rays but {} depth rows",
            rays.len(),
            depths.rays()
        )));
    }

    let total = depths.as_slice().len();
    let mut points = Vec::with_capacity(total);
    let mut view_dirs = Vec::with_capacity(total);

    for (ray, row) in rays.iter().zip(depths.iter_rays()) {
        points.extend(row.iter().map(|&t| ray.at(t)));
        view_dirs.extend(std::iter::repeat(ray.view_dir).take(row.len()));
    }

    Ok(ProjectedBatch {
        points,
        view_dirs,
        rays: rays.len(),
        samples_per_ray: depths.samples_per_ray(),
    })
}
