//! The radiance field interface consumed by the renderer.
//!
//! The renderer never owns a field. It borrows one for the duration of a
//! render call and only relies on the contract of [`RadianceField::query`]:
//! one color in [0, 1]^3 and one density in [0, 1] per queried point, with
//! no side effects for a fixed model state.

use radiance_math::Vec3;

use crate::error::{RenderError, Result};

/// Color type alias (RGB values in 0-1)
pub type Color = Vec3;

/// Error type produced by field implementations. Passed through to the
/// caller untouched inside [`RenderError::FieldQueryFailure`].
pub type FieldError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Which stage of the two-pass pipeline is querying the field.
///
/// Fields that keep separate coarse and fine networks pick one here; analytic
/// fields usually ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldPass {
    Coarse,
    Fine,
}

/// Colors and densities answered by a field, one entry per queried point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldSamples {
    pub colors: Vec<Color>,
    pub densities: Vec<f32>,
}

impl FieldSamples {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            colors: Vec::with_capacity(capacity),
            densities: Vec::with_capacity(capacity),
        }
    }

    /// Number of answered points.
    pub fn len(&self) -> usize {
        self.densities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.densities.is_empty()
    }

    pub fn push(&mut self, color: Color, density: f32) {
        self.colors.push(color);
        self.densities.push(density);
    }
}

/// A queryable scene representation: trained network, voxel grid or an
/// analytic function.
///
/// Must be `Sync` because ray chunks are rendered in parallel against a
/// shared reference.
pub trait RadianceField: Sync {
    /// Evaluate color and density at each point.
    ///
    /// `view_dirs`, when present, has the same length as `points`.
    fn query(
        &self,
        points: &[Vec3],
        view_dirs: Option<&[Vec3]>,
        pass: FieldPass,
    ) -> std::result::Result<FieldSamples, FieldError>;
}

/// Query a field and check that it answered once per point, with every
/// density and color channel in [0, 1].
pub(crate) fn query_checked(
    field: &dyn RadianceField,
    points: &[Vec3],
    view_dirs: Option<&[Vec3]>,
    pass: FieldPass,
) -> Result<FieldSamples> {
    let samples = field
        .query(points, view_dirs, pass)
        .map_err(RenderError::FieldQueryFailure)?;

    if samples.colors.len() != points.len() || samples.densities.len() != points.len() {
        return Err(RenderError::InvalidRayBatch(format!(
            "field answered {} colors and {} densities for {} points",
            samples.colors.len(),
            samples.densities.len(),
            points.len()
        )));
    }

    let unit = 0.0..=1.0;
    if let Some((i, d)) = samples
        .densities
        .iter()
        .enumerate()
        .find(|(_, d)| !unit.contains(*d))
    {
        return Err(RenderError::InvalidRayBatch(format!(
            "field density {d} at point {i} is outside [0, 1]"
        )));
    }
    if let Some((i, c)) = samples
        .colors
        .iter()
        .enumerate()
        .find(|(_, c)| !c.to_array().iter().all(|x| unit.contains(x)))
    {
        return Err(RenderError::InvalidRayBatch(format!(
            "field color {c} at point {i} is outside [0, 1]"
        )));
    }

    Ok(samples)
}

/// Logistic activation mapping a raw network output into (0, 1).
#[inline]
pub fn sigmoid(raw: f32) -> f32 {
    1.0 / (1.0 + (-raw).exp())
}

/// A homogeneous medium: the same color and density everywhere.
#[derive(Debug, Clone, Copy)]
pub struct ConstantField {
    pub color: Color,
    pub density: f32,
}

impl ConstantField {
    pub fn new(color: Color, density: f32) -> Self {
        Self {
            color: color.clamp(Color::ZERO, Color::ONE),
            density: density.clamp(0.0, 1.0),
        }
    }
}

impl RadianceField for ConstantField {
    fn query(
        &self,
        points: &[Vec3],
        _view_dirs: Option<&[Vec3]>,
        _pass: FieldPass,
    ) -> std::result::Result<FieldSamples, FieldError> {
        Ok(FieldSamples {
            colors: vec![self.color; points.len()],
            densities: vec![self.density; points.len()],
        })
    }
}

/// A solid colored sphere in empty space.
#[derive(Debug, Clone, Copy)]
pub struct SphereField {
    pub center: Vec3,
    pub radius: f32,
    pub color: Color,
    pub density: f32,
}

impl SphereField {
    pub fn new(center: Vec3, radius: f32, color: Color, density: f32) -> Self {
        Self {
            center,
            radius,
            color: color.clamp(Color::ZERO, Color::ONE),
            density: density.clamp(0.0, 1.0),
        }
    }

    fn contains(&self, p: Vec3) -> bool {
        (p - self.center).length_squared() <= self.radius * self.radius
    }
}

impl RadianceField for SphereField {
    fn query(
        &self,
        points: &[Vec3],
        _view_dirs: Option<&[Vec3]>,
        _pass: FieldPass,
    ) -> std::result::Result<FieldSamples, FieldError> {
        let mut samples = FieldSamples::with_capacity(points.len());
        for &p in points {
            if self.contains(p) {
                samples.push(self.color, self.density);
            } else {
                samples.push(Color::ZERO, 0.0);
            }
        }
        Ok(samples)
    }
}
