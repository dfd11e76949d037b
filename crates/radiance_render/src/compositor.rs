//! Alpha compositing of field samples along a ray.
//!
//! Given per-sample opacity `alpha_i` the weight of sample `i` is
//! `alpha_i * T_i`, where `T_i` is the probability that light survives every
//! earlier sample. Color, depth and opacity maps are weight-averaged sums.

use crate::error::{RenderError, Result};
use crate::field::{Color, FieldSamples};
use crate::sampler::DepthBatch;

/// Added to each survival factor so a fully opaque sample does not pin the
/// transmittance of everything behind it to exactly zero.
pub const TRANSMITTANCE_EPSILON: f32 = 1e-10;

/// Composited output of one ray.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderResult {
    /// Weighted color, plus background if enabled
    pub rgb: Color,
    /// Expected depth under the weight distribution
    pub depth: f32,
    /// Accumulated opacity (sum of weights)
    pub acc: f32,
    /// Per-sample weights, kept for hierarchical resampling
    pub weights: Vec<f32>,
}

/// Turns per-sample color and opacity into per-ray maps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VolumeCompositor {
    /// Composite over white instead of black
    pub white_background: bool,
}

impl VolumeCompositor {
    pub fn new(white_background: bool) -> Self {
        Self { white_background }
    }

    /// Transmittance before each sample: an exclusive running product of
    /// `1 - alpha + eps`, starting at 1.
    pub fn transmittance(alphas: &[f32]) -> Vec<f32> {
        let mut transmittance = Vec::with_capacity(alphas.len());
        let mut survival = 1.0f32;
        for &alpha in alphas {
            transmittance.push(survival);
            survival *= 1.0 - alpha + TRANSMITTANCE_EPSILON;
        }
        transmittance
    }

    /// Compositing weights `alpha_i * T_i`.
    pub fn weights(alphas: &[f32]) -> Vec<f32> {
        alphas
            .iter()
            .zip(Self::transmittance(alphas))
            .map(|(&alpha, t)| alpha * t)
            .collect()
    }

    /// Composite one ray.
    ///
    /// Depths are used as given; they only enter the depth map, so the order
    /// of samples matters for the weights but not for validity.
    pub fn composite(
        &self,
        alphas: &[f32],
        colors: &[Color],
        depths: &[f32],
    ) -> Result<RenderResult> {
        if colors.len() != alphas.len() || depths.len() != alphas.len() {
            return Err(RenderError::InvalidRayBatch(format!(
                "compositing {} alphas with {} colors and {} depths",
                alphas.len(),
                colors.len(),
                depths.len()
            )));
        }

        let weights = Self::weights(alphas);

        let mut rgb = Color::ZERO;
        let mut depth = 0.0f32;
        let mut acc = 0.0f32;
        for ((&w, &color), &t) in weights.iter().zip(colors).zip(depths) {
            rgb += color * w;
            depth += w * t;
            acc += w;
        }

        if self.white_background {
            rgb += Color::splat(1.0 - acc);
        }

        Ok(RenderResult {
            rgb,
            depth,
            acc,
            weights,
        })
    }

    /// Composite a flat batch of field answers against its depth layout.
    pub fn composite_batch(
        &self,
        samples: &FieldSamples,
        depths: &DepthBatch,
    ) -> Result<Vec<RenderResult>> {
        if samples.len() != depths.as_slice().len() {
            return Err(RenderError::InvalidRayBatch(format!(
                "{} field samples for {} depths",
                samples.len(),
                depths.as_slice().len()
            )));
        }

        let n = depths.samples_per_ray();
        samples
            .densities
            .chunks_exact(n)
            .zip(samples.colors.chunks_exact(n))
            .zip(depths.iter_rays())
            .map(|((alphas, colors), row)| self.composite(alphas, colors, row))
            .collect()
    }
}
