//! Hierarchical importance resampling.
//!
//! The coarse pass leaves a weight per depth bin. Treating those weights as
//! a piecewise-constant pdf over depth, new samples are drawn by inverting
//! its CDF so they cluster where the coarse pass found matter.

use rand::{Rng, RngCore};

use crate::error::{RenderError, Result};

/// Added to every bin weight so no bin is ever unreachable, even on rays
/// whose coarse weights are all zero.
pub const WEIGHT_EPSILON: f32 = 1e-5;

/// CDF steps narrower than this are treated as width 1 during interpolation.
pub const DENOMINATOR_EPSILON: f32 = 1e-5;

/// Draws extra depth samples from a coarse weight distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HierarchicalResampler {
    n_importance: usize,
}

impl HierarchicalResampler {
    /// `n_importance` is the number of new samples drawn per ray.
    pub fn new(n_importance: usize) -> Result<Self> {
        if n_importance == 0 {
            return Err(RenderError::DegenerateSampling(
                "importance resampling needs at least one new sample".to_string(),
            ));
        }
        Ok(Self { n_importance })
    }

    pub fn n_importance(&self) -> usize {
        self.n_importance
    }

    /// Sample `n_importance` depths from the pdf given by `weights` over the
    /// bins delimited by `bins`.
    ///
    /// `bins` holds `weights.len() + 1` non-decreasing edges. Samples are not
    /// sorted.
    pub fn sample_pdf(
        &self,
        bins: &[f32],
        weights: &[f32],
        rng: &mut dyn RngCore,
    ) -> Result<Vec<f32>> {
        let cdf = build_cdf(bins, weights)?;
        let samples = (0..self.n_importance)
            .map(|_| invert_cdf(bins, &cdf, rng.gen::<f32>()))
            .collect();
        Ok(samples)
    }
}

/// Normalized cumulative distribution of `weights` with a leading zero.
pub fn build_cdf(bins: &[f32], weights: &[f32]) -> Result<Vec<f32>> {
    if weights.is_empty() {
        return Err(RenderError::DegenerateSampling(
            "cannot resample from an empty weight vector".to_string(),
        ));
    }
    if bins.len() != weights.len() + 1 {
        return Err(RenderError::InvalidRayBatch(format!(
            "{} bin edges for {} weights, expected {}",
            bins.len(),
            weights.len(),
            weights.len() + 1
        )));
    }

    let padded: Vec<f32> = weights.iter().map(|&w| w + WEIGHT_EPSILON).collect();
    let total: f32 = padded.iter().sum();

    let mut cdf = Vec::with_capacity(padded.len() + 1);
    cdf.push(0.0);
    let mut running = 0.0f32;
    for w in padded {
        running += w / total;
        cdf.push(running);
    }
    Ok(cdf)
}

/// Map a uniform draw `u` through the inverse CDF.
///
/// `cdf` is the output of [`build_cdf`] for the same `bins`.
pub fn invert_cdf(bins: &[f32], cdf: &[f32], u: f32) -> f32 {
    let last = cdf.len() - 1;

    // First index whose cdf value is >= u
    let index = cdf.partition_point(|&c| c < u);
    let above = index.min(last);
    let below = index.saturating_sub(1).min(last);

    let (cdf_lo, cdf_hi) = (cdf[below], cdf[above]);
    let (bin_lo, bin_hi) = (bins[below], bins[above]);

    let mut denom = cdf_hi - cdf_lo;
    if denom < DENOMINATOR_EPSILON {
        denom = 1.0;
    }
    let fraction = (u - cdf_lo) / denom;
    bin_lo + fraction * (bin_hi - bin_lo)
}

/// Bin edges around sample depths treated as bin centres: the first depth,
/// the midpoints between neighbours, then the last depth.
///
/// N depths give N + 1 edges, one bin per coarse weight.
pub fn bin_edges(depths: &[f32]) -> Vec<f32> {
    let (Some(&first), Some(&last)) = (depths.first(), depths.last()) else {
        return Vec::new();
    };
    let mut edges = Vec::with_capacity(depths.len() + 1);
    edges.push(first);
    edges.extend(depths.windows(2).map(|w| 0.5 * (w[0] + w[1])));
    edges.push(last);
    edges
}

/// Scale each bin's weight by its width relative to the mean bin width.
///
/// Coarse weights are per sample, not per unit depth. Edges from
/// [`bin_edges`] make the end bins half as wide as the inner ones, so
/// without this the ends would be drawn from twice as densely. Falls back to
/// the weights unchanged when the bins have no total width.
pub fn width_weighted(bins: &[f32], weights: &[f32]) -> Vec<f32> {
    let (Some(&first), Some(&last)) = (bins.first(), bins.last()) else {
        return weights.to_vec();
    };
    let mean_width = (last - first) / weights.len() as f32;
    if !(mean_width > 0.0 && mean_width.is_finite()) {
        return weights.to_vec();
    }
    weights
        .iter()
        .zip(bins.windows(2))
        .map(|(&w, edge)| w * (edge[1] - edge[0]) / mean_width)
        .collect()
}
