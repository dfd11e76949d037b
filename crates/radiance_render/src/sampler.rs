//! Stratified depth sampling along rays.

use radiance_math::Ray;
use rand::RngCore;
use rand_distr::{Distribution, StandardNormal};

use crate::error::{RenderError, Result};

/// Per-ray depth samples stored flat, ray-major.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthBatch {
    samples_per_ray: usize,
    depths: Vec<f32>,
}

impl DepthBatch {
    /// Wrap a flat depth buffer holding `samples_per_ray` entries per ray.
    pub fn new(samples_per_ray: usize, depths: Vec<f32>) -> Result<Self> {
        if samples_per_ray == 0 {
            return Err(RenderError::DegenerateSampling(
                "a depth batch needs at least one sample per ray".to_string(),
            ));
        }
        if depths.len() % samples_per_ray != 0 {
            return Err(RenderError::InvalidRayBatch(format!(
                "{} depths do not divide into rows of {}",
                depths.len(),
                samples_per_ray
            )));
        }
        Ok(Self {
            samples_per_ray,
            depths,
        })
    }

    /// Build a batch from one row per ray. All rows must have equal length.
    pub fn from_rows<I>(rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = Vec<f32>>,
    {
        let mut rows = rows.into_iter();
        let Some(first) = rows.next() else {
            return Err(RenderError::InvalidRayBatch("no rows".to_string()));
        };
        let samples_per_ray = first.len();
        let mut depths = first;
        for row in rows {
            if row.len() != samples_per_ray {
                return Err(RenderError::InvalidRayBatch(format!(
                    "ragged rows: expected {} samples, got {}",
                    samples_per_ray,
                    row.len()
                )));
            }
            depths.extend(row);
        }
        Self::new(samples_per_ray, depths)
    }

    /// Number of rays in the batch.
    pub fn rays(&self) -> usize {
        self.depths.len() / self.samples_per_ray
    }

    pub fn samples_per_ray(&self) -> usize {
        self.samples_per_ray
    }

    /// Depths of ray `index`.
    pub fn ray(&self, index: usize) -> &[f32] {
        let start = index * self.samples_per_ray;
        &self.depths[start..start + self.samples_per_ray]
    }

    /// Iterate over the per-ray depth rows.
    pub fn iter_rays(&self) -> std::slice::ChunksExact<'_, f32> {
        self.depths.chunks_exact(self.samples_per_ray)
    }

    /// The flat buffer.
    pub fn as_slice(&self) -> &[f32] {
        &self.depths
    }
}

/// Evenly spaced depths between near and far, optionally jittered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StratifiedSampler {
    n_samples: usize,
    noise_std: f32,
}

impl StratifiedSampler {
    /// `noise_std` is the standard deviation of the Gaussian jitter added to
    /// each depth; zero disables jitter.
    pub fn new(n_samples: usize, noise_std: f32) -> Result<Self> {
        if n_samples == 0 {
            return Err(RenderError::DegenerateSampling(
                "stratified sampling needs at least one sample".to_string(),
            ));
        }
        if !noise_std.is_finite() || noise_std < 0.0 {
            return Err(RenderError::DegenerateSampling(format!(
                "jitter standard deviation must be finite and non-negative, got {noise_std}"
            )));
        }
        Ok(Self {
            n_samples,
            noise_std,
        })
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn noise_std(&self) -> f32 {
        self.noise_std
    }

    /// Distance between neighbouring unjittered samples on `ray`.
    pub fn spacing(&self, ray: &Ray) -> f32 {
        if self.n_samples < 2 {
            ray.depth_range().size()
        } else {
            ray.depth_range().size() / (self.n_samples - 1) as f32
        }
    }

    /// Fractions `i / (N - 1)` for `i` in `0..N`. A single sample sits at 0.
    pub fn fractions(&self) -> Vec<f32> {
        if self.n_samples == 1 {
            return vec![0.0];
        }
        let last = (self.n_samples - 1) as f32;
        (0..self.n_samples).map(|i| i as f32 / last).collect()
    }

    /// Sample depths along one ray.
    ///
    /// Without jitter the result depends only on near, far and the sample
    /// count, and `rng` is left untouched.
    pub fn sample(&self, ray: &Ray, rng: &mut dyn RngCore) -> Vec<f32> {
        let range = ray.depth_range();
        let mut depths: Vec<f32> = self.fractions().into_iter().map(|t| range.lerp(t)).collect();

        if self.noise_std > 0.0 {
            for depth in &mut depths {
                let noise: f32 = StandardNormal.sample(&mut *rng);
                *depth += noise * self.noise_std;
            }
        }

        depths
    }

    /// Sample every ray in order. Ray `i` draws its jitter from `rngs[i]`.
    pub fn sample_batch<R: RngCore>(&self, rays: &[Ray], rngs: &mut [R]) -> Result<DepthBatch> {
        if rngs.len() != rays.len() {
            return Err(RenderError::InvalidRayBatch(format!(
                "{} generators for {} rays",
                rngs.len(),
                rays.len()
            )));
        }
        let mut depths = Vec::with_capacity(rays.len() * self.n_samples);
        for (ray, rng) in rays.iter().zip(rngs.iter_mut()) {
            depths.extend(self.sample(ray, rng));
        }
        DepthBatch::new(self.n_samples, depths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use radiance_math::Vec3;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Panics if any randomness is requested.
    struct NoRandomness;

    impl RngCore for NoRandomness {
        fn next_u32(&mut self) -> u32 {
            panic!("unexpected randomness")
        }
        fn next_u64(&mut self) -> u64 {
            panic!("unexpected randomness")
        }
        fn fill_bytes(&mut self, _dest: &mut [u8]) {
            panic!("unexpected randomness")
        }
        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
            panic!("unexpected randomness")
        }
    }

    fn ray(near: f32, far: f32) -> Ray {
        Ray::new(Vec3::ZERO, Vec3::NEG_Z, near, far)
    }

    #[test]
    fn test_even_spacing_without_jitter() {
        let sampler = StratifiedSampler::new(4, 0.0).unwrap();
        let depths = sampler.sample(&ray(2.0, 6.0), &mut NoRandomness);

        assert_eq!(depths.len(), 4);
        assert_eq!(depths[0], 2.0);
        assert_abs_diff_eq!(depths[1], 2.0 + 4.0 / 3.0, epsilon = 1e-5);
        assert_abs_diff_eq!(depths[2], 2.0 + 8.0 / 3.0, epsilon = 1e-5);
        assert_eq!(depths[3], 6.0);
    }

    #[test]
    fn test_single_sample_sits_at_near() {
        let sampler = StratifiedSampler::new(1, 0.0).unwrap();
        assert_eq!(sampler.sample(&ray(1.0, 3.0), &mut NoRandomness), vec![1.0]);
    }

    #[test]
    fn test_jitter_is_seeded() {
        let sampler = StratifiedSampler::new(16, 0.05).unwrap();
        let r = ray(2.0, 6.0);

        let a = sampler.sample(&r, &mut StdRng::seed_from_u64(7));
        let b = sampler.sample(&r, &mut StdRng::seed_from_u64(7));
        let c = sampler.sample(&r, &mut StdRng::seed_from_u64(8));

        assert_eq!(a, b);
        assert_ne!(a, c);

        // Small noise stays close to the stratified grid
        let clean = StratifiedSampler::new(16, 0.0)
            .unwrap()
            .sample(&r, &mut NoRandomness);
        for (jittered, base) in a.iter().zip(&clean) {
            assert!((jittered - base).abs() < 0.5);
        }
    }

    #[test]
    fn test_rejects_degenerate_config() {
        assert!(matches!(
            StratifiedSampler::new(0, 0.0),
            Err(RenderError::DegenerateSampling(_))
        ));
        assert!(matches!(
            StratifiedSampler::new(8, -1.0),
            Err(RenderError::DegenerateSampling(_))
        ));
        assert!(matches!(
            StratifiedSampler::new(8, f32::NAN),
            Err(RenderError::DegenerateSampling(_))
        ));
    }

    #[test]
    fn test_sample_batch_layout() {
        let sampler = StratifiedSampler::new(3, 0.0).unwrap();
        let rays = [ray(0.0, 2.0), ray(4.0, 8.0)];
        let batch = sampler
            .sample_batch(&rays, &mut [NoRandomness, NoRandomness])
            .unwrap();

        assert_eq!(batch.rays(), 2);
        assert_eq!(batch.samples_per_ray(), 3);
        assert_eq!(batch.ray(0), &[0.0, 1.0, 2.0]);
        assert_eq!(batch.ray(1), &[4.0, 6.0, 8.0]);
    }

    #[test]
    fn test_sample_batch_uses_each_rays_generator() {
        let sampler = StratifiedSampler::new(8, 0.1).unwrap();
        let r = ray(2.0, 6.0);
        let mut rngs = [StdRng::seed_from_u64(1), StdRng::seed_from_u64(2)];
        let batch = sampler.sample_batch(&[r, r], &mut rngs).unwrap();

        assert_eq!(batch.ray(0), sampler.sample(&r, &mut StdRng::seed_from_u64(1)));
        assert_eq!(batch.ray(1), sampler.sample(&r, &mut StdRng::seed_from_u64(2)));
    }

    #[test]
    fn test_sample_batch_needs_one_generator_per_ray() {
        let sampler = StratifiedSampler::new(3, 0.0).unwrap();
        assert!(matches!(
            sampler.sample_batch(&[ray(0.0, 1.0), ray(0.0, 1.0)], &mut [NoRandomness]),
            Err(RenderError::InvalidRayBatch(_))
        ));
    }

    #[test]
    fn test_depth_batch_validation() {
        assert!(matches!(
            DepthBatch::new(3, vec![0.0; 4]),
            Err(RenderError::InvalidRayBatch(_))
        ));
        assert!(matches!(
            DepthBatch::from_rows(vec![vec![0.0, 1.0], vec![0.0]]),
            Err(RenderError::InvalidRayBatch(_))
        ));

        let batch = DepthBatch::from_rows(vec![vec![0.0, 1.0], vec![2.0, 3.0]]).unwrap();
        let rows: Vec<&[f32]> = batch.iter_rays().collect();
        assert_eq!(rows, vec![&[0.0, 1.0][..], &[2.0, 3.0][..]]);
    }
}
