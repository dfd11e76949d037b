//! Two-pass volume renderer.
//!
//! Runs the coarse and fine passes over a ray batch:
//! - Stratified coarse samples, queried and composited
//! - Importance samples drawn from the coarse weights
//! - Coarse and importance depths merged, sorted, queried and composited
//!
//! Ray chunks render in parallel with rayon. Every ray owns a generator
//! seeded from one base seed and its index in the batch, so output does not
//! depend on chunk size or thread scheduling.

use std::time::Instant;

use radiance_math::Ray;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::compositor::{RenderResult, VolumeCompositor};
use crate::error::{RenderError, Result};
use crate::field::{query_checked, FieldPass, RadianceField};
use crate::frame::FrameBuffer;
use crate::projector::project;
use crate::ray_generator::{generate_rays, validate_rays, CameraView};
use crate::resampler::{bin_edges, width_weighted, HierarchicalResampler};
use crate::sampler::{DepthBatch, StratifiedSampler};

/// Render configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Stratified samples per ray in the coarse pass
    pub n_samples: usize,
    /// Extra importance samples per ray for the fine pass (0 = coarse only)
    pub n_importance: usize,
    /// Pass view directions to the field
    pub use_viewdirs: bool,
    /// Standard deviation of Gaussian jitter on coarse depths
    pub noise_std: f32,
    /// Composite over a white background
    pub white_background: bool,
    /// Rays per parallel work unit and per field query
    pub chunk_size: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            n_samples: 64,
            n_importance: 64,
            use_viewdirs: true,
            noise_std: 0.0,
            white_background: false,
            chunk_size: 1024,
        }
    }
}

impl RenderConfig {
    /// Set sample counts for the coarse pass and the importance pass.
    pub fn with_samples(mut self, n_samples: usize, n_importance: usize) -> Self {
        self.n_samples = n_samples;
        self.n_importance = n_importance;
        self
    }

    /// Set the coarse depth jitter.
    pub fn with_noise(mut self, noise_std: f32) -> Self {
        self.noise_std = noise_std;
        self
    }

    /// Set background compositing.
    pub fn with_white_background(mut self, white_background: bool) -> Self {
        self.white_background = white_background;
        self
    }

    /// Set whether view directions are passed to the field.
    pub fn with_viewdirs(mut self, use_viewdirs: bool) -> Self {
        self.use_viewdirs = use_viewdirs;
        self
    }

    /// Set the number of rays per chunk.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }
}

/// Per-ray results of both passes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RayBatchOutput {
    pub coarse: Vec<RenderResult>,
    /// Absent when the importance pass is disabled
    pub fine: Option<Vec<RenderResult>>,
}

impl RayBatchOutput {
    /// Fine results when available, otherwise coarse.
    pub fn primary(&self) -> &[RenderResult] {
        self.fine.as_deref().unwrap_or(&self.coarse)
    }

    fn append(&mut self, other: RayBatchOutput) {
        self.coarse.extend(other.coarse);
        if let Some(more) = other.fine {
            self.fine.get_or_insert_with(Vec::new).extend(more);
        }
    }
}

/// Coarse/fine volume renderer.
#[derive(Debug, Clone)]
pub struct FrameRenderer {
    config: RenderConfig,
    sampler: StratifiedSampler,
    resampler: Option<HierarchicalResampler>,
    compositor: VolumeCompositor,
}

impl FrameRenderer {
    /// Validate the configuration and build the pipeline stages.
    pub fn new(config: RenderConfig) -> Result<Self> {
        if config.chunk_size == 0 {
            return Err(RenderError::InvalidRayBatch(
                "chunk size must be at least one ray".to_string(),
            ));
        }
        let sampler = StratifiedSampler::new(config.n_samples, config.noise_std)?;
        let resampler = if config.n_importance > 0 {
            Some(HierarchicalResampler::new(config.n_importance)?)
        } else {
            None
        };
        let compositor = VolumeCompositor::new(config.white_background);

        Ok(Self {
            config,
            sampler,
            resampler,
            compositor,
        })
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Render a full image: one ray per pixel, reshaped into H x W grids.
    pub fn render(
        &self,
        view: &CameraView,
        field: &dyn RadianceField,
        rng: &mut dyn RngCore,
    ) -> Result<FrameBuffer> {
        let start = Instant::now();
        let rays = generate_rays(view)?;

        log::info!(
            "Rendering {}x{} frame: {} rays, {} coarse + {} importance samples per ray",
            view.width,
            view.height,
            rays.len(),
            self.config.n_samples,
            self.config.n_importance
        );

        let output = self.render_rays(&rays, field, rng)?;
        let frame = FrameBuffer::from_results(view.width, view.height, output.primary())?;

        log::info!("Rendered in {:?}", start.elapsed());
        Ok(frame)
    }

    /// Render an arbitrary ray batch, returning coarse and fine results.
    ///
    /// `rng` is read once for a base seed. Field errors are returned as
    /// [`RenderError::FieldQueryFailure`] holding the field's own error.
    pub fn render_rays(
        &self,
        rays: &[Ray],
        field: &dyn RadianceField,
        rng: &mut dyn RngCore,
    ) -> Result<RayBatchOutput> {
        validate_rays(rays)?;

        let base_seed = rng.next_u64();
        if rays.is_empty() {
            return Ok(RayBatchOutput {
                coarse: Vec::new(),
                fine: self.resampler.map(|_| Vec::new()),
            });
        }

        let spacing = min_spacing(&self.sampler, rays);
        if self.sampler.noise_std() > spacing {
            log::warn!(
                "Depth jitter ({}) exceeds sample spacing ({}); coarse samples may reorder",
                self.sampler.noise_std(),
                spacing
            );
        }

        let chunk_size = self.config.chunk_size;
        let chunks = rays
            .par_chunks(chunk_size)
            .enumerate()
            .map(|(chunk_index, chunk)| {
                self.render_chunk(chunk, chunk_index * chunk_size, base_seed, field)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut output = RayBatchOutput::default();
        for chunk in chunks {
            output.append(chunk);
        }
        Ok(output)
    }

    fn render_chunk(
        &self,
        rays: &[Ray],
        first_index: usize,
        base_seed: u64,
        field: &dyn RadianceField,
    ) -> Result<RayBatchOutput> {
        let mut rngs: Vec<StdRng> = (0..rays.len())
            .map(|i| ray_rng(base_seed, first_index + i))
            .collect();

        let coarse_depths = self.sampler.sample_batch(rays, &mut rngs)?;
        let coarse = self.run_pass(rays, &coarse_depths, field, FieldPass::Coarse)?;

        let Some(resampler) = self.resampler else {
            return Ok(RayBatchOutput { coarse, fine: None });
        };

        let per_ray = self.sampler.n_samples() + resampler.n_importance();
        let mut fine_depths = Vec::with_capacity(rays.len() * per_ray);
        for ((row, result), rng) in coarse_depths.iter_rays().zip(&coarse).zip(&mut rngs) {
            fine_depths.extend(merge_importance_samples(row, &result.weights, &resampler, rng)?);
        }
        let fine_depths = DepthBatch::new(per_ray, fine_depths)?;
        let fine = self.run_pass(rays, &fine_depths, field, FieldPass::Fine)?;

        Ok(RayBatchOutput {
            coarse,
            fine: Some(fine),
        })
    }

    fn run_pass(
        &self,
        rays: &[Ray],
        depths: &DepthBatch,
        field: &dyn RadianceField,
        pass: FieldPass,
    ) -> Result<Vec<RenderResult>> {
        let batch = project(rays, depths)?;
        let view_dirs = self.config.use_viewdirs.then_some(batch.view_dirs.as_slice());
        let samples = query_checked(field, &batch.points, view_dirs, pass)?;
        let results = self.compositor.composite_batch(&samples, depths)?;

        log::debug!(
            "{:?} pass: {} rays x {} samples",
            pass,
            batch.rays,
            batch.samples_per_ray
        );
        Ok(results)
    }
}

/// Narrowest stratified spacing over a batch.
fn min_spacing(sampler: &StratifiedSampler, rays: &[Ray]) -> f32 {
    rays.iter()
        .map(|ray| sampler.spacing(ray))
        .fold(f32::INFINITY, f32::min)
}

/// Generator for ray `index` of a batch rendered with `base_seed`.
///
/// `seed_from_u64` scrambles its input, so neighbouring indices give
/// unrelated streams.
fn ray_rng(base_seed: u64, index: usize) -> StdRng {
    StdRng::seed_from_u64(base_seed.wrapping_add(index as u64))
}

/// Draw importance samples from one ray's coarse weights and merge them
/// with the coarse depths, ascending.
///
/// Coarse depths may be out of order when jittered, so (depth, weight) pairs
/// are sorted before the bins are built. Weights are scaled by bin width so
/// equal weights give an even spread over the ray.
fn merge_importance_samples(
    coarse_depths: &[f32],
    weights: &[f32],
    resampler: &HierarchicalResampler,
    rng: &mut dyn RngCore,
) -> Result<Vec<f32>> {
    let mut pairs: Vec<(f32, f32)> = coarse_depths
        .iter()
        .copied()
        .zip(weights.iter().copied())
        .collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    let (centres, sorted_weights): (Vec<f32>, Vec<f32>) = pairs.into_iter().unzip();

    let edges = bin_edges(&centres);
    let density = width_weighted(&edges, &sorted_weights);
    let mut merged = resampler.sample_pdf(&edges, &density, rng)?;
    merged.extend_from_slice(coarse_depths);
    merged.sort_by(|a, b| a.total_cmp(b));
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{Color, ConstantField, FieldError, FieldSamples, SphereField};
    use approx::assert_abs_diff_eq;
    use radiance_math::{CameraPose, Intrinsics, Vec3};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn small_view() -> CameraView {
        CameraView::new(2, 2, Intrinsics::new(1.0, 1.0, 0.5, 0.5), CameraPose::IDENTITY)
    }

    /// Records how it was called, answers like a constant field.
    struct RecordingField {
        inner: ConstantField,
        coarse_calls: AtomicUsize,
        fine_calls: AtomicUsize,
        saw_viewdirs: Mutex<Vec<bool>>,
    }

    impl RecordingField {
        fn new() -> Self {
            Self {
                inner: ConstantField::new(Color::new(0.2, 0.4, 0.6), 0.1),
                coarse_calls: AtomicUsize::new(0),
                fine_calls: AtomicUsize::new(0),
                saw_viewdirs: Mutex::new(Vec::new()),
            }
        }
    }

    impl RadianceField for RecordingField {
        fn query(
            &self,
            points: &[Vec3],
            view_dirs: Option<&[Vec3]>,
            pass: FieldPass,
        ) -> std::result::Result<FieldSamples, FieldError> {
            match pass {
                FieldPass::Coarse => self.coarse_calls.fetch_add(1, Ordering::SeqCst),
                FieldPass::Fine => self.fine_calls.fetch_add(1, Ordering::SeqCst),
            };
            if let Some(dirs) = view_dirs {
                assert_eq!(dirs.len(), points.len());
            }
            self.saw_viewdirs.lock().unwrap().push(view_dirs.is_some());
            self.inner.query(points, view_dirs, pass)
        }
    }

    #[derive(Debug)]
    struct OutOfMemory;

    impl std::fmt::Display for OutOfMemory {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "device out of memory")
        }
    }

    impl std::error::Error for OutOfMemory {}

    struct FailingField;

    impl RadianceField for FailingField {
        fn query(
            &self,
            _points: &[Vec3],
            _view_dirs: Option<&[Vec3]>,
            _pass: FieldPass,
        ) -> std::result::Result<FieldSamples, FieldError> {
            Err(Box::new(OutOfMemory))
        }
    }

    #[test]
    fn test_constant_field_matches_analytic_composite() {
        let density = 0.1;
        let color = Color::new(0.2, 0.4, 0.6);
        let field = ConstantField::new(color, density);
        let config = RenderConfig::default().with_samples(8, 8);
        let renderer = FrameRenderer::new(config).unwrap();
        let mut rng = StdRng::seed_from_u64(42);

        let frame = renderer.render(&small_view(), &field, &mut rng).unwrap();
        assert_eq!((frame.width, frame.height), (2, 2));
        assert_eq!(frame.rgb.len(), 4);

        // 16 samples per ray, each with the same alpha
        let acc = 1.0 - (1.0f32 - density).powi(16);
        for row in 0..2 {
            for col in 0..2 {
                let rgb = frame.rgb_at(row, col);
                assert_abs_diff_eq!(frame.acc_at(row, col), acc, epsilon = 1e-5);
                assert_abs_diff_eq!(rgb.x, color.x * acc, epsilon = 1e-5);
                assert_abs_diff_eq!(rgb.y, color.y * acc, epsilon = 1e-5);
                assert_abs_diff_eq!(rgb.z, color.z * acc, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn test_white_background_fills_remaining_energy() {
        let field = ConstantField::new(Color::ZERO, 0.0);
        let config = RenderConfig::default()
            .with_samples(4, 4)
            .with_white_background(true);
        let renderer = FrameRenderer::new(config).unwrap();

        let frame = renderer
            .render(&small_view(), &field, &mut StdRng::seed_from_u64(1))
            .unwrap();
        assert!(frame.rgb.iter().all(|&c| c == Color::ONE));
        assert!(frame.acc.iter().all(|&a| a == 0.0));
    }

    #[test]
    fn test_both_passes_query_field() {
        let field = RecordingField::new();
        let config = RenderConfig::default().with_samples(4, 4).with_chunk_size(2);
        let renderer = FrameRenderer::new(config).unwrap();

        let output = renderer
            .render_rays(
                &generate_rays(&small_view()).unwrap(),
                &field,
                &mut StdRng::seed_from_u64(0),
            )
            .unwrap();

        // 4 rays in chunks of 2
        assert_eq!(field.coarse_calls.load(Ordering::SeqCst), 2);
        assert_eq!(field.fine_calls.load(Ordering::SeqCst), 2);
        assert!(field.saw_viewdirs.lock().unwrap().iter().all(|&seen| seen));

        assert_eq!(output.coarse.len(), 4);
        let fine = output.fine.as_ref().unwrap();
        assert_eq!(fine.len(), 4);
        assert_eq!(fine[0].weights.len(), 8);
        assert_eq!(output.coarse[0].weights.len(), 4);
        assert_eq!(output.primary(), fine.as_slice());
    }

    #[test]
    fn test_coarse_only_when_importance_disabled() {
        let field = RecordingField::new();
        let config = RenderConfig::default().with_samples(4, 0).with_viewdirs(false);
        let renderer = FrameRenderer::new(config).unwrap();

        let output = renderer
            .render_rays(
                &generate_rays(&small_view()).unwrap(),
                &field,
                &mut StdRng::seed_from_u64(0),
            )
            .unwrap();

        assert_eq!(field.fine_calls.load(Ordering::SeqCst), 0);
        assert!(output.fine.is_none());
        assert_eq!(output.primary(), output.coarse.as_slice());
        assert!(field.saw_viewdirs.lock().unwrap().iter().all(|&seen| !seen));
    }

    #[test]
    fn test_output_independent_of_chunking() {
        let field =
            SphereField::new(Vec3::new(0.0, 0.0, -4.0), 1.0, Color::new(0.9, 0.3, 0.1), 0.5);
        let view = CameraView::new(
            8,
            8,
            Intrinsics::from_focal(8.0, 8, 8),
            CameraPose::IDENTITY,
        );
        let base = RenderConfig::default().with_samples(16, 16).with_noise(0.01);

        let a = FrameRenderer::new(base.clone().with_chunk_size(1))
            .unwrap()
            .render(&view, &field, &mut StdRng::seed_from_u64(11))
            .unwrap();
        let b = FrameRenderer::new(base.with_chunk_size(1000))
            .unwrap()
            .render(&view, &field, &mut StdRng::seed_from_u64(11))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_seed_reproduces_frame() {
        let field = SphereField::new(Vec3::new(0.0, 0.0, -4.0), 1.0, Color::ONE, 0.3);
        let view = CameraView::new(4, 4, Intrinsics::from_focal(4.0, 4, 4), CameraPose::IDENTITY);
        let renderer = FrameRenderer::new(RenderConfig::default().with_samples(8, 16)).unwrap();

        let a = renderer.render(&view, &field, &mut StdRng::seed_from_u64(5)).unwrap();
        let b = renderer.render(&view, &field, &mut StdRng::seed_from_u64(5)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_sphere_is_visible_in_the_centre() {
        let field = SphereField::new(Vec3::new(0.0, 0.0, -4.0), 1.0, Color::X, 0.5);
        let view = CameraView::new(9, 9, Intrinsics::from_focal(9.0, 9, 9), CameraPose::IDENTITY);
        let renderer = FrameRenderer::new(RenderConfig::default().with_samples(32, 32)).unwrap();

        let frame = renderer
            .render(&view, &field, &mut StdRng::seed_from_u64(2))
            .unwrap();

        // Centre pixel looks straight through the sphere, corner misses it
        assert!(frame.acc_at(4, 4) > 0.99);
        assert!(frame.rgb_at(4, 4).x > 0.99);
        // Surface is ~3.04 away; the first occupied samples sit just behind it
        assert_abs_diff_eq!(frame.depth_at(4, 4), 3.1, epsilon = 0.15);
        assert_eq!(frame.acc_at(0, 0), 0.0);
    }

    #[test]
    fn test_merged_samples_are_sorted_and_keep_coarse() {
        let resampler = HierarchicalResampler::new(16).unwrap();
        let coarse = [2.0, 3.0, 4.0, 5.0, 6.0];
        let weights = [0.0, 0.1, 0.8, 0.1, 0.0];
        let mut rng = StdRng::seed_from_u64(8);

        let merged = merge_importance_samples(&coarse, &weights, &resampler, &mut rng).unwrap();
        assert_eq!(merged.len(), 21);
        for pair in merged.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        for depth in coarse {
            assert!(merged.contains(&depth));
        }
    }

    #[test]
    fn test_uniform_weights_spread_evenly_over_ray() {
        let resampler = HierarchicalResampler::new(40_000).unwrap();
        let coarse = [2.0, 2.0 + 4.0 / 3.0, 2.0 + 8.0 / 3.0, 6.0];
        let mut rng = StdRng::seed_from_u64(17);

        let merged = merge_importance_samples(&coarse, &[0.25; 4], &resampler, &mut rng).unwrap();
        assert!(merged.iter().all(|d| (2.0..=6.0).contains(d)));

        let mut counts = [0usize; 4];
        for &d in &merged {
            counts[((d - 2.0) as usize).min(3)] += 1;
        }
        for count in counts {
            let share = count as f32 / merged.len() as f32;
            assert!((share - 0.25).abs() < 0.02, "quarter share {share}");
        }
    }

    #[test]
    fn test_merge_handles_jittered_coarse_order() {
        let resampler = HierarchicalResampler::new(8).unwrap();
        let coarse = [2.0, 3.2, 2.9, 4.0];
        let weights = [0.0, 0.5, 0.5, 0.0];
        let mut rng = StdRng::seed_from_u64(8);

        let merged = merge_importance_samples(&coarse, &weights, &resampler, &mut rng).unwrap();
        assert!(merged.iter().all(|d| (2.0..=4.0).contains(d)));
        for pair in merged.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
    }

    #[test]
    fn test_field_error_propagates_unmodified() {
        let renderer = FrameRenderer::new(RenderConfig::default().with_samples(4, 4)).unwrap();
        let err = renderer
            .render(&small_view(), &FailingField, &mut StdRng::seed_from_u64(0))
            .unwrap_err();

        match err {
            RenderError::FieldQueryFailure(source) => {
                assert!(source.downcast_ref::<OutOfMemory>().is_some());
                assert_eq!(source.to_string(), "device out of memory");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_out_of_range_density_is_an_error() {
        struct OverdenseField;

        impl RadianceField for OverdenseField {
            fn query(
                &self,
                points: &[Vec3],
                _view_dirs: Option<&[Vec3]>,
                _pass: FieldPass,
            ) -> std::result::Result<FieldSamples, FieldError> {
                Ok(FieldSamples {
                    colors: vec![Color::ONE; points.len()],
                    densities: vec![1.5; points.len()],
                })
            }
        }

        let view = CameraView::new(1, 1, Intrinsics::new(1.0, 1.0, 0.0, 0.0), CameraPose::IDENTITY);
        let renderer = FrameRenderer::new(RenderConfig::default().with_samples(4, 0)).unwrap();
        let result = renderer.render(&view, &OverdenseField, &mut StdRng::seed_from_u64(0));
        assert!(matches!(result, Err(RenderError::InvalidRayBatch(_))));
    }

    #[test]
    fn test_jitter_warning_uses_narrowest_ray() {
        let sampler = StratifiedSampler::new(5, 0.2).unwrap();
        let rays = [
            Ray::new(Vec3::ZERO, Vec3::NEG_Z, 2.0, 6.0),
            Ray::new(Vec3::ZERO, Vec3::NEG_Z, 2.0, 2.4),
        ];
        assert_abs_diff_eq!(min_spacing(&sampler, &rays), 0.1, epsilon = 1e-5);
        assert!(sampler.noise_std() > min_spacing(&sampler, &rays));
        assert!(sampler.noise_std() < sampler.spacing(&rays[0]));
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(matches!(
            FrameRenderer::new(RenderConfig::default().with_samples(0, 8)),
            Err(RenderError::DegenerateSampling(_))
        ));
        assert!(matches!(
            FrameRenderer::new(RenderConfig::default().with_chunk_size(0)),
            Err(RenderError::InvalidRayBatch(_))
        ));
        assert!(matches!(
            FrameRenderer::new(RenderConfig::default().with_noise(-0.5)),
            Err(RenderError::DegenerateSampling(_))
        ));
    }

    #[test]
    fn test_render_rays_rejects_bad_range() {
        let renderer = FrameRenderer::new(RenderConfig::default()).unwrap();
        let rays = [Ray::new(Vec3::ZERO, Vec3::NEG_Z, 6.0, 2.0)];
        let field = ConstantField::new(Color::ONE, 0.5);
        let result = renderer.render_rays(&rays, &field, &mut StdRng::seed_from_u64(0));
        assert!(matches!(result, Err(RenderError::InvalidRange { .. })));
    }

    #[test]
    fn test_config_json_defaults() {
        let config: RenderConfig =
            serde_json::from_str(r#"{ "n_importance": 128, "white_background": true }"#).unwrap();
        assert_eq!(config.n_samples, 64);
        assert_eq!(config.n_importance, 128);
        assert!(config.white_background);
        assert_eq!(config.chunk_size, 1024);

        let json = serde_json::to_string(&config).unwrap();
        let back: RenderConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
