//! Radiance Renderer - volume rendering for radiance fields
//!
//! Integrates color, depth and opacity along camera rays through any
//! [`RadianceField`], with a coarse stratified pass and a fine pass
//! resampled from the coarse weights.
//!
//! # Example
//!
//! ```ignore
//! use radiance_render::{CameraView, ConstantField, FrameRenderer, RenderConfig};
//!
//! let renderer = FrameRenderer::new(RenderConfig::default())?;
//! let frame = renderer.render(&view, &field, &mut rng)?;
//! frame.to_image().save("frame.png")?;
//! ```

mod compositor;
mod error;
mod field;
mod frame;
mod projector;
mod ray_generator;
mod renderer;
mod resampler;
mod sampler;

pub use compositor::{RenderResult, VolumeCompositor, TRANSMITTANCE_EPSILON};
pub use error::{RenderError, Result};
pub use field::{
    sigmoid, Color, ConstantField, FieldError, FieldPass, FieldSamples, RadianceField, SphereField,
};
pub use frame::{color_to_rgb8, FrameBuffer};
pub use projector::{project, ProjectedBatch};
pub use ray_generator::{generate_rays, rays_from_arrays, CameraView, DEFAULT_FAR, DEFAULT_NEAR};
pub use renderer::{FrameRenderer, RayBatchOutput, RenderConfig};
pub use resampler::{
    bin_edges, build_cdf, invert_cdf, width_weighted, HierarchicalResampler, DENOMINATOR_EPSILON,
    WEIGHT_EPSILON,
};
pub use sampler::{DepthBatch, StratifiedSampler};

/// Re-export common math types from radiance_math
pub use radiance_math::{CameraPose, Interval, Intrinsics, Ray, Vec3};
