//! Errors reported by the rendering core.

use thiserror::Error;

use crate::field::FieldError;

/// Errors that can occur while building rays, sampling or compositing.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Invalid camera: {0}")]
    InvalidCamera(String),

    #[error("Invalid ray batch: {0}")]
    InvalidRayBatch(String),

    #[error("Invalid depth range: near={near}, far={far}")]
    InvalidRange { near: f32, far: f32 },

    #[error("Degenerate sampling: {0}")]
    DegenerateSampling(String),

    #[error("Radiance field query failed: {0}")]
    FieldQueryFailure(#[source] FieldError),
}

pub type Result<T, E = RenderError> = std::result::Result<T, E>;
