// Re-export glam for convenience
pub use glam::*;

// Radiance math types
mod camera;
mod interval;
mod ray;

pub use camera::{CameraPose, Intrinsics};
pub use interval::Interval;
pub use ray::Ray;
