//! Per-pixel output grids of a rendered frame.

use image::{GrayImage, Luma, Rgb, RgbImage};
use radiance_math::Interval;

use crate::compositor::RenderResult;
use crate::error::{RenderError, Result};
use crate::field::Color;

/// Row-major H x W grids of color, expected depth and accumulated opacity.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuffer {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<Color>,
    pub depth: Vec<f32>,
    pub acc: Vec<f32>,
}

impl FrameBuffer {
    /// Create a new frame filled with black, zero depth and zero opacity.
    pub fn new(width: u32, height: u32) -> Self {
        let count = width as usize * height as usize;
        Self {
            width,
            height,
            rgb: vec![Color::ZERO; count],
            depth: vec![0.0; count],
            acc: vec![0.0; count],
        }
    }

    /// Reshape row-major per-ray results into grids.
    pub fn from_results(width: u32, height: u32, results: &[RenderResult]) -> Result<Self> {
        let count = width as usize * height as usize;
        if results.len() != count {
            return Err(RenderError::InvalidRayBatch(format!(
                "{} results cannot fill a {}x{} frame",
                results.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            rgb: results.iter().map(|r| r.rgb).collect(),
            depth: results.iter().map(|r| r.depth).collect(),
            acc: results.iter().map(|r| r.acc).collect(),
        })
    }

    #[inline]
    fn index(&self, row: u32, col: u32) -> usize {
        row as usize * self.width as usize + col as usize
    }

    /// Color of pixel (row, col).
    pub fn rgb_at(&self, row: u32, col: u32) -> Color {
        self.rgb[self.index(row, col)]
    }

    /// Expected depth of pixel (row, col).
    pub fn depth_at(&self, row: u32, col: u32) -> f32 {
        self.depth[self.index(row, col)]
    }

    /// Accumulated opacity of pixel (row, col).
    pub fn acc_at(&self, row: u32, col: u32) -> f32 {
        self.acc[self.index(row, col)]
    }

    /// Store one ray's result at pixel (row, col).
    pub fn set(&mut self, row: u32, col: u32, result: &RenderResult) {
        let i = self.index(row, col);
        self.rgb[i] = result.rgb;
        self.depth[i] = result.depth;
        self.acc[i] = result.acc;
    }

    /// 8-bit RGB preview of the color grid.
    pub fn to_image(&self) -> RgbImage {
        RgbImage::from_fn(self.width, self.height, |x, y| Rgb(color_to_rgb8(self.rgb_at(y, x))))
    }

    /// 8-bit preview of the depth grid, mapping `range` to black..white.
    pub fn depth_image(&self, range: Interval) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            let t = (self.depth_at(y, x) - range.min) / range.size();
            Luma([unit_to_u8(t)])
        })
    }
}

#[inline]
fn unit_to_u8(x: f32) -> u8 {
    (255.0 * x.clamp(0.0, 1.0)).round() as u8
}

/// Convert a [0, 1] color to 8-bit RGB.
pub fn color_to_rgb8(color: Color) -> [u8; 3] {
    [unit_to_u8(color.x), unit_to_u8(color.y), unit_to_u8(color.z)]
}
