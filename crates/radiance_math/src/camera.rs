use glam::{Mat3, Mat4, Vec3};

/// Pinhole camera intrinsics (focal lengths and principal point, in pixels).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intrinsics {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
}

impl Intrinsics {
    /// Create intrinsics from explicit focal lengths and principal point.
    pub fn new(fx: f32, fy: f32, cx: f32, cy: f32) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// Square pixels with the principal point at the image centre.
    pub fn from_focal(focal: f32, width: u32, height: u32) -> Self {
        Self::new(focal, focal, width as f32 / 2.0, height as f32 / 2.0)
    }

    /// Read intrinsics from a conventional K matrix
    /// `[[fx, 0, cx], [0, fy, cy], [0, 0, 1]]`.
    ///
    /// glam matrices are column-major, so `cx`/`cy` live in the third column.
    pub fn from_matrix(k: Mat3) -> Self {
        Self::new(k.x_axis.x, k.y_axis.y, k.z_axis.x, k.z_axis.y)
    }

    /// The K matrix for these intrinsics.
    pub fn to_matrix(&self) -> Mat3 {
        Mat3::from_cols(
            Vec3::new(self.fx, 0.0, 0.0),
            Vec3::new(0.0, self.fy, 0.0),
            Vec3::new(self.cx, self.cy, 1.0),
        )
    }

    /// Focal lengths must be finite and strictly positive.
    pub fn has_valid_focal(&self) -> bool {
        self.fx.is_finite() && self.fy.is_finite() && self.fx > 0.0 && self.fy > 0.0
    }

    /// Camera-space direction through pixel (row, col).
    ///
    /// The camera looks down -Z with +Y up, so image rows grow downward.
    #[inline]
    pub fn pixel_direction(&self, row: f32, col: f32) -> Vec3 {
        Vec3::new((col - self.cx) / self.fx, -(row - self.cy) / self.fy, -1.0)
    }
}

/// Camera-to-world transform: a rotation plus the camera centre.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub rotation: Mat3,
    pub translation: Vec3,
}

impl CameraPose {
    pub const IDENTITY: CameraPose = CameraPose {
        rotation: Mat3::IDENTITY,
        translation: Vec3::ZERO,
    };

    pub fn new(rotation: Mat3, translation: Vec3) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Take the upper 3x4 block of a camera-to-world matrix.
    pub fn from_matrix(c2w: Mat4) -> Self {
        Self::new(Mat3::from_mat4(c2w), c2w.w_axis.truncate())
    }

    /// Pose of a camera at `eye` looking at `target`.
    pub fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Self {
        let forward = (target - eye).normalize();
        let right = forward.cross(up).normalize();
        let true_up = right.cross(forward);
        Self::new(Mat3::from_cols(right, true_up, -forward), eye)
    }

    /// Rotate a camera-space direction into world space (no translation).
    #[inline]
    pub fn transform_direction(&self, direction: Vec3) -> Vec3 {
        self.rotation * direction
    }

    /// True when the rotation cannot map directions meaningfully.
    pub fn is_degenerate(&self) -> bool {
        !self.rotation.is_finite()
            || !self.translation.is_finite()
            || self.rotation.determinant().abs() < 1e-6
    }
}

impl Default for CameraPose {
    fn default() -> Self {
        Self::IDENTITY
    }
}
