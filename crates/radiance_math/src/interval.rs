/// A closed interval `[min, max]` on the real line.
///
/// Used for the near/far depth range of a ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub min: f32,
    pub max: f32,
}

impl Interval {
    /// Create a new interval given min and max values.
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Returns the size of the interval (max - min).
    pub fn size(&self) -> f32 {
        self.max - self.min
    }

    /// Returns true if x is within the interval [min, max] (inclusive).
    pub fn contains(&self, x: f32) -> bool {
        self.min <= x && x <= self.max
    }

    /// Linear blend `min * (1 - t) + max * t`.
    ///
    /// Written in the two-product form so that `t = 0` and `t = 1` land
    /// exactly on the endpoints.
    #[inline]
    pub fn lerp(&self, t: f32) -> f32 {
        self.min * (1.0 - t) + self.max * t
    }

    /// A usable ray depth range: both ends finite, min < max, max > 0.
    pub fn is_valid_depth_range(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min < self.max && self.max > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_creation() {
        let interval = Interval::new(2.0, 6.0);
        assert_eq!(interval.min, 2.0);
        assert_eq!(interval.max, 6.0);
        assert_eq!(interval.size(), 4.0);
    }

    #[test]
    fn test_interval_contains() {
        let interval = Interval::new(0.0, 10.0);

        // Inclusive bounds
        assert!(interval.contains(0.0));
        assert!(interval.contains(10.0));
        assert!(interval.contains(5.0));

        // Outside bounds
        assert!(!interval.contains(-0.1));
        assert!(!interval.contains(10.1));
    }

    #[test]
    fn test_interval_lerp_endpoints_exact() {
        let interval = Interval::new(2.0, 6.0);
        assert_eq!(interval.lerp(0.0), 2.0);
        assert_eq!(interval.lerp(1.0), 6.0);
        assert_eq!(interval.lerp(0.5), 4.0);
    }

    #[test]
    fn test_depth_range_validity() {
        assert!(Interval::new(2.0, 6.0).is_valid_depth_range());
        assert!(Interval::new(-1.0, 0.5).is_valid_depth_range());
        assert!(!Interval::new(6.0, 2.0).is_valid_depth_range());
        assert!(!Interval::new(3.0, 3.0).is_valid_depth_range());
        assert!(!Interval::new(-3.0, -1.0).is_valid_depth_range());
        assert!(!Interval::new(f32::NAN, 1.0).is_valid_depth_range());
        assert!(!Interval::new(0.0, f32::INFINITY).is_valid_depth_range());
    }
}
