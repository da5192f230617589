pub trait FloatExt {
    /// True when `self` and `other` differ by at most `rel_tol` relative to the
    /// larger magnitude, or by at most `rel_tol` absolutely near zero.
    fn approximately_eq(self, other: Self, rel_tol: Self) -> bool;
}

impl FloatExt for f32 {
    fn approximately_eq(self, other: Self, rel_tol: Self) -> bool {
        let scale = self.abs().max(other.abs()).max(1.0);
        (self - other).abs() <= rel_tol * scale
    }
}

impl FloatExt for f64 {
    fn approximately_eq(self, other: Self, rel_tol: Self) -> bool {
        let scale = self.abs().max(other.abs()).max(1.0);
        (self - other).abs() <= rel_tol * scale
    }
}

/// Largest absolute element-wise difference between two equally long slices.
pub fn max_abs_diff(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(a.len(), b.len(), "slices must have equal length");
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}
