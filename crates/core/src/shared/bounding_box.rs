use serde::{Deserialize, Serialize};

/// Axis-aligned face box in frame pixel coordinates.
///
/// Edges are half-open: `left..right` and `top..bottom`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl BoundingBox {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// Maps a box found on a frame resized by `scale` back to the original frame.
    pub fn unscaled(&self, scale: f64) -> Self {
        let f = |v: i32| (v as f64 / scale) as i32;
        Self::new(f(self.left), f(self.top), f(self.right), f(self.bottom))
    }

    /// Clamps the box to a `width` × `height` frame.
    pub fn clamped(&self, width: u32, height: u32) -> Self {
        let w = width as i32;
        let h = height as i32;
        Self::new(
            self.left.clamp(0, w),
            self.top.clamp(0, h),
            self.right.clamp(0, w),
            self.bottom.clamp(0, h),
        )
    }

    /// Grows the box by `padding` pixels on every side, clamped to the frame.
    pub fn padded(&self, padding: i32, width: u32, height: u32) -> Self {
        Self::new(
            self.left - padding,
            self.top - padding,
            self.right + padding,
            self.bottom + padding,
        )
        .clamped(width, height)
    }

    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let ix1 = self.left.max(other.left);
        let iy1 = self.top.max(other.top);
        let ix2 = self.right.min(other.right);
        let iy2 = self.bottom.min(other.bottom);

        let inter = (ix2 - ix1).max(0) as f64 * (iy2 - iy1).max(0) as f64;
        if inter == 0.0 {
            return 0.0;
        }

        let area_a = self.width() as f64 * self.height() as f64;
        let area_b = other.width() as f64 * other.height() as f64;
        inter / (area_a + area_b - inter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn test_dimensions() {
        let b = BoundingBox::new(10, 20, 50, 80);
        assert_eq!(b.width(), 40);
        assert_eq!(b.height(), 60);
    }

    #[rstest]
    #[case(0.5, BoundingBox::new(20, 40, 100, 160))]
    #[case(0.25, BoundingBox::new(40, 80, 200, 320))]
    #[case(1.0, BoundingBox::new(10, 20, 50, 80))]
    fn test_unscaled(#[case] scale: f64, #[case] expected: BoundingBox) {
        let b = BoundingBox::new(10, 20, 50, 80);
        assert_eq!(b.unscaled(scale), expected);
    }

    #[test]
    fn test_padded_grows_and_clamps() {
        let b = BoundingBox::new(10, 5, 90, 60);
        assert_eq!(b.padded(20, 100, 70), BoundingBox::new(0, 0, 100, 70));
        assert_eq!(b.padded(2, 100, 70), BoundingBox::new(8, 3, 92, 62));
    }

    #[test]
    fn test_iou_identical() {
        let a = BoundingBox::new(10, 10, 110, 110);
        assert_relative_eq!(a.iou(&a), 1.0);
    }

    #[test]
    fn test_iou_partial_overlap() {
        let a = BoundingBox::new(0, 0, 100, 100);
        let b = BoundingBox::new(50, 0, 150, 100);
        assert_relative_eq!(a.iou(&b), 5000.0 / 15000.0);
    }

    #[test]
    fn test_iou_touching_edges() {
        let a = BoundingBox::new(0, 0, 50, 50);
        let b = BoundingBox::new(50, 0, 100, 50);
        assert_relative_eq!(a.iou(&b), 0.0);
    }
}
