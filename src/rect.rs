use nalgebra::Matrix1x4;
use num::Float;
use std::fmt::Debug;

/* ------------------------------------------------------------------------------
 * Type aliases
 * ------------------------------------------------------------------------------ */
pub type Xyah<T> = Matrix1x4<T>;

/* ------------------------------------------------------------------------------
 * Rect struct
 * ------------------------------------------------------------------------------ */

/// Axis-aligned bounding box stored as (top-left x, top-left y, width, height).
#[derive(Debug, Clone, PartialEq)]
pub struct Rect<T>
where
    T: Debug + Float,
{
    pub(crate) tlwh: Matrix1x4<T>,
}

impl<T> Rect<T>
where
    T: Clone + Debug + Float,
{
    pub fn new(x: T, y: T, width: T, height: T) -> Self {
        let tlwh = Matrix1x4::new(x, y, width, height);
        Self { tlwh }
    }

    #[inline(always)]
    pub fn x(&self) -> T {
        self.tlwh[(0, 0)]
    }

    #[inline(always)]
    pub fn set_x(&mut self, x: T) {
        self.tlwh[(0, 0)] = x;
    }

    #[inline(always)]
    pub fn y(&self) -> T {
        self.tlwh[(0, 1)]
    }

    #[inline(always)]
    pub fn set_y(&mut self, y: T) {
        self.tlwh[(0, 1)] = y;
    }

    #[inline(always)]
    pub fn width(&self) -> T {
        self.tlwh[(0, 2)]
    }

    #[inline(always)]
    pub fn set_width(&mut self, width: T) {
        self.tlwh[(0, 2)] = width;
    }

    #[inline(always)]
    pub fn height(&self) -> T {
        self.tlwh[(0, 3)]
    }

    #[inline(always)]
    pub fn set_height(&mut self, height: T) {
        self.tlwh[(0, 3)] = height;
    }

    pub fn area(&self) -> T {
        self.tlwh[(0, 2)] * self.tlwh[(0, 3)]
    }

    pub fn calc_iou(&self, other: &Rect<T>) -> T {
        let zero = T::zero();

        let ix = (self.tlwh[(0, 0)] + self.tlwh[(0, 2)])
            .min(other.tlwh[(0, 0)] + other.tlwh[(0, 2)])
            - self.tlwh[(0, 0)].max(other.tlwh[(0, 0)]);
        if ix <= zero {
            return zero;
        }

        let iy = (self.tlwh[(0, 1)] + self.tlwh[(0, 3)])
            .min(other.tlwh[(0, 1)] + other.tlwh[(0, 3)])
            - self.tlwh[(0, 1)].max(other.tlwh[(0, 1)]);
        if iy <= zero {
            return zero;
        }

        let intersection = ix * iy;
        let union = self.area() + other.area() - intersection;
        if union <= zero {
            return zero;
        }
        intersection / union
    }

    /// Get the box as [cx, cy, a, h] where a = w/h is the aspect ratio.
    pub fn get_xyah(&self) -> Xyah<T> {
        let two = T::from(2).unwrap();
        Matrix1x4::new(
            self.tlwh[(0, 0)] + self.tlwh[(0, 2)] / two,
            self.tlwh[(0, 1)] + self.tlwh[(0, 3)] / two,
            self.tlwh[(0, 2)] / self.tlwh[(0, 3)],
            self.tlwh[(0, 3)],
        )
    }

    /// Get bounding box as [x1, y1, x2, y2] format
    pub fn get_tlbr(&self) -> [T; 4] {
        [
            self.tlwh[(0, 0)],
            self.tlwh[(0, 1)],
            self.tlwh[(0, 0)] + self.tlwh[(0, 2)],
            self.tlwh[(0, 1)] + self.tlwh[(0, 3)],
        ]
    }

    /// Create Rect from [x1, y1, x2, y2] format
    pub fn from_tlbr(x1: T, y1: T, x2: T, y2: T) -> Self {
        Self::new(x1, y1, x2 - x1, y2 - y1)
    }

    /// Create Rect from [cx, cy, a, h] format (center, aspect ratio w/h, height)
    pub fn from_xyah(cx: T, cy: T, a: T, h: T) -> Self {
        let two = T::from(2).unwrap();
        let w = if a <= T::zero() { T::zero() } else { a * h };
        Self::new(cx - w / two, cy - h / two, w, h)
    }

    /// Clamp the box to a `cols` x `rows` frame: the top-left corner is moved
    /// inside the frame and width/height are capped at the frame extent.
    pub fn clip(&mut self, cols: T, rows: T) {
        let one = T::one();
        self.tlwh[(0, 0)] = self.tlwh[(0, 0)].max(T::zero());
        self.tlwh[(0, 1)] = self.tlwh[(0, 1)].max(T::zero());
        self.tlwh[(0, 2)] = self.tlwh[(0, 2)].min(cols - one);
        self.tlwh[(0, 3)] = self.tlwh[(0, 3)].min(rows - one);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nearly_eq::assert_nearly_eq;

    #[test]
    fn test_iou_identical() {
        let a = Rect::new(100.0f32, 100.0, 100.0, 100.0);
        assert_nearly_eq!(a.calc_iou(&a.clone()), 1.0, 1e-6);
    }

    #[test]
    fn test_iou_disjoint() {
        let a = Rect::new(0.0f32, 0.0, 100.0, 100.0);
        let b = Rect::new(200.0f32, 200.0, 100.0, 100.0);
        assert_eq!(a.calc_iou(&b), 0.0);
    }

    #[test]
    fn test_iou_partial_overlap() {
        // Two 100x100 boxes shifted by 10 pixels.
        // Intersection: 90x90 = 8100, union: 20000 - 8100 = 11900.
        let a = Rect::new(100.0f32, 100.0, 100.0, 100.0);
        let b = Rect::new(110.0f32, 110.0, 100.0, 100.0);
        assert_nearly_eq!(a.calc_iou(&b), 0.6806723, 1e-5);
    }

    #[test]
    fn test_xyah_roundtrip() {
        let rect = Rect::new(50.0f32, 100.0, 100.0, 200.0);
        let xyah = rect.get_xyah();
        assert_nearly_eq!(xyah[(0, 0)], 100.0, 1e-5);
        assert_nearly_eq!(xyah[(0, 1)], 200.0, 1e-5);
        assert_nearly_eq!(xyah[(0, 2)], 0.5, 1e-5);
        assert_nearly_eq!(xyah[(0, 3)], 200.0, 1e-5);

        let back = Rect::from_xyah(
            xyah[(0, 0)],
            xyah[(0, 1)],
            xyah[(0, 2)],
            xyah[(0, 3)],
        );
        assert_nearly_eq!(back.x(), rect.x(), 1e-4);
        assert_nearly_eq!(back.y(), rect.y(), 1e-4);
        assert_nearly_eq!(back.width(), rect.width(), 1e-4);
        assert_nearly_eq!(back.height(), rect.height(), 1e-4);
    }

    #[test]
    fn test_tlbr_roundtrip() {
        let rect = Rect::new(10.0f32, 20.0, 30.0, 40.0);
        let [x1, y1, x2, y2] = rect.get_tlbr();
        let back = Rect::from_tlbr(x1, y1, x2, y2);
        assert_eq!(back, rect);
    }

    #[test]
    fn test_clip_to_frame() {
        let mut rect = Rect::new(-5.0f32, -3.0, 2000.0, 1500.0);
        rect.clip(1920.0, 1080.0);
        assert_eq!(rect.x(), 0.0);
        assert_eq!(rect.y(), 0.0);
        assert_eq!(rect.width(), 1919.0);
        assert_eq!(rect.height(), 1079.0);
    }
}
