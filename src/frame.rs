use crate::error::TrackError;
use crate::rect::Rect;

/*------------------------------------------------------------------------------
Frame view
------------------------------------------------------------------------------*/

/// Borrowed single-channel (grayscale) view of a video frame.
///
/// This is the only pixel access the tracker needs: camera motion estimation
/// and appearance feature extraction both run on it.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    gray: &'a [u8],
    cols: usize,
    rows: usize,
}

impl<'a> Frame<'a> {
    pub fn new(
        gray: &'a [u8],
        cols: usize,
        rows: usize,
    ) -> Result<Self, TrackError> {
        if cols == 0 || rows == 0 || gray.len() != cols * rows {
            return Err(TrackError::InvalidInput(format!(
                "frame buffer of {} bytes does not match {}x{}",
                gray.len(),
                cols,
                rows
            )));
        }
        Ok(Self { gray, cols, rows })
    }

    #[inline(always)]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline(always)]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline(always)]
    pub fn data(&self) -> &'a [u8] {
        self.gray
    }

    /// Copy out the pixels under `rect`, clamped to the frame bounds.
    /// Returns the patch and its (width, height).
    pub fn crop(&self, rect: &Rect<f32>) -> (Vec<u8>, usize, usize) {
        let x0 = rect.x().max(0.0) as usize;
        let y0 = rect.y().max(0.0) as usize;
        let x1 = ((rect.x() + rect.width()).max(0.0) as usize).min(self.cols);
        let y1 = ((rect.y() + rect.height()).max(0.0) as usize).min(self.rows);
        if x0 >= x1 || y0 >= y1 {
            return (Vec::new(), 0, 0);
        }

        let (w, h) = (x1 - x0, y1 - y0);
        let mut patch = Vec::with_capacity(w * h);
        for y in y0..y1 {
            patch.extend_from_slice(&self.gray[y * self.cols + x0..y * self.cols + x1]);
        }
        (patch, w, h)
    }
}

/// Appearance feature backend consumed by the tracker.
///
/// Implementations own any patch normalization (resizing, channel layout)
/// and must return a unit-norm vector of a fixed dimension.
pub trait FeatureExtractor {
    fn extract(
        &mut self,
        frame: &Frame<'_>,
        bbox_tlwh: &Rect<f32>,
    ) -> Result<Vec<f32>, TrackError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_size_mismatch() {
        let buf = vec![0u8; 10];
        assert!(Frame::new(&buf, 4, 4).is_err());
        assert!(Frame::new(&buf, 5, 2).is_ok());
    }

    #[test]
    fn test_crop_inside() {
        // 4x4 ramp image
        let buf: Vec<u8> = (0..16).collect();
        let frame = Frame::new(&buf, 4, 4).unwrap();
        let (patch, w, h) = frame.crop(&Rect::new(1.0, 1.0, 2.0, 2.0));
        assert_eq!((w, h), (2, 2));
        assert_eq!(patch, vec![5, 6, 9, 10]);
    }

    #[test]
    fn test_crop_clamps_to_bounds() {
        let buf: Vec<u8> = (0..16).collect();
        let frame = Frame::new(&buf, 4, 4).unwrap();
        let (patch, w, h) = frame.crop(&Rect::new(2.0, 2.0, 100.0, 100.0));
        assert_eq!((w, h), (2, 2));
        assert_eq!(patch, vec![10, 11, 14, 15]);
    }

    #[test]
    fn test_crop_outside_is_empty() {
        let buf: Vec<u8> = (0..16).collect();
        let frame = Frame::new(&buf, 4, 4).unwrap();
        let (patch, w, h) = frame.crop(&Rect::new(10.0, 10.0, 5.0, 5.0));
        assert!(patch.is_empty());
        assert_eq!((w, h), (0, 0));
    }
}
