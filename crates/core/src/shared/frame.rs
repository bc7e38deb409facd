use ndarray::{s, ArrayView3};

use crate::shared::bounding_box::BoundingBox;

/// A single decoded camera frame: contiguous RGB bytes in row-major order.
///
/// Format conversion happens at capture boundaries only; the pipeline
/// treats pixel data as opaque. `index` is the capture sequence number
/// within the producing session.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Restamps the frame with a new sequence number.
    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Copies the pixels inside `bbox` (clamped to the frame) into a new frame.
    ///
    /// Returns `None` when the clamped box is empty.
    pub fn crop(&self, bbox: &BoundingBox) -> Option<Frame> {
        let clamped = bbox.clamped(self.width, self.height);
        if clamped.width() <= 0 || clamped.height() <= 0 {
            return None;
        }
        let view = self.as_ndarray();
        let region = view.slice(s![
            clamped.top as usize..clamped.bottom as usize,
            clamped.left as usize..clamped.right as usize,
            ..
        ]);
        let data: Vec<u8> = region.iter().copied().collect();
        Some(Frame::new(
            data,
            clamped.width() as u32,
            clamped.height() as u32,
            self.channels,
            self.index,
        ))
    }

    /// Nearest-neighbour resize by `factor` (e.g. 0.5 halves both sides).
    ///
    /// A factor of 1.0 or more returns a copy of the frame.
    pub fn downscaled(&self, factor: f64) -> Frame {
        if factor >= 1.0 {
            return self.clone();
        }
        let new_w = ((self.width as f64 * factor).round() as u32).max(1);
        let new_h = ((self.height as f64 * factor).round() as u32).max(1);
        let src = self.as_ndarray();
        let src_w = self.width as usize;
        let src_h = self.height as usize;
        let channels = self.channels as usize;

        let mut data = Vec::with_capacity(new_w as usize * new_h as usize * channels);
        for y in 0..new_h as usize {
            let src_y = ((y as f64 / factor) as usize).min(src_h - 1);
            for x in 0..new_w as usize {
                let src_x = ((x as f64 / factor) as usize).min(src_w - 1);
                for c in 0..channels {
                    data.push(src[[src_y, src_x, c]]);
                }
            }
        }
        Frame::new(data, new_w, new_h, self.channels, self.index)
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_frame(width: u32, height: u32) -> Frame {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[x as u8, y as u8, 0]);
            }
        }
        Frame::new(data, width, height, 3, 0)
    }

    #[test]
    fn test_construction_and_accessors() {
        let data = vec![0u8; 12]; // 2x2x3
        let frame = Frame::new(data.clone(), 2, 2, 3, 5);
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.channels(), 3);
        assert_eq!(frame.index(), 5);
        assert_eq!(frame.data(), &data[..]);
    }

    #[test]
    #[should_panic(expected = "data length must equal width * height * channels")]
    fn test_mismatched_data_length_panics_in_debug() {
        let data = vec![0u8; 10];
        Frame::new(data, 2, 2, 3, 0);
    }

    #[test]
    fn test_as_ndarray_shape() {
        let frame = Frame::new(vec![0u8; 24], 4, 2, 3, 0);
        assert_eq!(frame.as_ndarray().shape(), &[2, 4, 3]);
    }

    #[test]
    fn test_crop_copies_region_pixels() {
        let frame = gradient_frame(10, 8);
        let crop = frame.crop(&BoundingBox::new(2, 3, 5, 6)).unwrap();
        assert_eq!(crop.width(), 3);
        assert_eq!(crop.height(), 3);
        // top-left of crop is source pixel (x=2, y=3)
        assert_eq!(&crop.data()[0..3], &[2, 3, 0]);
        // bottom-right of crop is source pixel (x=4, y=5)
        let last = crop.data().len() - 3;
        assert_eq!(&crop.data()[last..], &[4, 5, 0]);
    }

    #[test]
    fn test_crop_clamps_to_frame() {
        let frame = gradient_frame(10, 8);
        let crop = frame.crop(&BoundingBox::new(-5, -5, 3, 2)).unwrap();
        assert_eq!((crop.width(), crop.height()), (3, 2));
    }

    #[test]
    fn test_crop_outside_frame_is_none() {
        let frame = gradient_frame(10, 8);
        assert!(frame.crop(&BoundingBox::new(20, 20, 30, 30)).is_none());
    }

    #[test]
    fn test_downscaled_halves_dimensions() {
        let frame = gradient_frame(10, 8);
        let small = frame.downscaled(0.5);
        assert_eq!((small.width(), small.height()), (5, 4));
        // pixel (1, 1) samples source (2, 2)
        let arr = small.as_ndarray();
        assert_eq!(arr[[1, 1, 0]], 2);
        assert_eq!(arr[[1, 1, 1]], 2);
    }

    #[test]
    fn test_downscaled_identity_factor_copies() {
        let frame = gradient_frame(4, 4);
        assert_eq!(frame.downscaled(1.0), frame);
    }
}
