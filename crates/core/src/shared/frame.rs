use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, Pixel, Rgb, Rgba};

use crate::shared::face_candidate::FaceCandidate;

/// A single video/image frame: contiguous RGB bytes in row-major order.
///
/// Format conversion happens at I/O boundaries only; the domain layer
/// treats pixel data as opaque apart from the sampling helpers below.
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

    /// A frame with every byte set to `value`.
    pub fn filled(width: u32, height: u32, value: u8, index: usize) -> Self {
        let len = width as usize * height as usize * 3;
        Self::new(vec![value; len], width, height, 3, index)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
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

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.data.is_empty()
    }

    /// Single-channel luma. Frames that are already single-channel are
    /// returned as-is; a buffer that does not match its dimensions yields
    /// an empty vector.
    pub fn to_grayscale(&self) -> Vec<u8> {
        match self.channels {
            1 => self.data.clone(),
            3 => self
                .view::<Rgb<u8>>()
                .map(|img| imageops::grayscale(&img).into_raw())
                .unwrap_or_default(),
            4 => self
                .view::<Rgba<u8>>()
                .map(|img| imageops::grayscale(&img).into_raw())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Copy the pixels inside `candidate` into a new frame.
    ///
    /// The box is clamped to the frame first; an empty intersection yields
    /// an empty frame.
    pub fn crop(&self, candidate: &FaceCandidate) -> Frame {
        let b = candidate.clamped(self.width, self.height);
        let w = b.width();
        let h = b.height();
        let c = self.channels as usize;
        let stride = self.width as usize * c;
        let mut data = Vec::with_capacity(w as usize * h as usize * c);
        for y in b.top..b.bottom {
            let start = y as usize * stride + b.left as usize * c;
            data.extend_from_slice(&self.data[start..start + w as usize * c]);
        }
        Frame::new(data, w, h, self.channels, self.index)
    }

    /// Resample by `factor` (0.5 halves each side).
    ///
    /// A factor of 1.0 returns a clone. Dimensions never drop below 1.
    pub fn scaled(&self, factor: f64) -> Frame {
        if (factor - 1.0).abs() < f64::EPSILON || self.is_empty() {
            return self.clone();
        }
        let w = ((self.width as f64 * factor).round() as u32).max(1);
        let h = ((self.height as f64 * factor).round() as u32).max(1);
        self.resized(w, h)
    }

    /// Resample to exactly `width` x `height` with a triangle filter.
    pub fn resized(&self, width: u32, height: u32) -> Frame {
        if self.is_empty() || width == 0 || height == 0 {
            return Frame::new(Vec::new(), 0, 0, self.channels, self.index);
        }
        let data = match self.channels {
            1 => self.resample::<Luma<u8>>(width, height),
            3 => self.resample::<Rgb<u8>>(width, height),
            4 => self.resample::<Rgba<u8>>(width, height),
            _ => None,
        };
        match data {
            Some(data) => Frame::new(data, width, height, self.channels, self.index),
            None => Frame::new(Vec::new(), 0, 0, self.channels, self.index),
        }
    }

    /// Borrow the buffer as an `image` view without copying.
    fn view<P>(&self) -> Option<ImageBuffer<P, &[u8]>>
    where
        P: Pixel<Subpixel = u8>,
    {
        ImageBuffer::from_raw(self.width, self.height, self.data.as_slice())
    }

    fn resample<P>(&self, width: u32, height: u32) -> Option<Vec<u8>>
    where
        P: Pixel<Subpixel = u8> + 'static,
    {
        let img = self.view::<P>()?;
        Some(imageops::resize(&img, width, height, FilterType::Triangle).into_raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_and_accessors() {
        let data = vec![0u8; 12];
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
        Frame::new(vec![0u8; 10], 2, 2, 3, 0);
    }

    #[test]
    fn test_grayscale_weights_green_over_red_over_blue() {
        let frame = Frame::new(
            vec![255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255, 0, 0, 0],
            5,
            1,
            3,
            0,
        );
        let gray = frame.to_grayscale();
        assert_eq!(gray.len(), 5);
        assert!(gray[1] > gray[0] && gray[0] > gray[2]);
        assert_eq!(&gray[3..], &[255, 0]);
    }

    #[test]
    fn test_grayscale_of_single_channel_is_unchanged() {
        let frame = Frame::new(vec![3, 90, 200, 7], 2, 2, 1, 0);
        assert_eq!(frame.to_grayscale(), vec![3, 90, 200, 7]);
    }

    #[test]
    fn test_crop_copies_region() {
        // 4x2 frame, pixel value = column index
        let mut data = Vec::new();
        for _ in 0..2 {
            for x in 0..4u8 {
                data.extend_from_slice(&[x, x, x]);
            }
        }
        let frame = Frame::new(data, 4, 2, 3, 7);
        let crop = frame.crop(&FaceCandidate::new(0, 3, 2, 1));
        assert_eq!(crop.width(), 2);
        assert_eq!(crop.height(), 2);
        assert_eq!(crop.index(), 7);
        assert_eq!(&crop.data()[..6], &[1, 1, 1, 2, 2, 2]);
    }

    #[test]
    fn test_crop_outside_frame_is_empty() {
        let frame = Frame::filled(4, 4, 10, 0);
        let crop = frame.crop(&FaceCandidate::new(10, 20, 20, 10));
        assert!(crop.is_empty());
    }

    #[test]
    fn test_scaled_halves_dimensions() {
        let frame = Frame::filled(640, 480, 90, 3);
        let small = frame.scaled(0.5);
        assert_eq!((small.width(), small.height()), (320, 240));
        assert!(small.data().iter().all(|&v| v == 90));
        assert_eq!(small.index(), 3);
    }

    #[test]
    fn test_scaled_identity_returns_clone() {
        let frame = Frame::filled(5, 5, 1, 0);
        assert_eq!(frame.scaled(1.0), frame);
    }

    #[test]
    fn test_resized_exact_dimensions() {
        let frame = Frame::filled(37, 53, 200, 0);
        let out = frame.resized(150, 150);
        assert_eq!((out.width(), out.height()), (150, 150));
        assert_eq!(out.data().len(), 150 * 150 * 3);
        assert!(out.data().iter().all(|&v| v == 200));
    }

    #[test]
    fn test_scaled_keeps_coarse_pattern() {
        // left half black, right half white
        let mut data = Vec::new();
        for _ in 0..40 {
            for x in 0..40u32 {
                let v = if x < 20 { 0 } else { 255 };
                data.extend_from_slice(&[v, v, v]);
            }
        }
        let small = Frame::new(data, 40, 40, 3, 0).scaled(0.5);
        assert_eq!((small.width(), small.height()), (20, 20));
        assert_eq!(small.data()[0], 0);
        assert_eq!(small.data()[19 * 3], 255);
    }

    #[test]
    fn test_resized_single_channel() {
        let frame = Frame::new(vec![50; 16], 4, 4, 1, 2);
        let out = frame.resized(2, 2);
        assert_eq!(out.channels(), 1);
        assert_eq!(out.data(), &[50, 50, 50, 50]);
        assert_eq!(out.index(), 2);
    }
}
