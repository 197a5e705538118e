//! Frame representation for decoded and composited video
//!
//! Frames are packed RGB24, row-major, with no row padding.

use crate::{Error, Result};

/// Frame rate substituted when a source reports none
pub const DEFAULT_FRAME_RATE: f64 = 20.0;

/// Bytes per RGB24 pixel
pub const BYTES_PER_PIXEL: usize = 3;

/// A single RGB24 video frame
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    /// Raw pixel data in RGB format
    data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Zero-based position of this frame in its stream
    pub sequence: u64,
}

impl Frame {
    /// Create a frame from RGB pixel data
    ///
    /// Fails if the buffer length does not match the dimensions.
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self> {
        let expected = Self::byte_len(width, height);
        if width == 0 || height == 0 || data.len() != expected {
            return Err(Error::InvalidFrame(format!(
                "{}x{} frame needs {} bytes, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }

        Ok(Self {
            data,
            width,
            height,
            sequence,
        })
    }

    /// Create an all-black frame
    pub fn black(width: u32, height: u32, sequence: u64) -> Self {
        Self {
            data: vec![0u8; Self::byte_len(width, height)],
            width,
            height,
            sequence,
        }
    }

    /// Number of bytes an RGB frame of the given size occupies
    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * BYTES_PER_PIXEL
    }

    /// Get the raw pixel data as a slice
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access to the pixel data; the length cannot change
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Get the number of bytes per row (stride)
    pub fn stride(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    /// RGB value at (x, y), or None when out of bounds
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = y as usize * self.stride() + x as usize * BYTES_PER_PIXEL;
        Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
    }

    /// True when every channel of every pixel is zero
    pub fn is_black(&self) -> bool {
        self.data.iter().all(|&b| b == 0)
    }

    /// Check that the frame has the given dimensions
    pub fn matches(&self, info: &StreamInfo) -> bool {
        self.width == info.width && self.height == info.height
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .field("size", &self.data.len())
            .finish()
    }
}

/// Fixed properties of one video stream
///
/// Dimensions and frame rate do not change for the lifetime of a stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    /// Frame rate as reported by the container, if any
    pub frame_rate: Option<f64>,
    /// Total frame count, when the container declares one
    pub frame_count: Option<u64>,
}

impl StreamInfo {
    pub fn new(width: u32, height: u32, frame_rate: Option<f64>) -> Self {
        Self {
            width,
            height,
            frame_rate,
            frame_count: None,
        }
    }

    /// The reported frame rate, or `fallback` when it is missing or not positive
    pub fn frame_rate_or(&self, fallback: f64) -> f64 {
        match self.frame_rate {
            Some(rate) if rate.is_finite() && rate > 0.0 => rate,
            _ => fallback,
        }
    }

    /// Size in bytes of one RGB frame of this stream
    pub fn frame_size_bytes(&self) -> usize {
        Frame::byte_len(self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_rejects_wrong_length() {
        assert!(Frame::new(vec![0u8; 10], 2, 2, 0).is_err());
        assert!(Frame::new(vec![0u8; 12], 2, 2, 0).is_ok());
        assert!(Frame::new(Vec::new(), 0, 0, 0).is_err());
    }

    #[test]
    fn test_pixel_lookup() {
        let mut data = vec![0u8; 12];
        data[9..12].copy_from_slice(&[1, 2, 3]);
        let frame = Frame::new(data, 2, 2, 0).unwrap();
        assert_eq!(frame.pixel(1, 1), Some([1, 2, 3]));
        assert_eq!(frame.pixel(0, 0), Some([0, 0, 0]));
        assert_eq!(frame.pixel(2, 0), None);
        assert!(!frame.is_black());
        assert!(Frame::black(4, 4, 0).is_black());
    }

    #[test]
    fn test_frame_rate_fallback() {
        let fallback = DEFAULT_FRAME_RATE;
        assert_eq!(StreamInfo::new(4, 4, Some(30.0)).frame_rate_or(fallback), 30.0);
        assert_eq!(StreamInfo::new(4, 4, Some(0.0)).frame_rate_or(fallback), 20.0);
        assert_eq!(StreamInfo::new(4, 4, Some(-5.0)).frame_rate_or(fallback), 20.0);
        assert_eq!(StreamInfo::new(4, 4, Some(f64::NAN)).frame_rate_or(fallback), 20.0);
        assert_eq!(StreamInfo::new(4, 4, None).frame_rate_or(fallback), 20.0);
    }
}
