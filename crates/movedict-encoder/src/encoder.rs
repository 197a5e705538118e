//! H.264 encoder using OpenH264
//!
//! OpenH264 is Cisco's open-source H.264 codec; the crate builds it from the
//! bundled source, so no system libraries are needed.

use crate::nal::{contains_idr, split_annex_b};
use movedict_core::{Error, Frame, Result};
use openh264::encoder::{Encoder, EncoderConfig, RateControlMode};
use openh264::formats::YUVBuffer;
use openh264::OpenH264API;
use tracing::{debug, info};

/// H.264 encoder for fixed-size RGB frames
pub struct H264Encoder {
    encoder: Encoder,
    width: u32,
    height: u32,
    frame_count: i64,
    yuv_buffer: Vec<u8>,
}

impl H264Encoder {
    /// Create a new H.264 encoder
    ///
    /// 4:2:0 subsampling needs even dimensions; anything else is rejected.
    pub fn new(width: u32, height: u32, fps: f64, bitrate_kbps: u32) -> Result<Self> {
        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            return Err(Error::Encoder(format!(
                "H.264 output needs non-zero even dimensions, got {}x{}",
                width, height
            )));
        }

        let config = EncoderConfig::new()
            .max_frame_rate(fps as f32)
            .rate_control_mode(RateControlMode::Bufferbased)
            .set_bitrate_bps(bitrate_kbps.saturating_mul(1000))
            .enable_skip_frame(false);

        let api = OpenH264API::from_source();
        let encoder = Encoder::with_api_config(api, config)
            .map_err(|e| Error::Encoder(format!("Failed to create encoder: {}", e)))?;

        let yuv_size = (width * height * 3 / 2) as usize;

        info!(
            "H.264 encoder initialized: {}x{} @ {:.2} fps, {} kbps",
            width, height, fps, bitrate_kbps
        );

        Ok(Self {
            encoder,
            width,
            height,
            frame_count: 0,
            yuv_buffer: vec![0u8; yuv_size],
        })
    }

    /// Convert RGB24 to YUV420 (I420), averaging chroma over each 2x2 block
    fn rgb_to_yuv420(&mut self, rgb: &[u8]) {
        let width = self.width as usize;
        let height = self.height as usize;
        let y_size = width * height;
        let uv_size = y_size / 4;

        let (y_plane, uv_planes) = self.yuv_buffer.split_at_mut(y_size);
        let (u_plane, v_plane) = uv_planes.split_at_mut(uv_size);

        for y in 0..height {
            for x in 0..width {
                let idx = (y * width + x) * 3;
                let (r, g, b) = (rgb[idx] as i32, rgb[idx + 1] as i32, rgb[idx + 2] as i32);

                // BT.601 limited range
                let y_val = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
                y_plane[y * width + x] = y_val.clamp(0, 255) as u8;
            }
        }

        for cy in 0..height / 2 {
            for cx in 0..width / 2 {
                let (mut r, mut g, mut b) = (0i32, 0i32, 0i32);
                for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                    let idx = ((cy * 2 + dy) * width + cx * 2 + dx) * 3;
                    r += rgb[idx] as i32;
                    g += rgb[idx + 1] as i32;
                    b += rgb[idx + 2] as i32;
                }
                let (r, g, b) = (r / 4, g / 4, b / 4);

                let uv_idx = cy * (width / 2) + cx;
                let u_val = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
                let v_val = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
                u_plane[uv_idx] = u_val.clamp(0, 255) as u8;
                v_plane[uv_idx] = v_val.clamp(0, 255) as u8;
            }
        }
    }

    /// Encode one RGB frame into an access unit
    pub fn encode(&mut self, frame: &Frame) -> Result<EncodedFrame> {
        if frame.width != self.width || frame.height != self.height {
            return Err(Error::InvalidFrame(format!(
                "encoder expects {}x{}, got {}x{}",
                self.width, self.height, frame.width, frame.height
            )));
        }

        self.rgb_to_yuv420(frame.data());

        let yuv = YUVBuffer::from_vec(
            self.yuv_buffer.clone(),
            self.width as usize,
            self.height as usize,
        );

        let bitstream = self
            .encoder
            .encode(&yuv)
            .map_err(|e| Error::Encoder(format!("Encoding failed: {}", e)))?;

        let bytes = bitstream.to_vec();
        let units = split_annex_b(&bytes);
        let is_keyframe = contains_idr(&units);
        let nals: Vec<Vec<u8>> = units.into_iter().map(<[u8]>::to_vec).collect();

        debug!(
            "Encoded frame {}: {} bytes in {} NAL units, keyframe={}",
            self.frame_count,
            bytes.len(),
            nals.len(),
            is_keyframe
        );

        let encoded = EncodedFrame {
            nals,
            pts: self.frame_count,
            is_keyframe,
        };
        self.frame_count += 1;

        Ok(encoded)
    }

    /// Get frame count
    pub fn frame_count(&self) -> i64 {
        self.frame_count
    }
}

/// One encoded access unit
#[derive(Clone)]
pub struct EncodedFrame {
    /// NAL units without start codes, in decode order
    pub nals: Vec<Vec<u8>>,
    /// Presentation index
    pub pts: i64,
    /// Whether this access unit starts with an IDR picture
    pub is_keyframe: bool,
}

impl std::fmt::Debug for EncodedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedFrame")
            .field("nals", &self.nals.len())
            .field("pts", &self.pts)
            .field("is_keyframe", &self.is_keyframe)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nal::{nal_type, unit_type};

    #[test]
    fn test_rejects_odd_dimensions() {
        assert!(H264Encoder::new(63, 48, 20.0, 1000).is_err());
        assert!(H264Encoder::new(64, 0, 20.0, 1000).is_err());
    }

    #[test]
    fn test_black_frame_converts_to_limited_range() {
        let mut encoder = H264Encoder::new(16, 16, 20.0, 1000).unwrap();
        let frame = Frame::black(16, 16, 0);
        encoder.rgb_to_yuv420(frame.data());
        assert!(encoder.yuv_buffer[..256].iter().all(|&y| y == 16));
        assert!(encoder.yuv_buffer[256..].iter().all(|&c| c == 128));
    }

    #[test]
    fn test_first_frame_is_keyframe_with_parameter_sets() {
        let mut encoder = H264Encoder::new(64, 48, 20.0, 1000).unwrap();
        let first = encoder.encode(&Frame::black(64, 48, 0)).unwrap();
        assert!(first.is_keyframe);
        assert!(first.nals.iter().any(|n| unit_type(n) == nal_type::SPS));
        assert!(first.nals.iter().any(|n| unit_type(n) == nal_type::PPS));

        let second = encoder.encode(&Frame::black(64, 48, 1)).unwrap();
        assert_eq!(second.pts, 1);
        assert_eq!(encoder.frame_count(), 2);
    }

    #[test]
    fn test_every_frame_produces_an_access_unit() {
        // Busy content at a starved bitrate must still yield one picture per frame
        let mut encoder = H264Encoder::new(64, 48, 30.0, 10).unwrap();
        for i in 0..30u64 {
            let data: Vec<u8> = (0..64 * 48 * 3)
                .map(|p| ((p as u64 * 7 + i * 31) % 251) as u8)
                .collect();
            let encoded = encoder.encode(&Frame::new(data, 64, 48, i).unwrap()).unwrap();
            assert!(!encoded.nals.is_empty(), "frame {} was skipped", i);
            assert_eq!(encoded.pts, i as i64);
        }
    }

    #[test]
    fn test_rejects_mismatched_frame() {
        let mut encoder = H264Encoder::new(64, 48, 20.0, 1000).unwrap();
        assert!(encoder.encode(&Frame::black(32, 32, 0)).is_err());
    }
}
