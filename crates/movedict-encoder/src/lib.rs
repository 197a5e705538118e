//! Movedict Encoder - H.264 video output
//!
//! This crate encodes RGB frames with OpenH264 and stores them in a
//! progressive MP4 file that is only committed once complete.

pub mod encoder;
pub mod mp4;
pub mod nal;
pub mod sink;

pub use encoder::{EncodedFrame, H264Encoder};
pub use mp4::Mp4Writer;
pub use sink::Mp4FileSink;
