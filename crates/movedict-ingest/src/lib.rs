//! Movedict Ingest - Video decoding
//!
//! This crate opens recorded clips of any container ffmpeg understands and
//! yields them frame by frame as RGB24:
//! - `ffprobe` reports dimensions and frame rate once at open time
//! - an `ffmpeg` child process streams raw frames over a pipe

pub mod probe;
pub mod source;

pub use probe::probe;
pub use source::{DecoderTools, FfmpegSource};
