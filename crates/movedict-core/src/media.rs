//! Frame source and sink traits
//!
//! The transcode pipeline only talks to these traits; the ffmpeg decoder and
//! the MP4 writer are the production implementations.

use crate::{Frame, Result, StreamInfo};
use std::path::PathBuf;

/// A lazy, finite, forward-only sequence of decoded frames
///
/// Dropping the source releases the underlying decoder.
pub trait FrameSource {
    /// Stream properties, read once when the source was opened
    fn info(&self) -> StreamInfo;

    /// Decode the next frame, or `Ok(None)` at end of stream
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Ordered consumer of frames that produces one output container
///
/// Dropping a sink without calling [`FrameSink::finish`] must discard
/// everything written so far.
pub trait FrameSink {
    /// Append a frame; frames are stored in call order
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Number of frames accepted so far
    fn frames_written(&self) -> u64;

    /// Finalize the container and return the path it was committed to
    fn finish(self) -> Result<PathBuf>;
}
