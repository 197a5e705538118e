//! Frame-synchronous transcode: decode, infer, composite, encode
//!
//! One call processes one video start to finish on the calling thread. The
//! source, sink and estimator are created per call and released on every
//! exit path; the sink only commits its file after the last frame.

use crate::backend::MediaBackend;
use crate::overlay;
use movedict_core::{
    Config, Error, Frame, FrameSink, FrameSource, OverlaySpec, PoseEstimator, StreamInfo,
    TranscodeError,
};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Outcome of a successful transcode
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeReport {
    /// Committed output file
    pub output: PathBuf,
    /// Frames written, equal to frames decoded
    pub frames: u64,
    /// Frame rate the output was encoded at
    pub frame_rate: f64,
    pub width: u32,
    pub height: u32,
    /// Frames in which a body was detected
    pub poses_detected: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Unopened,
    Opened,
    Streaming,
    Finalized,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Unopened => "unopened",
            Stage::Opened => "opened",
            Stage::Streaming => "streaming",
            Stage::Finalized => "finalized",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

struct Progress<'a> {
    input: &'a Path,
    stage: Stage,
}

impl<'a> Progress<'a> {
    fn new(input: &'a Path) -> Self {
        Self {
            input,
            stage: Stage::Unopened,
        }
    }

    fn advance(&mut self, next: Stage) {
        debug!("{:?}: {} -> {}", self.input, self.stage, next);
        self.stage = next;
    }
}

/// Runs transcodes against a [`MediaBackend`]
pub struct Transcoder<B> {
    backend: B,
    overlay: OverlaySpec,
    default_frame_rate: f64,
}

impl<B: MediaBackend> Transcoder<B> {
    pub fn new(backend: B, overlay: OverlaySpec, default_frame_rate: f64) -> Self {
        Self {
            backend,
            overlay,
            default_frame_rate,
        }
    }

    pub fn from_config(backend: B, config: &Config) -> Self {
        Self::new(backend, config.overlay, config.default_frame_rate)
    }

    /// Render `input` as a skeleton-only video at `output`
    ///
    /// On error no file exists at `output` that this call created.
    pub fn transcode(
        &self,
        input: &Path,
        output: &Path,
    ) -> Result<TranscodeReport, TranscodeError> {
        let started = Instant::now();
        let mut progress = Progress::new(input);

        let source = match self.backend.open_source(input) {
            Ok(source) => source,
            Err(e) => {
                warn!("Cannot open {:?}: {}", input, e);
                progress.advance(Stage::Failed);
                return Err(TranscodeError::OpenFailed {
                    path: input.to_path_buf(),
                    source: e,
                });
            }
        };
        progress.advance(Stage::Opened);

        match self.run(source, input, output, &mut progress) {
            Ok(report) => {
                progress.advance(Stage::Finalized);
                info!(
                    "Transcoded {:?} -> {:?}: {} frames ({} with pose) in {:.2?}",
                    input,
                    report.output,
                    report.frames,
                    report.poses_detected,
                    started.elapsed()
                );
                Ok(report)
            }
            Err(e) => {
                warn!("Transcode of {:?} failed: {}", input, e);
                progress.advance(Stage::Failed);
                Err(TranscodeError::ProcessingFailed(e))
            }
        }
    }

    fn run(
        &self,
        mut source: B::Source,
        input: &Path,
        output: &Path,
        progress: &mut Progress<'_>,
    ) -> movedict_core::Result<TranscodeReport> {
        let info = source.info();
        let fps = info.frame_rate_or(self.default_frame_rate);
        if info.frame_rate != Some(fps) {
            warn!(
                "{:?} reports no usable frame rate ({:?}), using {} fps",
                input, info.frame_rate, fps
            );
        }

        let mut sink = self.backend.open_sink(output, &info, fps)?;
        let mut estimator = self.backend.create_estimator(&info)?;
        progress.advance(Stage::Streaming);

        let mut poses_detected = 0u64;
        loop {
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    warn!(
                        "Stopping at unreadable frame {} of {:?}, output is truncated: {}",
                        sink.frames_written(),
                        input,
                        e
                    );
                    break;
                }
            };
            check_dimensions(&frame, &info)?;

            let pose = estimator.infer(&frame)?;
            if pose.is_detected() {
                poses_detected += 1;
            }

            let rendered =
                overlay::composite(info.width, info.height, &pose, &self.overlay, frame.sequence);
            sink.write_frame(&rendered)?;
            debug!("Frame {} written", frame.sequence);
        }

        let frames = sink.frames_written();
        if frames == 0 {
            return Err(Error::Decode(format!("{:?} has no decodable frames", input)));
        }

        // Release the decoder and estimator before the output is committed
        drop(estimator);
        drop(source);
        let output = sink.finish()?;

        Ok(TranscodeReport {
            output,
            frames,
            frame_rate: fps,
            width: info.width,
            height: info.height,
            poses_detected,
        })
    }
}

fn check_dimensions(frame: &Frame, info: &StreamInfo) -> movedict_core::Result<()> {
    if frame.matches(info) {
        return Ok(());
    }
    Err(Error::InvalidFrame(format!(
        "frame {} is {}x{}, stream is {}x{}",
        frame.sequence, frame.width, frame.height, info.width, info.height
    )))
}
