//! Media backends for the transcoder
//!
//! A backend builds the three per-video resources: the decoder, the encoder
//! and the pose estimator. Each call creates a fresh instance, so nothing is
//! shared between concurrent transcodes.

use movedict_core::{Config, EstimatorConfig, FrameSink, FrameSource, PoseEstimator, Result, StreamInfo};
use movedict_encoder::Mp4FileSink;
use movedict_ingest::{DecoderTools, FfmpegSource};
use movedict_pose::SidecarEstimator;
use std::path::Path;

/// Factory for per-video decode, encode and inference resources
pub trait MediaBackend: Send + Sync {
    type Source: FrameSource;
    type Sink: FrameSink;
    type Estimator: PoseEstimator;

    /// Open `input` for decoding
    fn open_source(&self, input: &Path) -> Result<Self::Source>;

    /// Prepare an encoder that commits to `output` only on finish
    fn open_sink(&self, output: &Path, info: &StreamInfo, fps: f64) -> Result<Self::Sink>;

    /// Start an estimator dedicated to one stream
    fn create_estimator(&self, info: &StreamInfo) -> Result<Self::Estimator>;
}

/// ffmpeg decoding, OpenH264/MP4 encoding and a pose sidecar
#[derive(Debug, Clone)]
pub struct NativeBackend {
    tools: DecoderTools,
    bitrate_kbps: u32,
    estimator: EstimatorConfig,
}

impl NativeBackend {
    pub fn from_config(config: &Config) -> Self {
        Self {
            tools: DecoderTools {
                ffmpeg: config.ffmpeg.clone(),
                ffprobe: config.ffprobe.clone(),
            },
            bitrate_kbps: config.bitrate_kbps,
            estimator: config.estimator.clone(),
        }
    }
}

impl MediaBackend for NativeBackend {
    type Source = FfmpegSource;
    type Sink = Mp4FileSink;
    type Estimator = SidecarEstimator;

    fn open_source(&self, input: &Path) -> Result<FfmpegSource> {
        FfmpegSource::open(&self.tools, input)
    }

    fn open_sink(&self, output: &Path, info: &StreamInfo, fps: f64) -> Result<Mp4FileSink> {
        Mp4FileSink::create(output, info, fps, self.bitrate_kbps)
    }

    fn create_estimator(&self, info: &StreamInfo) -> Result<SidecarEstimator> {
        SidecarEstimator::spawn(&self.estimator, info)
    }
}
