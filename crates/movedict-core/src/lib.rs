//! Movedict Core - Shared types and traits
//!
//! This crate provides the frame, pose and configuration types used across
//! all movedict components, plus the traits the transcode pipeline is built on.

pub mod config;
pub mod error;
pub mod frame;
pub mod media;
pub mod pose;

pub use config::{Config, EstimatorConfig, OverlaySpec};
pub use error::{Error, Result, TranscodeError};
pub use frame::{Frame, StreamInfo, DEFAULT_FRAME_RATE};
pub use media::{FrameSink, FrameSource};
pub use pose::{Landmark, Pose, PoseEstimator, PoseResult, POSE_CONNECTIONS, POSE_LANDMARK_COUNT};
