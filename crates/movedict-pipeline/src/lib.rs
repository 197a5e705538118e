//! Movedict Pipeline - Skeleton transcoding and the output library
//!
//! Ties the decoder, pose estimator and encoder crates together: each video
//! is decoded, every frame is replaced with its pose skeleton on black, and
//! the result is stored under a collision-free name.

pub mod backend;
pub mod library;
pub mod namer;
pub mod overlay;
pub mod service;
pub mod transcode;

pub use backend::{MediaBackend, NativeBackend};
pub use library::{OutputLibrary, Reservation};
pub use namer::{format_timestamp, resolve, sanitize_label, NamingRequest};
pub use overlay::composite;
pub use service::{ServiceError, StoredClip, TranscodeService};
pub use transcode::{TranscodeReport, Transcoder};
