//! Movedict Pose - Pose estimator bindings
//!
//! Body-landmark inference runs outside this process; the binding here
//! speaks a small line-delimited JSON protocol to a sidecar that wraps the
//! actual model (see [`sidecar`] for the wire format).

pub mod sidecar;

pub use sidecar::SidecarEstimator;
