//! Pose landmarks, skeleton topology and the estimator contract

use crate::{Error, Frame, Result};

/// Number of landmarks in the BlazePose body model
pub const POSE_LANDMARK_COUNT: usize = 33;

/// BlazePose skeleton: landmark index pairs joined by a bone
pub const POSE_CONNECTIONS: [(usize, usize); 35] = [
    // Face
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 7),
    (0, 4),
    (4, 5),
    (5, 6),
    (6, 8),
    (9, 10),
    // Shoulders and arms
    (11, 12),
    (11, 13),
    (13, 15),
    (15, 17),
    (15, 19),
    (15, 21),
    (17, 19),
    (12, 14),
    (14, 16),
    (16, 18),
    (16, 20),
    (16, 22),
    (18, 20),
    // Torso
    (11, 23),
    (12, 24),
    (23, 24),
    // Legs
    (23, 25),
    (24, 26),
    (25, 27),
    (26, 28),
    (27, 29),
    (28, 30),
    (29, 31),
    (30, 32),
    (27, 31),
    (28, 32),
];

/// A single tracked body keypoint in pixel space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    /// Likelihood that the point is visible (0.0-1.0), when the model reports one
    pub visibility: Option<f32>,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            visibility: None,
        }
    }

    pub fn with_visibility(mut self, visibility: f32) -> Self {
        self.visibility = Some(visibility);
        self
    }

    /// Whether the landmark should be drawn under the given visibility cut-off
    pub fn is_visible(&self, threshold: f32) -> bool {
        self.visibility.map_or(true, |v| v >= threshold)
    }
}

/// One detected body: ordered landmarks plus a constant topology
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    landmarks: Vec<Landmark>,
    connections: &'static [(usize, usize)],
}

impl Pose {
    /// Build a pose, checking that every connection refers to an existing landmark
    pub fn new(landmarks: Vec<Landmark>, connections: &'static [(usize, usize)]) -> Result<Self> {
        if let Some(&(a, b)) = connections
            .iter()
            .find(|(a, b)| *a >= landmarks.len() || *b >= landmarks.len())
        {
            return Err(Error::Estimator(format!(
                "connection ({}, {}) out of range for {} landmarks",
                a,
                b,
                landmarks.len()
            )));
        }
        Ok(Self {
            landmarks,
            connections,
        })
    }

    /// Build a pose using the BlazePose topology
    pub fn blazepose(landmarks: Vec<Landmark>) -> Result<Self> {
        if landmarks.len() != POSE_LANDMARK_COUNT {
            return Err(Error::Estimator(format!(
                "expected {} landmarks, got {}",
                POSE_LANDMARK_COUNT,
                landmarks.len()
            )));
        }
        Self::new(landmarks, &POSE_CONNECTIONS)
    }

    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }

    pub fn connections(&self) -> &'static [(usize, usize)] {
        self.connections
    }
}

/// Outcome of pose inference on one frame
///
/// `Absent` is a normal result, not a failure.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PoseResult {
    #[default]
    Absent,
    Detected(Pose),
}

impl PoseResult {
    pub fn pose(&self) -> Option<&Pose> {
        match self {
            PoseResult::Absent => None,
            PoseResult::Detected(pose) => Some(pose),
        }
    }

    pub fn is_detected(&self) -> bool {
        matches!(self, PoseResult::Detected(_))
    }
}

/// Single-person pose estimator
///
/// Implementations may carry tracking state from one frame to the next, so
/// one instance serves exactly one video and is never shared between threads
/// or interleaved across videos. Dropping the estimator releases it.
pub trait PoseEstimator {
    fn infer(&mut self, frame: &Frame) -> Result<PoseResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blazepose_requires_full_landmark_set() {
        let landmarks = vec![Landmark::new(0.0, 0.0); POSE_LANDMARK_COUNT];
        assert!(Pose::blazepose(landmarks).is_ok());

        let short = vec![Landmark::new(0.0, 0.0); 10];
        assert!(Pose::blazepose(short).is_err());
    }

    #[test]
    fn test_connections_within_landmark_range() {
        for (a, b) in POSE_CONNECTIONS {
            assert!(a < POSE_LANDMARK_COUNT && b < POSE_LANDMARK_COUNT);
            assert_ne!(a, b);
        }
    }

    #[test]
    fn test_custom_topology_validation() {
        static PAIRS: [(usize, usize); 1] = [(0, 2)];
        let landmarks = vec![Landmark::new(1.0, 1.0); 2];
        assert!(Pose::new(landmarks, &PAIRS).is_err());
    }

    #[test]
    fn test_visibility_threshold() {
        assert!(Landmark::new(0.0, 0.0).is_visible(0.5));
        assert!(Landmark::new(0.0, 0.0).with_visibility(0.5).is_visible(0.5));
        assert!(!Landmark::new(0.0, 0.0).with_visibility(0.2).is_visible(0.5));
    }
}
