//! Pose estimator served by a sidecar process
//!
//! The sidecar is started once per video with the stream geometry and model
//! settings on its command line:
//!
//! ```text
//! <command> [args..] --width W --height H --model-complexity 1
//!     --min-detection-confidence 0.5 --min-tracking-confidence 0.5
//!     [--static-image-mode] [--enable-segmentation]
//! ```
//!
//! For every frame the sidecar receives exactly `W * H * 3` bytes of RGB24 on
//! stdin and answers with one JSON line on stdout:
//!
//! ```text
//! {"landmarks": null}
//! {"landmarks": [{"x": 0.51, "y": 0.22, "visibility": 0.98}, ...]}
//! {"error": "model failed to load"}
//! ```
//!
//! Coordinates are normalized to the frame (0.0-1.0). Because the process
//! lives for the whole video it can track the body across frames.
//!
//! Without a configured command the bundled MediaPipe Pose sidecar
//! (`sidecar/mediapipe_pose.py`) is run with `python -c`.

use movedict_core::{
    Error, EstimatorConfig, Frame, Landmark, Pose, PoseEstimator, PoseResult, Result, StreamInfo,
};
use serde::Deserialize;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use tracing::{debug, info, warn};

/// Source of the MediaPipe Pose sidecar used when no command is configured
pub const BUNDLED_SIDECAR: &str = include_str!("../sidecar/mediapipe_pose.py");

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    landmarks: Option<Vec<NormalizedLandmark>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NormalizedLandmark {
    x: f32,
    y: f32,
    #[serde(default)]
    visibility: Option<f32>,
}

/// One running sidecar bound to one video
pub struct SidecarEstimator {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    width: u32,
    height: u32,
    frames: u64,
}

impl SidecarEstimator {
    /// Start a sidecar configured for continuous tracking on `info`'s geometry
    pub fn spawn(config: &EstimatorConfig, info: &StreamInfo) -> Result<Self> {
        let mut cmd = sidecar_command(config, info);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let program = cmd.get_program().to_string_lossy().into_owned();
        let mut child = cmd
            .spawn()
            .map_err(|e| Error::command_failed(program.clone(), e.to_string()))?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::Estimator("failed to capture sidecar pipes".to_string()));
            }
        };

        info!(
            "Pose sidecar started: {} (pid {}) for {}x{}",
            program,
            child.id(),
            info.width,
            info.height
        );

        Ok(Self {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            width: info.width,
            height: info.height,
            frames: 0,
        })
    }
}

impl PoseEstimator for SidecarEstimator {
    fn infer(&mut self, frame: &Frame) -> Result<PoseResult> {
        if frame.width != self.width || frame.height != self.height {
            return Err(Error::InvalidFrame(format!(
                "estimator bound to {}x{}, got {}x{}",
                self.width, self.height, frame.width, frame.height
            )));
        }

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| Error::Estimator("sidecar input already closed".to_string()))?;
        stdin
            .write_all(frame.data())
            .and_then(|_| stdin.flush())
            .map_err(|e| Error::Estimator(format!("sending frame {}: {}", frame.sequence, e)))?;

        let mut line = String::new();
        let read = self
            .stdout
            .read_line(&mut line)
            .map_err(|e| Error::Estimator(format!("reading reply: {}", e)))?;
        if read == 0 {
            return Err(Error::Estimator(format!(
                "sidecar exited before answering frame {}",
                frame.sequence
            )));
        }

        self.frames += 1;
        let result = parse_reply(&line, self.width, self.height)?;
        debug!(
            "Frame {}: pose {}",
            frame.sequence,
            if result.is_detected() { "detected" } else { "absent" }
        );
        Ok(result)
    }
}

impl Drop for SidecarEstimator {
    fn drop(&mut self) {
        // Closing stdin lets a well-behaved sidecar exit on its own
        drop(self.stdin.take());
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
        }
        match self.child.wait() {
            Ok(status) => debug!("Pose sidecar exited ({}) after {} frames", status, self.frames),
            Err(e) => warn!("Failed to reap pose sidecar: {}", e),
        }
    }
}

fn sidecar_command(config: &EstimatorConfig, info: &StreamInfo) -> Command {
    let mut cmd = match &config.command {
        Some(command) => Command::new(command),
        None => {
            let mut cmd = Command::new(&config.python);
            cmd.arg("-c").arg(BUNDLED_SIDECAR);
            cmd
        }
    };
    cmd.args(&config.args).args(sidecar_args(config, info));
    cmd
}

fn sidecar_args(config: &EstimatorConfig, info: &StreamInfo) -> Vec<String> {
    let mut args = vec![
        "--width".to_string(),
        info.width.to_string(),
        "--height".to_string(),
        info.height.to_string(),
        "--model-complexity".to_string(),
        config.model_complexity.to_string(),
        "--min-detection-confidence".to_string(),
        config.min_detection_confidence.to_string(),
        "--min-tracking-confidence".to_string(),
        config.min_tracking_confidence.to_string(),
    ];
    if config.static_image_mode {
        args.push("--static-image-mode".to_string());
    }
    if config.enable_segmentation {
        args.push("--enable-segmentation".to_string());
    }
    args
}

/// Decode one reply line into pixel-space landmarks
fn parse_reply(line: &str, width: u32, height: u32) -> Result<PoseResult> {
    let reply: Reply = serde_json::from_str(line.trim())
        .map_err(|e| Error::Estimator(format!("malformed sidecar reply: {}", e)))?;

    if let Some(message) = reply.error {
        return Err(Error::Estimator(message));
    }

    match reply.landmarks {
        None => Ok(PoseResult::Absent),
        Some(points) if points.is_empty() => Ok(PoseResult::Absent),
        Some(points) => {
            let landmarks = points
                .into_iter()
                .map(|p| Landmark {
                    x: p.x * width as f32,
                    y: p.y * height as f32,
                    visibility: p.visibility,
                })
                .collect();
            Ok(PoseResult::Detected(Pose::blazepose(landmarks)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use movedict_core::POSE_LANDMARK_COUNT;

    fn detected_reply(count: usize) -> String {
        let points: Vec<String> = (0..count)
            .map(|_| r#"{"x": 0.5, "y": 0.25, "visibility": 0.9}"#.to_string())
            .collect();
        format!("{{\"landmarks\": [{}]}}\n", points.join(","))
    }

    #[test]
    fn test_parse_absent() {
        assert_eq!(parse_reply("{\"landmarks\": null}\n", 10, 10).unwrap(), PoseResult::Absent);
        assert_eq!(parse_reply("{}", 10, 10).unwrap(), PoseResult::Absent);
    }

    #[test]
    fn test_parse_detected_scales_to_pixels() {
        let result = parse_reply(&detected_reply(POSE_LANDMARK_COUNT), 640, 480).unwrap();
        let pose = result.pose().unwrap();
        assert_eq!(pose.landmarks().len(), POSE_LANDMARK_COUNT);
        assert_eq!(pose.landmarks()[0].x, 320.0);
        assert_eq!(pose.landmarks()[0].y, 120.0);
        assert_eq!(pose.landmarks()[0].visibility, Some(0.9));
    }

    #[test]
    fn test_parse_rejects_bad_replies() {
        assert!(parse_reply(&detected_reply(5), 640, 480).is_err());
        assert!(parse_reply("not json", 640, 480).is_err());
        assert!(matches!(
            parse_reply(r#"{"error": "no model"}"#, 640, 480),
            Err(Error::Estimator(m)) if m == "no model"
        ));
    }

    #[test]
    fn test_args_reflect_tracking_config() {
        let info = StreamInfo::new(640, 480, Some(30.0));
        let args = sidecar_args(&EstimatorConfig::default(), &info);
        assert!(!args.contains(&"--static-image-mode".to_string()));
        assert!(!args.contains(&"--enable-segmentation".to_string()));
        let idx = args.iter().position(|a| a == "--min-detection-confidence").unwrap();
        assert_eq!(args[idx + 1], "0.5");
    }

    #[test]
    fn test_default_command_runs_bundled_sidecar() {
        let info = StreamInfo::new(640, 480, None);
        let cmd = sidecar_command(&EstimatorConfig::default(), &info);
        assert_eq!(cmd.get_program(), "python3");

        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args[0], "-c");
        assert_eq!(args[1], BUNDLED_SIDECAR);
        assert_eq!(&args[2..4], ["--width", "640"]);
        assert!(BUNDLED_SIDECAR.contains("mp.solutions.pose.Pose"));
        assert!(BUNDLED_SIDECAR.contains("\"landmarks\""));
    }

    #[test]
    fn test_configured_command_replaces_bundled_sidecar() {
        let config = EstimatorConfig {
            command: Some("/opt/pose/serve".into()),
            args: vec!["--gpu".to_string()],
            ..EstimatorConfig::default()
        };
        let cmd = sidecar_command(&config, &StreamInfo::new(2, 2, None));
        assert_eq!(cmd.get_program(), "/opt/pose/serve");
        assert_eq!(cmd.get_args().next().unwrap(), "--gpu");
    }

    #[cfg(unix)]
    #[test]
    fn test_sidecar_round_trip() {
        // Reads one 2x2 RGB frame per reply
        let config = EstimatorConfig {
            command: Some("sh".into()),
            args: vec![
                "-c".to_string(),
                "while [ \"$(head -c 12 | wc -c)\" -eq 12 ]; do echo '{\"landmarks\": null}'; done"
                    .to_string(),
            ],
            ..EstimatorConfig::default()
        };
        let info = StreamInfo::new(2, 2, None);
        let mut estimator = SidecarEstimator::spawn(&config, &info).unwrap();

        for i in 0..3 {
            let result = estimator.infer(&Frame::black(2, 2, i)).unwrap();
            assert_eq!(result, PoseResult::Absent);
        }
        assert!(estimator.infer(&Frame::black(4, 4, 3)).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_sidecar_exit_is_error() {
        let config = EstimatorConfig {
            command: Some("sh".into()),
            args: vec!["-c".to_string(), "exit 0".to_string()],
            ..EstimatorConfig::default()
        };
        let info = StreamInfo::new(2, 2, None);
        let mut estimator = SidecarEstimator::spawn(&config, &info).unwrap();
        assert!(estimator.infer(&Frame::black(2, 2, 0)).is_err());
    }
}
