//! Stream inspection with ffprobe

use movedict_core::{Error, Result, StreamInfo};
use serde::Deserialize;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
}

/// Read dimensions and frame rate of the first video stream in `path`
pub fn probe(ffprobe: &Path, path: &Path) -> Result<StreamInfo> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,avg_frame_rate,r_frame_rate,nb_frames",
            "-of",
            "json",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| Error::command_failed(ffprobe.display().to_string(), e.to_string()))?;

    if !output.status.success() {
        return Err(Error::Decode(format!(
            "ffprobe rejected {:?}: {}",
            path,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    parse_probe_output(&output.stdout)
}

/// Turn ffprobe's JSON report into stream info
pub(crate) fn parse_probe_output(json: &[u8]) -> Result<StreamInfo> {
    let parsed: ProbeOutput = serde_json::from_slice(json)?;
    let stream = parsed
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| Error::Decode("no video stream found".to_string()))?;

    let width = stream.width.unwrap_or(0);
    let height = stream.height.unwrap_or(0);
    if width == 0 || height == 0 {
        return Err(Error::Decode(format!(
            "video stream has unusable dimensions {}x{}",
            width, height
        )));
    }

    let frame_rate = [stream.avg_frame_rate, stream.r_frame_rate]
        .iter()
        .flatten()
        .filter_map(|r| parse_rational(r))
        .find(|r| r.is_finite() && *r > 0.0);

    let frame_count = stream.nb_frames.and_then(|n| n.parse::<u64>().ok());

    debug!(
        "Probed stream: {}x{}, rate={:?}, frames={:?}",
        width, height, frame_rate, frame_count
    );

    Ok(StreamInfo {
        width,
        height,
        frame_rate,
        frame_count,
    })
}

/// Parse ffmpeg's "num/den" rational notation (or a plain number)
fn parse_rational(value: &str) -> Option<f64> {
    match value.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                None
            } else {
                Some(num / den)
            }
        }
        None => value.trim().parse().ok(),
    }
}
