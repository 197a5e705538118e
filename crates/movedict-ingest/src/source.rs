//! Frame source that decodes through an ffmpeg subprocess
//!
//! ffmpeg converts the first video stream to packed RGB24 on stdout; each
//! read pulls exactly one frame's worth of bytes.

use crate::probe::probe;
use movedict_core::{Error, Frame, FrameSource, Result, StreamInfo};
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use tracing::{debug, info, warn};

/// Decoder executables used by [`FfmpegSource`]
#[derive(Debug, Clone)]
pub struct DecoderTools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for DecoderTools {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

/// Open decoder over one input file
///
/// The ffmpeg child is killed and reaped when the source is dropped.
pub struct FfmpegSource {
    path: PathBuf,
    info: StreamInfo,
    child: Child,
    stdout: ChildStdout,
    last_stderr: Arc<Mutex<Option<String>>>,
    sequence: u64,
    finished: bool,
}

impl FfmpegSource {
    /// Probe `path` and start decoding it
    pub fn open(tools: &DecoderTools, path: &Path) -> Result<Self> {
        let metadata = std::fs::metadata(path)
            .map_err(|e| Error::NotFound(format!("{:?}: {}", path, e)))?;
        if !metadata.is_file() {
            return Err(Error::Decode(format!("{:?} is not a regular file", path)));
        }
        if metadata.len() == 0 {
            return Err(Error::Decode(format!("{:?} is empty", path)));
        }

        let info = probe(&tools.ffprobe, path)?;

        let mut child = Command::new(&tools.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-noautorotate", "-i"])
            .arg(path)
            .args([
                "-map", "0:v:0", "-an", "-vsync", "passthrough", "-f", "rawvideo", "-pix_fmt",
                "rgb24", "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::command_failed(tools.ffmpeg.display().to_string(), e.to_string()))?;

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::Decode("failed to capture ffmpeg stdout".to_string()));
            }
        };

        let last_stderr = Arc::new(Mutex::new(None));
        if let Some(stderr) = child.stderr.take() {
            let sink = last_stderr.clone();
            thread::spawn(move || {
                for line in BufReader::new(stderr).lines().map_while(std::result::Result::ok) {
                    debug!("ffmpeg: {}", line);
                    if let Ok(mut last) = sink.lock() {
                        *last = Some(line);
                    }
                }
            });
        }

        info!(
            "Opened {:?}: {}x{} @ {:?} fps",
            path, info.width, info.height, info.frame_rate
        );

        Ok(Self {
            path: path.to_path_buf(),
            info,
            child,
            stdout,
            last_stderr,
            sequence: 0,
            finished: false,
        })
    }

    /// Input path this source decodes
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn end_of_stream(&mut self, partial_bytes: usize) {
        self.finished = true;

        if partial_bytes > 0 {
            warn!(
                "Discarding truncated frame {} of {:?} ({} of {} bytes)",
                self.sequence,
                self.path,
                partial_bytes,
                self.info.frame_size_bytes()
            );
        }

        match self.child.wait() {
            Ok(status) if !status.success() => {
                let detail = self
                    .last_stderr
                    .lock()
                    .ok()
                    .and_then(|last| last.clone())
                    .unwrap_or_default();
                warn!(
                    "Decoder exited with {} after {} frames of {:?}, output will be truncated: {}",
                    status, self.sequence, self.path, detail
                );
            }
            Ok(_) => debug!("Decoder finished after {} frames", self.sequence),
            Err(e) => warn!("Failed to reap decoder process: {}", e),
        }
    }
}

impl FrameSource for FfmpegSource {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }

        let mut buffer = vec![0u8; self.info.frame_size_bytes()];
        let filled = read_full(&mut self.stdout, &mut buffer)
            .map_err(|e| Error::Decode(format!("reading decoded frame: {}", e)))?;

        if filled < buffer.len() {
            self.end_of_stream(filled);
            return Ok(None);
        }

        let frame = Frame::new(buffer, self.info.width, self.info.height, self.sequence)?;
        self.sequence += 1;
        Ok(Some(frame))
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            debug!("Stopping decoder for {:?}", self.path);
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Fill `buf` as far as the reader allows; returns the bytes read
///
/// Unlike `read_exact`, a short read at end of input is reported as a count
/// instead of an error so the caller can tell clean EOF from truncation.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
