//! MP4 file sink with all-or-nothing commit
//!
//! Frames are encoded into a hidden temporary file next to the destination.
//! `finish` finalizes the container and renames it into place without
//! replacing an existing file. Dropping an unfinished sink deletes the
//! temporary file, so a failed transcode leaves nothing behind.

use crate::encoder::H264Encoder;
use crate::mp4::Mp4Writer;
use movedict_core::{Error, Frame, FrameSink, Result, StreamInfo};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Encodes frames into an H.264 MP4 file
pub struct Mp4FileSink {
    target: PathBuf,
    width: u32,
    height: u32,
    encoder: H264Encoder,
    writer: Mp4Writer<BufWriter<NamedTempFile>>,
}

impl Mp4FileSink {
    /// Open a sink that will commit to `target`
    ///
    /// `fps` must already have any fallback applied.
    pub fn create(target: &Path, info: &StreamInfo, fps: f64, bitrate_kbps: u32) -> Result<Self> {
        if target.exists() {
            return Err(Error::NameCollision {
                name: target.display().to_string(),
            });
        }

        let encoder = H264Encoder::new(info.width, info.height, fps, bitrate_kbps)?;

        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let temp = tempfile::Builder::new()
            .prefix(".movedict-")
            .suffix(".part")
            .tempfile_in(dir)?;
        debug!("Writing {:?} via {:?}", target, temp.path());

        let writer = Mp4Writer::new(BufWriter::new(temp), info.width, info.height, fps)?;

        info!(
            "Opened output {:?}: {}x{} @ {:.2} fps",
            target, info.width, info.height, fps
        );

        Ok(Self {
            target: target.to_path_buf(),
            width: info.width,
            height: info.height,
            encoder,
            writer,
        })
    }
}

impl FrameSink for Mp4FileSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.width != self.width || frame.height != self.height {
            return Err(Error::InvalidFrame(format!(
                "sink expects {}x{}, got {}x{}",
                self.width, self.height, frame.width, frame.height
            )));
        }
        let encoded = self.encoder.encode(frame)?;
        self.writer.write_sample(&encoded)
    }

    fn frames_written(&self) -> u64 {
        self.writer.sample_count() as u64
    }

    fn finish(self) -> Result<PathBuf> {
        let samples = self.writer.sample_count();
        let temp = self
            .writer
            .finish()?
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))?;
        temp.as_file().sync_all()?;

        temp.persist_noclobber(&self.target).map_err(|e| {
            if e.error.kind() == std::io::ErrorKind::AlreadyExists {
                Error::NameCollision {
                    name: self.target.display().to_string(),
                }
            } else {
                Error::Io(e.error)
            }
        })?;

        info!("Committed {:?} ({} frames)", self.target, samples);
        Ok(self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_commit_writes_only_target() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("clip.mp4");
        let info = StreamInfo::new(64, 48, Some(20.0));

        let mut sink = Mp4FileSink::create(&target, &info, 20.0, 500).unwrap();
        for i in 0..3 {
            sink.write_frame(&Frame::black(64, 48, i)).unwrap();
        }
        assert_eq!(sink.frames_written(), 3);
        let committed = sink.finish().unwrap();

        assert_eq!(committed, target);
        assert_eq!(entries(dir.path()), vec!["clip.mp4".to_string()]);
        let data = std::fs::read(&target).unwrap();
        assert_eq!(&data[4..8], b"ftyp");
    }

    #[test]
    fn test_drop_discards_partial_output() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("clip.mp4");
        let info = StreamInfo::new(64, 48, None);

        {
            let mut sink = Mp4FileSink::create(&target, &info, 20.0, 500).unwrap();
            sink.write_frame(&Frame::black(64, 48, 0)).unwrap();
        }

        assert!(entries(dir.path()).is_empty());
    }

    #[test]
    fn test_existing_target_is_not_overwritten() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("clip.mp4");
        std::fs::write(&target, b"keep").unwrap();
        let info = StreamInfo::new(64, 48, None);

        let result = Mp4FileSink::create(&target, &info, 20.0, 500);
        assert!(matches!(result, Err(Error::NameCollision { .. })));
        assert_eq!(std::fs::read(&target).unwrap(), b"keep");
    }

    #[test]
    fn test_target_taken_before_commit() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("clip.mp4");
        let info = StreamInfo::new(64, 48, None);

        let mut sink = Mp4FileSink::create(&target, &info, 20.0, 500).unwrap();
        sink.write_frame(&Frame::black(64, 48, 0)).unwrap();
        std::fs::write(&target, b"winner").unwrap();

        assert!(matches!(sink.finish(), Err(Error::NameCollision { .. })));
        assert_eq!(std::fs::read(&target).unwrap(), b"winner");
        assert_eq!(entries(dir.path()), vec!["clip.mp4".to_string()]);
    }

    #[test]
    fn test_empty_stream_fails_and_cleans_up() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("clip.mp4");
        let info = StreamInfo::new(64, 48, None);

        let sink = Mp4FileSink::create(&target, &info, 20.0, 500).unwrap();
        assert!(sink.finish().is_err());
        assert!(entries(dir.path()).is_empty());
    }

    #[test]
    fn test_odd_dimensions_rejected() {
        let dir = tempdir().unwrap();
        let info = StreamInfo::new(65, 48, None);
        assert!(Mp4FileSink::create(&dir.path().join("odd.mp4"), &info, 20.0, 500).is_err());
        assert!(entries(dir.path()).is_empty());
    }
}
