//! Async front for the transcode pipeline
//!
//! Each request reserves an output name, then runs the blocking transcode on
//! tokio's blocking pool. Requests share nothing but the output library.

use crate::backend::MediaBackend;
use crate::library::OutputLibrary;
use crate::namer::NamingRequest;
use crate::transcode::{TranscodeReport, Transcoder};
use chrono::{DateTime, Local};
use movedict_core::TranscodeError;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

/// Why a processing request did not produce a clip
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("cannot name output: {0}")]
    Naming(#[source] movedict_core::Error),

    #[error(transparent)]
    Transcode(#[from] TranscodeError),

    #[error("transcode worker stopped: {0}")]
    Worker(String),
}

impl ServiceError {
    /// Short machine-readable reason, as reported to the calling layer
    pub fn reason(&self) -> &'static str {
        match self {
            ServiceError::Naming(_) => "name_unavailable",
            ServiceError::Transcode(e) => e.reason(),
            ServiceError::Worker(_) => "worker_failed",
        }
    }
}

/// A clip that was transcoded and committed to the library
#[derive(Debug, Clone, PartialEq)]
pub struct StoredClip {
    /// File name inside the library
    pub filename: String,
    pub path: PathBuf,
    pub report: TranscodeReport,
}

/// Cloneable handle for submitting recordings
pub struct TranscodeService<B> {
    transcoder: Arc<Transcoder<B>>,
    library: OutputLibrary,
}

impl<B> Clone for TranscodeService<B> {
    fn clone(&self) -> Self {
        Self {
            transcoder: Arc::clone(&self.transcoder),
            library: self.library.clone(),
        }
    }
}

impl<B: MediaBackend + 'static> TranscodeService<B> {
    pub fn new(transcoder: Transcoder<B>, library: OutputLibrary) -> Self {
        Self {
            transcoder: Arc::new(transcoder),
            library,
        }
    }

    /// Transcode `input` into the library under a name derived from `label`
    pub async fn process(
        &self,
        input: impl Into<PathBuf>,
        label: &str,
    ) -> Result<StoredClip, ServiceError> {
        self.process_at(input, label, &Local::now()).await
    }

    /// As [`process`](Self::process) with an explicit capture time
    pub async fn process_at(
        &self,
        input: impl Into<PathBuf>,
        label: &str,
        at: &DateTime<Local>,
    ) -> Result<StoredClip, ServiceError> {
        let input = input.into();
        let request = NamingRequest::new(label, at);
        let reservation = self.library.reserve(&request).map_err(ServiceError::Naming)?;
        info!("Processing {:?} as {}", input, reservation.name());

        let transcoder = Arc::clone(&self.transcoder);
        let output = reservation.path().to_path_buf();
        let job = tokio::task::spawn_blocking(move || transcoder.transcode(&input, &output));

        let outcome = match job.await {
            Ok(result) => result.map_err(ServiceError::from),
            Err(e) => Err(ServiceError::Worker(e.to_string())),
        };

        // The reservation is held until the file is committed or abandoned
        match outcome {
            Ok(report) => Ok(StoredClip {
                filename: reservation.name().to_string(),
                path: report.output.clone(),
                report,
            }),
            Err(e) => {
                error!("Failed to store {}: {}", reservation.name(), e);
                Err(e)
            }
        }
    }

    /// Names of all stored clips
    pub fn list(&self) -> movedict_core::Result<Vec<String>> {
        self.library.list()
    }

    /// Remove a stored clip; returns false when it was not there
    pub fn delete(&self, name: &str) -> movedict_core::Result<bool> {
        self.library.delete(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcode::tests::{pinpoint_overlay, FakeBackend, Mode, Script};
    use chrono::TimeZone;
    use std::path::Path;
    use tempfile::tempdir;

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 6).unwrap()
    }

    fn service(backend: FakeBackend, dir: &Path) -> TranscodeService<FakeBackend> {
        let transcoder = Transcoder::new(backend, pinpoint_overlay(), 20.0);
        TranscodeService::new(transcoder, OutputLibrary::open(dir).unwrap())
    }

    #[tokio::test]
    async fn test_process_stores_under_label() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("record_1.bin");
        let backend = FakeBackend::new(vec![(input.clone(), Script::new(3, 1))], Mode::Absent);
        let service = service(backend, &dir.path().join("dict"));

        let clip = service.process(&input, "Big Jump!").await.unwrap();
        assert_eq!(clip.filename, "Big_Jump.mp4");
        assert_eq!(clip.path, dir.path().join("dict").join("Big_Jump.mp4"));
        assert_eq!(clip.report.frames, 3);
        assert_eq!(service.list().unwrap(), vec!["Big_Jump.mp4"]);
    }

    #[tokio::test]
    async fn test_repeated_label_gets_timestamp() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("record_1.bin");
        let backend = FakeBackend::new(vec![(input.clone(), Script::new(2, 1))], Mode::Absent);
        let service = service(backend, &dir.path().join("dict"));

        let first = service.process_at(&input, "wave", &at()).await.unwrap();
        let second = service.process_at(&input, "wave", &at()).await.unwrap();
        assert_eq!(first.filename, "wave.mp4");
        assert_eq!(second.filename, "wave_20240309_140506.mp4");

        let third = service.process_at(&input, "wave", &at()).await.unwrap_err();
        assert_eq!(third.reason(), "name_unavailable");
    }

    #[tokio::test]
    async fn test_empty_label_uses_timestamp_name() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("record_1.bin");
        let backend = FakeBackend::new(vec![(input.clone(), Script::new(1, 1))], Mode::Absent);
        let service = service(backend, dir.path());

        let clip = service.process_at(&input, "   ", &at()).await.unwrap();
        assert_eq!(clip.filename, "movement_20240309_140506.mp4");
    }

    #[tokio::test]
    async fn test_concurrent_same_label_never_collides() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        let scripts = vec![(a.clone(), Script::new(5, 10)), (b.clone(), Script::new(7, 20))];
        let backend = FakeBackend::new(scripts, Mode::Tracking);
        let service = service(backend.clone(), &dir.path().join("dict"));

        let captured = at();
        let (first, second) = tokio::join!(
            service.process_at(&a, "spin", &captured),
            service.process_at(&b, "spin", &captured)
        );
        let (first, second) = (first.unwrap(), second.unwrap());

        let mut names = vec![first.filename.clone(), second.filename.clone()];
        names.sort();
        assert_eq!(names, vec!["spin.mp4", "spin_20240309_140506.mp4"]);
        assert_eq!(backend.recording(&first.path).unwrap().frames.len(), 5);
        assert_eq!(backend.recording(&second.path).unwrap().frames.len(), 7);
    }

    #[tokio::test]
    async fn test_failure_releases_name() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("good.bin");
        let backend = FakeBackend::new(vec![(good.clone(), Script::new(2, 1))], Mode::Absent);
        let service = service(backend, &dir.path().join("dict"));

        let err = service
            .process_at(dir.path().join("missing.bin"), "hop", &at())
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "open_failed");
        assert!(service.list().unwrap().is_empty());

        let clip = service.process_at(&good, "hop", &at()).await.unwrap();
        assert_eq!(clip.filename, "hop.mp4");
    }

    #[tokio::test]
    async fn test_delete_through_service() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("record_1.bin");
        let backend = FakeBackend::new(vec![(input.clone(), Script::new(1, 1))], Mode::Absent);
        let service = service(backend, &dir.path().join("dict"));
        std::fs::write(&input, b"raw").unwrap();

        service.process_at(&input, "wave", &at()).await.unwrap();
        assert!(service.delete("wave.mp4").unwrap());
        assert!(!service.delete("wave.mp4").unwrap());
        assert!(service.delete("../record_1.bin").is_err());
        assert!(input.exists());
    }
}
