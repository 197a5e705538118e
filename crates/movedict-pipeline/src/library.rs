//! The movement dictionary output directory
//!
//! Names handed out by [`OutputLibrary::reserve`] are held in a shared
//! pending set until the reservation is dropped, so two concurrent requests
//! with the same label never resolve to the same file.

use crate::namer::{NamingRequest, CLIP_EXTENSION};
use movedict_core::{Error, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Directory of finished clips plus the names currently being written
#[derive(Debug, Clone)]
pub struct OutputLibrary {
    dir: PathBuf,
    pending: Arc<Mutex<HashSet<String>>>,
}

impl OutputLibrary {
    /// Open the library, creating the directory if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        debug!("Output library at {:?}", dir);
        Ok(Self {
            dir,
            pending: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashSet<String>> {
        // A panic while holding the lock leaves the set itself consistent
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claim a collision-free file name for `request`
    pub fn reserve(&self, request: &NamingRequest) -> Result<Reservation> {
        let mut pending = self.lock_pending();
        let name = request.resolve(|candidate| {
            pending.contains(candidate) || self.dir.join(candidate).exists()
        })?;
        pending.insert(name.clone());
        drop(pending);

        debug!("Reserved {}", name);
        Ok(Reservation {
            path: self.dir.join(&name),
            name,
            pending: Arc::clone(&self.pending),
        })
    }

    /// Stored clip names, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(CLIP_EXTENSION) {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Full path of a stored clip
    pub fn path_of(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.dir.join(name))
    }

    /// Remove a stored clip; returns false when it was not there
    pub fn delete(&self, name: &str) -> Result<bool> {
        let path = self.path_of(name)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {
                info!("Deleted {:?}", path);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Delete of missing clip {:?} ignored", path);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.contains('\0');
    if bad {
        return Err(Error::Config(format!("invalid clip name: {:?}", name)));
    }
    Ok(())
}

/// A file name held for one in-flight transcode
///
/// Dropping the reservation releases the name. By then the file either
/// exists on disk or was never created.
#[derive(Debug)]
pub struct Reservation {
    name: String,
    path: PathBuf,
    pending: Arc<Mutex<HashSet<String>>>,
}

impl Reservation {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.remove(&self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn request(label: &str) -> NamingRequest {
        NamingRequest {
            label: label.to_string(),
            timestamp: "20240101_000000".to_string(),
        }
    }

    #[test]
    fn test_open_creates_directory() {
        let root = tempdir().unwrap();
        let dir = root.path().join("nested").join("dict");
        let library = OutputLibrary::open(&dir).unwrap();
        assert!(dir.is_dir());
        assert_eq!(library.dir(), dir.as_path());
    }

    #[test]
    fn test_pending_names_are_not_reused() {
        let root = tempdir().unwrap();
        let library = OutputLibrary::open(root.path()).unwrap();

        let first = library.reserve(&request("wave")).unwrap();
        let second = library.reserve(&request("wave")).unwrap();
        assert_eq!(first.name(), "wave.mp4");
        assert_eq!(second.name(), "wave_20240101_000000.mp4");
        assert!(matches!(
            library.reserve(&request("wave")),
            Err(Error::NameCollision { .. })
        ));

        drop(first);
        assert_eq!(library.reserve(&request("wave")).unwrap().name(), "wave.mp4");
    }

    #[test]
    fn test_existing_files_are_taken() {
        let root = tempdir().unwrap();
        std::fs::write(root.path().join("wave.mp4"), b"x").unwrap();
        let library = OutputLibrary::open(root.path()).unwrap();

        let reservation = library.reserve(&request("wave")).unwrap();
        assert_eq!(reservation.name(), "wave_20240101_000000.mp4");
        assert_eq!(reservation.path(), root.path().join("wave_20240101_000000.mp4"));
    }

    #[test]
    fn test_list_sorted_clips_only() {
        let root = tempdir().unwrap();
        for name in ["b.mp4", "a.mp4", "notes.txt", ".movedict-x.part"] {
            std::fs::write(root.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(root.path().join("dir.mp4")).unwrap();
        let library = OutputLibrary::open(root.path()).unwrap();

        assert_eq!(library.list().unwrap(), vec!["a.mp4", "b.mp4"]);
    }

    #[test]
    fn test_delete() {
        let root = tempdir().unwrap();
        std::fs::write(root.path().join("a.mp4"), b"x").unwrap();
        let library = OutputLibrary::open(root.path()).unwrap();

        assert!(library.delete("a.mp4").unwrap());
        assert!(!library.delete("a.mp4").unwrap());
        assert!(library.list().unwrap().is_empty());
    }

    #[test]
    fn test_delete_rejects_paths() {
        let root = tempdir().unwrap();
        let library = OutputLibrary::open(root.path().join("dict")).unwrap();
        std::fs::write(root.path().join("outside.mp4"), b"x").unwrap();

        assert!(library.delete("../outside.mp4").is_err());
        assert!(library.delete("").is_err());
        assert!(library.delete("..").is_err());
        assert!(root.path().join("outside.mp4").exists());
    }
}
