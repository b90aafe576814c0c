//! Single-slot persisted record of the last successfully transmitted fingerprint.

use crate::fingerprint::Fingerprint;
use crate::fs::Filesystem;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to read state file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write state file {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Persisted last-sent fingerprint. Overwritten on every write; no history.
pub struct DedupStore {
    fs: Arc<dyn Filesystem>,
    path: PathBuf,
}

impl DedupStore {
    pub fn new(fs: Arc<dyn Filesystem>, path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            path: path.into(),
        }
    }

    /// Last persisted fingerprint, `None` if nothing has been sent yet
    ///
    /// A state file that does not hold a valid fingerprint is treated as
    /// empty, which makes the next candidate count as new content.
    pub fn read(&self) -> Result<Option<Fingerprint>, StoreError> {
        let bytes = match self.fs.read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.display().to_string(),
                    source,
                })
            }
        };

        // Lossy so that non UTF-8 contents land in the invalid-fingerprint branch
        let contents = String::from_utf8_lossy(&bytes);
        let trimmed = contents.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        match Fingerprint::parse(trimmed) {
            Some(fp) => Ok(Some(fp)),
            None => {
                warn!(path = %self.path.display(), "State file does not hold a valid fingerprint, ignoring it");
                Ok(None)
            }
        }
    }

    /// Persist `fingerprint`, replacing any prior value
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn write(&self, fingerprint: &Fingerprint) -> Result<(), StoreError> {
        self.fs
            .write_atomic(&self.path, fingerprint.as_str().as_bytes())
            .map_err(|source| StoreError::Write {
                path: self.path.display().to_string(),
                source,
            })?;

        debug!(fingerprint = %fingerprint, "Stored last sent fingerprint");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{DiskFs, MemoryFs};
    use std::path::Path;
    use std::time::SystemTime;
    use tempfile::tempdir;

    #[test]
    fn test_read_absent_is_none() {
        let store = DedupStore::new(Arc::new(MemoryFs::new()), "/state/last_hash.txt");
        assert_eq!(store.read().unwrap(), None);
    }

    #[test]
    fn test_write_then_read() {
        let store = DedupStore::new(Arc::new(MemoryFs::new()), "/state/last_hash.txt");
        let fp = Fingerprint::of_bytes(b"x");

        store.write(&fp).unwrap();
        assert_eq!(store.read().unwrap(), Some(fp));
    }

    #[test]
    fn test_overwrite_keeps_only_latest() {
        let fs = Arc::new(MemoryFs::new());
        let store = DedupStore::new(fs.clone(), "/state/last_hash.txt");

        store.write(&Fingerprint::of_bytes(b"one")).unwrap();
        store.write(&Fingerprint::of_bytes(b"two")).unwrap();

        assert_eq!(store.read().unwrap(), Some(Fingerprint::of_bytes(b"two")));
        let snapshot = fs.snapshot();
        assert_eq!(
            snapshot[Path::new("/state/last_hash.txt")],
            Fingerprint::of_bytes(b"two").as_str().as_bytes()
        );
    }

    #[test]
    fn test_read_trims_whitespace() {
        let fs = Arc::new(MemoryFs::new());
        let fp = Fingerprint::of_bytes(b"x");
        fs.insert(
            "/state/last_hash.txt",
            format!("{}\n", fp).into_bytes(),
            SystemTime::now(),
        );

        let store = DedupStore::new(fs, "/state/last_hash.txt");
        assert_eq!(store.read().unwrap(), Some(fp));
    }

    #[test]
    fn test_empty_or_garbage_state_is_none() {
        let fs = Arc::new(MemoryFs::new());
        let store = DedupStore::new(fs.clone(), "/state/last_hash.txt");

        fs.insert("/state/last_hash.txt", b"  \n".to_vec(), SystemTime::now());
        assert_eq!(store.read().unwrap(), None);

        fs.insert("/state/last_hash.txt", b"not-a-hash".to_vec(), SystemTime::now());
        assert_eq!(store.read().unwrap(), None);
    }

    #[test]
    fn test_non_utf8_state_file_is_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("last_hash.txt");
        std::fs::write(&path, [0xff, 0xfe, 0x00, 0x41]).unwrap();

        let store = DedupStore::new(Arc::new(DiskFs::new()), &path);
        assert_eq!(store.read().unwrap(), None);

        // A later successful send replaces the corrupt contents
        let fp = Fingerprint::of_bytes(b"payload");
        store.write(&fp).unwrap();
        assert_eq!(store.read().unwrap(), Some(fp));
    }

    #[test]
    fn test_on_disk_survives_new_store_instance() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("last_hash.txt");
        let fp = Fingerprint::of_bytes(b"payload");

        DedupStore::new(Arc::new(DiskFs::new()), &path)
            .write(&fp)
            .unwrap();

        let reopened = DedupStore::new(Arc::new(DiskFs::new()), &path);
        assert_eq!(reopened.read().unwrap(), Some(fp));
    }
}
