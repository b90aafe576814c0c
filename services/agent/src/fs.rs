//! Filesystem capability used by every component that touches disk.
//!
//! The pipeline only ever talks to a [`Filesystem`], so it can run against
//! the real disk ([`DiskFs`]) or an in-memory fake ([`MemoryFs`]).

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::trace;

/// A single directory entry with the metadata the selector needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    /// File name (last path component)
    pub name: String,
    /// Full path of the entry
    pub path: PathBuf,
    /// Last modification time
    pub modified: SystemTime,
    /// Size in bytes
    pub len: u64,
    /// Whether the entry is a regular file
    pub is_file: bool,
}

/// Filesystem operations required by the agent
pub trait Filesystem: Send + Sync {
    /// Whether anything exists at `path`
    fn exists(&self, path: &Path) -> bool;

    /// List `dir`, in directory-listing order
    fn list_dir(&self, dir: &Path) -> io::Result<Vec<DirEntryInfo>>;

    /// Read the whole file
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Replace the file's contents so readers see either the old or the new value
    fn write_atomic(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Delete the file
    fn remove(&self, path: &Path) -> io::Result<()>;
}

/// [`Filesystem`] backed by `std::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskFs;

impl DiskFs {
    pub fn new() -> Self {
        Self
    }
}

impl Filesystem for DiskFs {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn list_dir(&self, dir: &Path) -> io::Result<Vec<DirEntryInfo>> {
        let mut entries = Vec::new();

        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let Ok(name) = entry.file_name().into_string() else {
                trace!(path = %entry.path().display(), "Skipping non UTF-8 file name");
                continue;
            };
            let path = entry.path();

            // Follow symlinks; an entry removed since the listing is simply skipped
            let metadata = match std::fs::metadata(&path) {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };

            entries.push(DirEntryInfo {
                name,
                path,
                modified: metadata.modified()?,
                len: metadata.len(),
                is_file: metadata.is_file(),
            });
        }

        Ok(entries)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    /// Writes `<path>.tmp`, syncs it, renames it over `path`, then syncs the
    /// parent directory so the rename itself is durable.
    fn write_atomic(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)?;

        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            file.write_all(contents)?;
            file.sync_all()?;
        }

        std::fs::rename(&tmp_path, path)?;
        sync_dir(&parent)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

// Directories cannot be opened as files on Windows
#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

#[derive(Debug, Clone)]
struct MemFile {
    data: Vec<u8>,
    modified: SystemTime,
}

/// In-memory [`Filesystem`] with explicit modification times
///
/// Directories are implicit: a directory lists every file whose parent it is.
/// Listing order is lexicographic by path.
#[derive(Debug, Default)]
pub struct MemoryFs {
    files: Mutex<BTreeMap<PathBuf, MemFile>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a file with the given modification time
    pub fn insert(&self, path: impl Into<PathBuf>, data: impl Into<Vec<u8>>, modified: SystemTime) {
        self.files.lock().insert(
            path.into(),
            MemFile {
                data: data.into(),
                modified,
            },
        );
    }

    /// Create an empty file stamped with the current time
    pub fn touch(&self, path: impl Into<PathBuf>) {
        self.insert(path, Vec::new(), SystemTime::now());
    }

    /// Copy of every file's contents, for before/after comparisons
    pub fn snapshot(&self) -> BTreeMap<PathBuf, Vec<u8>> {
        self.files
            .lock()
            .iter()
            .map(|(path, file)| (path.clone(), file.data.clone()))
            .collect()
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} not found", path.display()),
    )
}

impl Filesystem for MemoryFs {
    fn exists(&self, path: &Path) -> bool {
        let files = self.files.lock();
        files.contains_key(path) || files.keys().any(|p| p.starts_with(path))
    }

    fn list_dir(&self, dir: &Path) -> io::Result<Vec<DirEntryInfo>> {
        let files = self.files.lock();
        let mut entries = Vec::new();
        let mut subdirs: Vec<PathBuf> = Vec::new();

        for (path, file) in files.iter() {
            let Ok(rest) = path.strip_prefix(dir) else {
                continue;
            };
            let mut components = rest.components();
            let Some(first) = components.next() else {
                continue;
            };
            let name = first.as_os_str().to_string_lossy().into_owned();

            if components.next().is_some() {
                let sub = dir.join(&name);
                if !subdirs.contains(&sub) {
                    entries.push(DirEntryInfo {
                        name,
                        path: sub.clone(),
                        modified: file.modified,
                        len: 0,
                        is_file: false,
                    });
                    subdirs.push(sub);
                }
                continue;
            }

            entries.push(DirEntryInfo {
                name,
                path: path.clone(),
                modified: file.modified,
                len: file.data.len() as u64,
                is_file: true,
            });
        }

        if entries.is_empty() && !files.keys().any(|p| p.starts_with(dir)) {
            return Err(not_found(dir));
        }

        Ok(entries)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.files
            .lock()
            .get(path)
            .map(|file| file.data.clone())
            .ok_or_else(|| not_found(path))
    }

    fn write_atomic(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        self.insert(path, contents.to_vec(), SystemTime::now());
        Ok(())
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        self.files
            .lock()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| not_found(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_disk_write_atomic_replaces_and_cleans_up() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("last_hash.txt");
        let fs = DiskFs::new();

        fs.write_atomic(&path, b"first").unwrap();
        fs.write_atomic(&path, b"second").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        assert!(!dir.path().join("state").join("last_hash.txt.tmp").exists());
    }

    #[test]
    fn test_disk_read_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let err = DiskFs::new().read(&dir.path().join("nope")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_disk_list_dir_reports_metadata() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.json"), b"hello").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let mut entries = DiskFs::new().list_dir(dir.path()).unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "a.json");
        assert_eq!(entries[0].len, 5);
        assert!(entries[0].is_file);
        assert_eq!(entries[1].name, "sub");
        assert!(!entries[1].is_file);
    }

    #[test]
    fn test_memory_list_dir_only_direct_children() {
        let fs = MemoryFs::new();
        let t = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        fs.insert("/w/b.json", b"bb".to_vec(), t);
        fs.insert("/w/a.json", b"a".to_vec(), t);
        fs.insert("/w/nested/c.json", b"c".to_vec(), t);
        fs.insert("/other/d.json", b"d".to_vec(), t);

        let entries = fs.list_dir(Path::new("/w")).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();

        assert_eq!(names, vec!["a.json", "b.json", "nested"]);
        assert!(!entries[2].is_file);
        assert_eq!(entries[1].len, 2);
    }

    #[test]
    fn test_memory_missing_dir_errors() {
        let fs = MemoryFs::new();
        let err = fs.list_dir(Path::new("/missing")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_memory_remove_and_exists() {
        let fs = MemoryFs::new();
        fs.touch("/w/READY");
        assert!(fs.exists(Path::new("/w/READY")));
        assert!(fs.exists(Path::new("/w")));

        fs.remove(Path::new("/w/READY")).unwrap();
        assert!(!fs.exists(Path::new("/w/READY")));
        assert_eq!(
            fs.remove(Path::new("/w/READY")).unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }
}
