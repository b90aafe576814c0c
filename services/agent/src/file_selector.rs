use crate::config::WatchConfig;
use crate::fs::{DirEntryInfo, Filesystem};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Error, Debug)]
pub enum SelectError {
    #[error("Failed to list watch directory {path}: {source}")]
    ListDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A non-empty file in the watch directory whose name matches the pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub name: String,
    pub path: PathBuf,
    pub modified: SystemTime,
    pub size_bytes: u64,
}

impl CandidateFile {
    /// Modification time for log output
    pub fn modified_utc(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.modified)
    }
}

/// Candidate name pattern: `<prefix><anything><extension>`
#[derive(Debug, Clone)]
pub struct FilePattern {
    prefix: String,
    extension: String,
}

impl FilePattern {
    pub fn new(prefix: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            extension: extension.into(),
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        name.len() >= self.prefix.len() + self.extension.len()
            && name.starts_with(&self.prefix)
            && name.ends_with(&self.extension)
    }
}

/// Picks the newest qualifying file in the watch directory
///
/// Qualifying means: a regular file, name matches the [`FilePattern`], and
/// size greater than zero. Among files sharing the newest modification time
/// the one listed first wins.
pub struct FileSelector {
    fs: Arc<dyn Filesystem>,
    dir: PathBuf,
    pattern: FilePattern,
}

impl FileSelector {
    pub fn new(fs: Arc<dyn Filesystem>, dir: impl Into<PathBuf>, pattern: FilePattern) -> Self {
        Self {
            fs,
            dir: dir.into(),
            pattern,
        }
    }

    pub fn from_config(fs: Arc<dyn Filesystem>, config: &WatchConfig) -> Self {
        Self::new(
            fs,
            config.path.clone(),
            FilePattern::new(&config.file_prefix, &config.file_extension),
        )
    }

    /// Newest qualifying file, or `None` if nothing qualifies
    pub fn select(&self) -> Result<Option<CandidateFile>, SelectError> {
        let entries = self
            .fs
            .list_dir(&self.dir)
            .map_err(|source| SelectError::ListDir {
                path: self.dir.display().to_string(),
                source,
            })?;

        let mut newest: Option<CandidateFile> = None;

        for entry in entries {
            let Some(candidate) = self.qualify(entry) else {
                continue;
            };

            // Strictly newer only, so ties keep the earlier listed entry
            if newest
                .as_ref()
                .map_or(true, |current| candidate.modified > current.modified)
            {
                newest = Some(candidate);
            }
        }

        if let Some(ref file) = newest {
            debug!(
                name = %file.name,
                size_bytes = file.size_bytes,
                modified = %file.modified_utc().to_rfc3339(),
                "Selected candidate file"
            );
        }

        Ok(newest)
    }

    fn qualify(&self, entry: DirEntryInfo) -> Option<CandidateFile> {
        if !entry.is_file || !self.pattern.matches(&entry.name) {
            return None;
        }

        if entry.len == 0 {
            trace!(name = %entry.name, "Skipping empty candidate");
            return None;
        }

        Some(CandidateFile {
            name: entry.name,
            path: entry.path,
            modified: entry.modified,
            size_bytes: entry.len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{DiskFs, MemoryFs};
    use filetime::{set_file_mtime, FileTime};
    use std::path::Path;
    use std::time::Duration;
    use tempfile::tempdir;

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn selector(fs: Arc<dyn Filesystem>, dir: &str) -> FileSelector {
        FileSelector::new(fs, dir, FilePattern::new("a_", ".json"))
    }

    #[test]
    fn test_pattern_matching() {
        let pattern = FilePattern::new("products_full_", ".json");
        assert!(pattern.matches("products_full_20240101.json"));
        assert!(pattern.matches("products_full_.json"));
        assert!(!pattern.matches("products_full_20240101.json.tmp"));
        assert!(!pattern.matches("other_20240101.json"));
        assert!(!pattern.matches("READY"));

        let short = FilePattern::new("a.json", ".json");
        assert!(!short.matches("a.json"));
    }

    #[test]
    fn test_newest_non_empty_file_wins() {
        let fs = Arc::new(MemoryFs::new());
        fs.insert("/w/a_20240101.json", vec![b'x'; 100], at(1_000));
        fs.insert("/w/a_20240102.json", vec![b'y'; 50], at(2_000));
        fs.insert("/w/a_20240103.json", Vec::new(), at(3_000));
        fs.touch("/w/READY");

        let selected = selector(fs, "/w").select().unwrap().unwrap();

        assert_eq!(selected.name, "a_20240102.json");
        assert_eq!(selected.size_bytes, 50);
        assert_eq!(selected.modified, at(2_000));
    }

    #[test]
    fn test_non_matching_names_ignored() {
        let fs = Arc::new(MemoryFs::new());
        fs.insert("/w/a_1.json", b"old".to_vec(), at(1_000));
        fs.insert("/w/b_2.json", b"newer".to_vec(), at(5_000));
        fs.insert("/w/a_3.csv", b"newest".to_vec(), at(9_000));

        let selected = selector(fs, "/w").select().unwrap().unwrap();
        assert_eq!(selected.name, "a_1.json");
    }

    #[test]
    fn test_none_when_nothing_qualifies() {
        let fs = Arc::new(MemoryFs::new());
        fs.touch("/w/READY");
        fs.insert("/w/a_1.json", Vec::new(), at(1_000));

        assert_eq!(selector(fs, "/w").select().unwrap(), None);
    }

    #[test]
    fn test_equal_mtime_keeps_listing_order() {
        let fs = Arc::new(MemoryFs::new());
        fs.insert("/w/a_x.json", b"first".to_vec(), at(1_000));
        fs.insert("/w/a_y.json", b"second".to_vec(), at(1_000));

        let selected = selector(fs, "/w").select().unwrap().unwrap();
        assert_eq!(selected.name, "a_x.json");
    }

    #[test]
    fn test_directories_never_selected() {
        let fs = Arc::new(MemoryFs::new());
        fs.insert("/w/a_1.json", b"data".to_vec(), at(1_000));
        fs.insert("/w/a_dir.json/inner", b"data".to_vec(), at(9_000));

        let selected = selector(fs, "/w").select().unwrap().unwrap();
        assert_eq!(selected.name, "a_1.json");
    }

    #[test]
    fn test_missing_directory_is_error() {
        let fs = Arc::new(MemoryFs::new());
        assert!(matches!(
            selector(fs, "/missing").select(),
            Err(SelectError::ListDir { .. })
        ));
    }

    #[test]
    fn test_selects_on_disk_by_mtime() {
        let dir = tempdir().unwrap();
        let write = |name: &str, bytes: usize, secs: i64| {
            let path = dir.path().join(name);
            std::fs::write(&path, vec![b'z'; bytes]).unwrap();
            set_file_mtime(&path, FileTime::from_unix_time(secs, 0)).unwrap();
        };
        write("a_20240101.json", 100, 1_700_000_000);
        write("a_20240102.json", 50, 1_700_000_100);
        write("a_20240103.json", 0, 1_700_000_200);

        let selector = FileSelector::new(
            Arc::new(DiskFs::new()),
            dir.path(),
            FilePattern::new("a_", ".json"),
        );
        let selected = selector.select().unwrap().unwrap();

        assert_eq!(selected.name, "a_20240102.json");
        assert_eq!(selected.path, Path::new(dir.path()).join("a_20240102.json"));
    }
}
