//! Readiness marker written by the external producer.

use crate::fs::Filesystem;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Checks for, and on successful completion clears, the readiness marker
pub struct SignalGate {
    fs: Arc<dyn Filesystem>,
    marker: PathBuf,
}

impl SignalGate {
    pub fn new(fs: Arc<dyn Filesystem>, marker: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            marker: marker.into(),
        }
    }

    pub fn marker(&self) -> &Path {
        &self.marker
    }

    /// Whether the marker is present. Never mutates anything.
    pub fn is_ready(&self) -> bool {
        self.fs.exists(&self.marker)
    }

    /// Delete the marker so the producer can start a new cycle
    ///
    /// A marker that is already gone counts as cleared.
    pub fn clear(&self) -> io::Result<()> {
        match self.fs.remove(&self.marker) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(marker = %self.marker.display(), "Readiness marker already removed");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFs;

    #[test]
    fn test_absent_marker() {
        let gate = SignalGate::new(Arc::new(MemoryFs::new()), "/w/READY");
        assert!(!gate.is_ready());
    }

    #[test]
    fn test_present_marker_is_not_consumed_by_check() {
        let fs = Arc::new(MemoryFs::new());
        fs.touch("/w/READY");
        let gate = SignalGate::new(fs.clone(), "/w/READY");

        assert!(gate.is_ready());
        assert!(gate.is_ready());
        assert!(fs.exists(Path::new("/w/READY")));
    }

    #[test]
    fn test_clear_removes_marker() {
        let fs = Arc::new(MemoryFs::new());
        fs.touch("/w/READY");
        let gate = SignalGate::new(fs, "/w/READY");

        gate.clear().unwrap();
        assert!(!gate.is_ready());
        // Clearing twice is harmless
        gate.clear().unwrap();
    }
}
