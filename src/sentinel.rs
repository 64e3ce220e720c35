use std::io;
use std::path::{Path, PathBuf};

/// Empty marker file the daemon creates once it is ready to serve.
///
/// The path is a pure function of the base directory, the name prefix and
/// the session's port, so a file left behind by a crashed session with the
/// same port would read as ready. Callers remove it before each launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadySentinel {
    path: PathBuf,
}

impl ReadySentinel {
    pub fn for_session(temp_dir: &Path, name: &str, port: u16) -> Self {
        Self {
            path: temp_dir.join(format!("{name}-{port}.ready")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Existence, not contents, signals readiness.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Deletes the marker; a missing file is not an error.
    pub fn remove(&self) -> io::Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("removed sentinel {}", self.path.display());
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Like [`remove`](Self::remove) but only logs failures.
    pub fn clear(&self) {
        if let Err(e) = self.remove() {
            warn!("could not remove sentinel {}: {e}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_is_deterministic() {
        let a = ReadySentinel::for_session(Path::new("/tmp"), "daemon", 54321);
        let b = ReadySentinel::for_session(Path::new("/tmp"), "daemon", 54321);
        assert_eq!(a, b);
        assert_eq!(a.path(), Path::new("/tmp/daemon-54321.ready"));
        assert_ne!(
            a,
            ReadySentinel::for_session(Path::new("/tmp"), "daemon", 54322)
        );
    }

    #[test]
    fn test_exists_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let sentinel = ReadySentinel::for_session(dir.path(), "daemomnify", 40000);
        assert!(!sentinel.exists());
        assert!(!sentinel.remove().unwrap());

        std::fs::write(sentinel.path(), "").unwrap();
        assert!(sentinel.exists());
        assert!(sentinel.remove().unwrap());
        assert!(!sentinel.exists());
    }

    #[test]
    fn test_directory_is_not_a_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let sentinel = ReadySentinel::for_session(dir.path(), "daemomnify", 1);
        std::fs::create_dir(sentinel.path()).unwrap();
        assert!(!sentinel.exists());
    }
}
