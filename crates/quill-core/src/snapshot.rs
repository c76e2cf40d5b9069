use std::path::Path;
use std::path::PathBuf;

use chrono::DateTime;
use chrono::Utc;

use crate::error::InputError;

/// Largest file read by default.
pub const DEFAULT_MAX_INPUT_BYTES: u64 = 1024 * 1024;

/// Content of the target file as it was when the run started.
///
/// Captured once, before the oracle is contacted, and never mutated. The
/// executor compares against it to detect edits made while the operator was
/// reviewing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSnapshot {
    path: PathBuf,
    content: String,
    read_at: DateTime<Utc>,
}

impl FileSnapshot {
    pub fn capture(path: impl AsRef<Path>) -> Result<Self, InputError> {
        Self::capture_with_limit(path, DEFAULT_MAX_INPUT_BYTES)
    }

    /// Reads a UTF-8 text file of at most `max_bytes`.
    ///
    /// Oversized files are refused before their content is read; a NUL byte
    /// marks a file as binary.
    pub fn capture_with_limit(path: impl AsRef<Path>, max_bytes: u64) -> Result<Self, InputError> {
        let path = path.as_ref().to_path_buf();
        let unreadable = |source: std::io::Error| InputError::Unreadable {
            path: path.clone(),
            source,
        };
        let size = std::fs::metadata(&path).map_err(unreadable)?.len();
        if size > max_bytes {
            return Err(InputError::TooLarge {
                path: path.clone(),
                size,
                limit: max_bytes,
            });
        }
        let bytes = std::fs::read(&path).map_err(unreadable)?;
        if bytes.len() as u64 > max_bytes {
            return Err(InputError::TooLarge {
                path: path.clone(),
                size: bytes.len() as u64,
                limit: max_bytes,
            });
        }
        if bytes.contains(&0) {
            return Err(InputError::Binary { path: path.clone() });
        }
        let content = String::from_utf8(bytes).map_err(|err| {
            unreadable(std::io::Error::new(std::io::ErrorKind::InvalidData, err))
        })?;
        tracing::debug!(path = %path.display(), bytes = content.len(), "captured snapshot");
        Ok(Self {
            path,
            content,
            read_at: Utc::now(),
        })
    }

    /// Builds a snapshot from content already in memory.
    pub fn from_parts(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            read_at: Utc::now(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn read_at(&self) -> DateTime<Utc> {
        self.read_at
    }

    /// Name shown to the oracle: the path exactly as the operator gave it.
    pub fn display_name(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    /// Re-reads the file and reports whether it still holds the captured bytes.
    pub fn matches_disk(&self) -> std::io::Result<bool> {
        let current = std::fs::read(&self.path)?;
        Ok(current == self.content.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn capture_reads_content_once() {
        let dir = tempdir().expect("tmpdir");
        let path = dir.path().join("lib.rs");
        fs::write(&path, "fn a() {}\n").expect("write");

        let snapshot = FileSnapshot::capture(&path).expect("capture");
        fs::write(&path, "fn b() {}\n").expect("rewrite");

        assert_eq!(snapshot.content(), "fn a() {}\n");
        assert_eq!(snapshot.path(), path.as_path());
        assert!(!snapshot.matches_disk().expect("reread"));
    }

    #[test]
    fn capture_missing_file_is_input_error() {
        let dir = tempdir().expect("tmpdir");
        let err = FileSnapshot::capture(dir.path().join("absent.rs")).unwrap_err();
        match err {
            InputError::Unreadable { source, .. } => {
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound)
            }
            other => panic!("expected unreadable, got {other:?}"),
        }
    }

    #[test]
    fn oversized_file_is_refused() {
        let dir = tempdir().expect("tmpdir");
        let path = dir.path().join("big.log");
        fs::write(&path, "0123456789").expect("write");

        let err = FileSnapshot::capture_with_limit(&path, 9).unwrap_err();
        assert!(
            matches!(err, InputError::TooLarge { size: 10, limit: 9, .. }),
            "{err:?}"
        );
        let snapshot = FileSnapshot::capture_with_limit(&path, 10).expect("at the limit");
        assert_eq!(snapshot.content(), "0123456789");
    }

    #[test]
    fn binary_file_is_refused() {
        let dir = tempdir().expect("tmpdir");
        let path = dir.path().join("blob.bin");
        fs::write(&path, b"ELF\0\x01").expect("write");
        let err = FileSnapshot::capture(&path).unwrap_err();
        assert!(matches!(err, InputError::Binary { .. }), "{err:?}");
    }

    #[test]
    fn invalid_utf8_is_unreadable() {
        let dir = tempdir().expect("tmpdir");
        let path = dir.path().join("latin1.txt");
        fs::write(&path, b"caf\xe9\n").expect("write");
        match FileSnapshot::capture(&path).unwrap_err() {
            InputError::Unreadable { source, .. } => {
                assert_eq!(source.kind(), std::io::ErrorKind::InvalidData)
            }
            other => panic!("expected unreadable, got {other:?}"),
        }
    }

    #[test]
    fn unchanged_file_matches_disk() {
        let dir = tempdir().expect("tmpdir");
        let path = dir.path().join("main.py");
        fs::write(&path, "print('hi')\n").expect("write");
        let snapshot = FileSnapshot::capture(&path).expect("capture");
        assert!(snapshot.matches_disk().expect("reread"));
    }
}
