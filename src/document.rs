//! Whole-file load and persist for patch targets.
//!
//! A [`SourceDocument`] is read once, transformed in memory, and written once.
//! Both the read and the write are scoped: the file handle is closed before
//! the function returns, on every path.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use xxhash_rust::xxh3::xxh3_64;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{path} is not valid UTF-8: {source}")]
    Encoding {
        path: PathBuf,
        source: std::str::Utf8Error,
    },

    #[error("{path} changed on disk after it was read; refusing to overwrite")]
    ConcurrentModification { path: PathBuf },
}

/// Full textual content of one file, held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    path: PathBuf,
    content: String,
    fingerprint: u64,
}

impl SourceDocument {
    /// Read `path` fully and validate it as UTF-8.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| DocumentError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let fingerprint = xxh3_64(&bytes);

        let content = String::from_utf8(bytes).map_err(|e| DocumentError::Encoding {
            path: path.to_path_buf(),
            source: e.utf8_error(),
        })?;

        debug!(path = %path.display(), bytes = content.len(), "loaded document");

        Ok(Self {
            path: path.to_path_buf(),
            content,
            fingerprint,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Replace the file's content with `new_content`.
    ///
    /// The file is re-read first; if its bytes no longer match what was
    /// loaded, nothing is written. The write itself is atomic.
    pub fn persist(&self, new_content: &str) -> Result<(), DocumentError> {
        let on_disk = fs::read(&self.path).map_err(|source| DocumentError::Read {
            path: self.path.clone(),
            source,
        })?;
        if xxh3_64(&on_disk) != self.fingerprint {
            return Err(DocumentError::ConcurrentModification {
                path: self.path.clone(),
            });
        }

        atomic_write(&self.path, new_content.as_bytes()).map_err(|source| {
            DocumentError::Write {
                path: self.path.clone(),
                source,
            }
        })?;

        // Bump mtime so build tools notice the rewrite even within one tick.
        filetime::set_file_mtime(&self.path, filetime::FileTime::now()).map_err(|source| {
            DocumentError::Write {
                path: self.path.clone(),
                source,
            }
        })?;

        debug!(path = %self.path.display(), bytes = new_content.len(), "persisted document");
        Ok(())
    }
}

/// Atomic file write: tempfile + fsync + rename.
///
/// Either the full write succeeds or the original file is left untouched.
fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    // Tempfile must live on the same filesystem for rename to be atomic.
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;

    // Keep the target's permissions across the rename.
    if let Ok(meta) = fs::metadata(path) {
        temp.as_file().set_permissions(meta.permissions())?;
    }

    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_reads_whole_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("Provider.java");
        fs::write(&path, "class Provider {}\n").unwrap();

        let doc = SourceDocument::load(&path).unwrap();
        assert_eq!(doc.content(), "class Provider {}\n");
        assert_eq!(doc.path(), path.as_path());
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = SourceDocument::load(temp_dir.path().join("missing.java"));
        assert!(matches!(result, Err(DocumentError::Read { .. })));
    }

    #[test]
    fn test_load_rejects_invalid_utf8() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("latin1.txt");
        fs::write(&path, [b'a', 0xff, b'b']).unwrap();

        let result = SourceDocument::load(&path);
        assert!(matches!(result, Err(DocumentError::Encoding { .. })));
    }

    #[test]
    fn test_persist_overwrites_content() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("file.txt");
        fs::write(&path, "before").unwrap();

        let doc = SourceDocument::load(&path).unwrap();
        doc.persist("after, with ñ").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "after, with ñ");
    }

    #[test]
    fn test_persist_detects_concurrent_change() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("file.txt");
        fs::write(&path, "before").unwrap();

        let doc = SourceDocument::load(&path).unwrap();
        fs::write(&path, "someone else").unwrap();

        let result = doc.persist("after");
        assert!(matches!(
            result,
            Err(DocumentError::ConcurrentModification { .. })
        ));
        assert_eq!(fs::read_to_string(&path).unwrap(), "someone else");
    }
}
