//! Filesystem collaborator with a typed failure taxonomy.
//!
//! Directory relocation needs to distinguish hard, non-retryable filesystem
//! failures (target is a file, permission denied, unknown owner) from plain
//! I/O errors, so the collaborator surfaces a small error enum instead of
//! raw OS error codes. "Already exists as a directory" and "already absent"
//! are successes throughout.

use std::io;
use std::path::Path;
use std::process::Command;

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("{path} already exists and is not a directory")]
    NotADirectory { path: String },

    #[error("permission denied: {path}")]
    PermissionDenied { path: String },

    #[error("unknown user or group: {user}")]
    UnknownUser { user: String },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type FsResult<T> = Result<T, FsError>;

/// Filesystem operations the node model depends on.
///
/// Injected so the reconciliation core is unit-testable without touching
/// real service directories.
pub trait FsOps {
    /// Create a directory (and parents), optionally chowned to `owner`.
    ///
    /// Succeeds if the path already exists as a directory; fails with
    /// `NotADirectory` if it exists as anything else.
    fn ensure_dir(&self, path: &Path, owner: Option<&str>) -> FsResult<()>;

    fn exists(&self, path: &Path) -> bool;

    /// Move a file by rename. Never copies: a rename either fully happens
    /// or not at all, so there is no partial-file window.
    fn move_file(&self, from: &Path, to: &Path) -> FsResult<()>;

    /// Remove a directory tree. Succeeds if the path is already absent.
    fn remove_dir_all(&self, path: &Path) -> FsResult<()>;
}

/// Production implementation backed by std::fs and chown.
#[derive(Debug, Default)]
pub struct LocalFs;

impl LocalFs {
    pub fn new() -> Self {
        LocalFs
    }

    fn chown(path: &Path, owner: &str) -> FsResult<()> {
        let output = Command::new("chown")
            .arg(format!("{owner}:{owner}"))
            .arg(path)
            .output()?;
        if !output.status.success() {
            return Err(FsError::UnknownUser {
                user: owner.to_string(),
            });
        }
        Ok(())
    }
}

impl FsOps for LocalFs {
    fn ensure_dir(&self, path: &Path, owner: Option<&str>) -> FsResult<()> {
        if path.exists() {
            if path.is_dir() {
                debug!(path = %path.display(), "directory already exists");
                return Ok(());
            }
            return Err(FsError::NotADirectory {
                path: path.display().to_string(),
            });
        }

        std::fs::create_dir_all(path).map_err(|err| map_io_error(err, path))?;
        if let Some(owner) = owner {
            Self::chown(path, owner)?;
        }
        debug!(path = %path.display(), "created directory");
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn move_file(&self, from: &Path, to: &Path) -> FsResult<()> {
        std::fs::rename(from, to).map_err(|err| map_io_error(err, from))
    }

    fn remove_dir_all(&self, path: &Path) -> FsResult<()> {
        if !path.exists() {
            return Ok(());
        }
        std::fs::remove_dir_all(path).map_err(|err| map_io_error(err, path))
    }
}

fn map_io_error(err: io::Error, path: &Path) -> FsError {
    match err.kind() {
        io::ErrorKind::PermissionDenied => FsError::PermissionDenied {
            path: path.display().to_string(),
        },
        _ => FsError::Io(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_dir_creates_and_tolerates_existing() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let dir = tmp.path().join("a/b/c");

        let fs = LocalFs::new();
        fs.ensure_dir(&dir, None).expect("create should succeed");
        assert!(dir.is_dir());

        // Second call is a no-op success
        fs.ensure_dir(&dir, None)
            .expect("existing directory should be tolerated");
    }

    #[test]
    fn test_ensure_dir_rejects_existing_file() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let path = tmp.path().join("occupied");
        std::fs::write(&path, "not a directory").expect("write should succeed");

        let err = LocalFs::new()
            .ensure_dir(&path, None)
            .expect_err("file in the way should fail");
        assert!(matches!(err, FsError::NotADirectory { .. }));
    }

    #[test]
    fn test_move_file_renames() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let from = tmp.path().join("old.db");
        let to = tmp.path().join("new.db");
        std::fs::write(&from, "database contents").expect("write should succeed");

        let fs = LocalFs::new();
        fs.move_file(&from, &to).expect("move should succeed");

        assert!(!from.exists());
        assert_eq!(
            std::fs::read_to_string(&to).expect("read should succeed"),
            "database contents"
        );
    }

    #[test]
    fn test_remove_dir_all_tolerates_absent() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let fs = LocalFs::new();
        fs.remove_dir_all(&tmp.path().join("never-created"))
            .expect("absent path should be a no-op success");
    }
}
