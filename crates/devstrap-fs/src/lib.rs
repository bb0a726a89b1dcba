//! Filesystem primitives used by the provisioning steps.
//!
//! Every fallible operation returns [`FsError`] carrying the path that failed,
//! so callers can surface a useful message without re-wrapping.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to move {from} to {to}: {source}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    #[error("failed to set permissions on {path}: {source}")]
    Permissions { path: PathBuf, source: io::Error },

    #[error("path has no parent directory: {0}")]
    NoParent(PathBuf),
}

impl FsError {
    /// True when the underlying OS error is a permission failure.
    pub fn is_permission_denied(&self) -> bool {
        let source = match self {
            FsError::CreateDir { source, .. }
            | FsError::Write { source, .. }
            | FsError::Move { source, .. }
            | FsError::Permissions { source, .. } => source,
            FsError::NoParent(_) => return false,
        };
        source.kind() == io::ErrorKind::PermissionDenied
    }
}

pub type Result<T> = std::result::Result<T, FsError>;

/// Create `dir` and all parents.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|source| FsError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })
}

/// Write `contents` to `path` through a sibling temp file, then rename over
/// the destination. Readers never observe a half-written file.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    use std::io::Write;

    let parent = parent_of(path)?;
    ensure_dir(parent)?;
    let write_err = |source| FsError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(write_err)?;
    tmp.write_all(contents).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// Move `from` to `to`, replacing any existing file at `to`.
///
/// Tries a plain rename first. When source and destination live on different
/// filesystems the file is copied next to the destination and renamed into
/// place, then the source is removed.
pub fn move_file(from: &Path, to: &Path) -> Result<()> {
    let move_err = |source| FsError::Move {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };
    let parent = parent_of(to)?;
    ensure_dir(parent)?;

    match fs::rename(from, to) {
        Ok(()) => return Ok(()),
        Err(e) if is_cross_device(&e) => {}
        Err(e) => return Err(move_err(e)),
    }

    let staged = staging_name(to);
    fs::copy(from, &staged).map_err(move_err)?;
    if let Err(e) = fs::rename(&staged, to) {
        let _ = fs::remove_file(&staged);
        return Err(move_err(e));
    }
    fs::remove_file(from).map_err(move_err)?;
    Ok(())
}

/// Set mode 0o755 on unix. No-op elsewhere.
pub fn set_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o755);
        fs::set_permissions(path, perms).map_err(|source| FsError::Permissions {
            path: path.to_path_buf(),
            source,
        })?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// True if `path` is a regular file with any execute bit set (unix), or
/// simply exists (elsewhere).
pub fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::metadata(path)
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

/// Total size in bytes of all files under `path`. Unreadable entries count as zero.
pub fn dir_size(path: &Path) -> u64 {
    if path.is_file() {
        return fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    }
    walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Format byte size to human-readable string.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

fn parent_of(path: &Path) -> Result<&Path> {
    match path.parent() {
        Some(p) if p.as_os_str().is_empty() => Ok(Path::new(".")),
        Some(p) => Ok(p),
        None => Err(FsError::NoParent(path.to_path_buf())),
    }
}

fn staging_name(to: &Path) -> PathBuf {
    let name = to
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    to.with_file_name(format!(".{}.devstrap-tmp", name))
}

fn is_cross_device(e: &io::Error) -> bool {
    // EXDEV is 18 on Linux and macOS; Windows reports ERROR_NOT_SAME_DEVICE (17).
    #[cfg(unix)]
    {
        e.raw_os_error() == Some(18)
    }
    #[cfg(windows)]
    {
        e.raw_os_error() == Some(17)
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = e;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_write_creates_parents_and_replaces() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("state.json");
        atomic_write(&path, b"one").unwrap();
        atomic_write(&path, b"two").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "two");
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .flatten()
            .filter(|e| e.path() != path)
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_move_file_replaces_destination() {
        let tmp = tempfile::tempdir().unwrap();
        let from = tmp.path().join("deno");
        let to = tmp.path().join("bin").join("deno");
        fs::write(&from, b"new").unwrap();
        fs::create_dir_all(to.parent().unwrap()).unwrap();
        fs::write(&to, b"old").unwrap();

        move_file(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(fs::read(&to).unwrap(), b"new");
    }

    #[test]
    fn test_move_missing_source_fails_with_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let err = move_file(&tmp.path().join("absent"), &tmp.path().join("dest")).unwrap_err();
        assert!(err.to_string().contains("absent"));
        assert!(!err.is_permission_denied());
    }

    #[cfg(unix)]
    #[test]
    fn test_set_executable() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tool");
        fs::write(&path, b"#!/bin/sh\n").unwrap();
        assert!(!is_executable(&path));
        set_executable(&path).unwrap();
        assert!(is_executable(&path));
    }

    #[test]
    fn test_dir_size_sums_nested_files() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("a/b")).unwrap();
        fs::write(tmp.path().join("a/one"), vec![0u8; 10]).unwrap();
        fs::write(tmp.path().join("a/b/two"), vec![0u8; 5]).unwrap();
        assert_eq!(dir_size(tmp.path()), 15);
        assert_eq!(dir_size(&tmp.path().join("a/one")), 10);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }
}
