//! Make the extracted binary executable and move it onto the search path.

use std::path::{Path, PathBuf};

use devstrap_fs::FsError;

use crate::error::ProvisionError;

pub fn mark_executable(path: &Path) -> Result<(), ProvisionError> {
    devstrap_fs::set_executable(path)?;
    Ok(())
}

/// Move `binary` to `<install_dir>/<name>`, replacing any previous copy.
pub fn install_binary(binary: &Path, install_dir: &Path, name: &str) -> Result<PathBuf, ProvisionError> {
    let dest = install_dir.join(name);
    devstrap_fs::ensure_dir(install_dir).map_err(|e| install_err(e, install_dir))?;
    devstrap_fs::move_file(binary, &dest).map_err(|e| install_err(e, install_dir))?;
    if !is_on_path(install_dir) {
        tracing::warn!(
            dir = %install_dir.display(),
            "install directory is not on PATH; '{}' will not be found by name",
            name
        );
    }
    Ok(dest)
}

fn install_err(source: FsError, install_dir: &Path) -> ProvisionError {
    let hint = if source.is_permission_denied() {
        format!(
            " (no write access to {}; rerun with elevated privileges or set DEVSTRAP_INSTALL_DIR / --install-dir to a writable directory)",
            install_dir.display()
        )
    } else {
        String::new()
    };
    ProvisionError::Install { source, hint }
}

/// True if `dir` is one of the entries of `PATH`.
pub fn is_on_path(dir: &Path) -> bool {
    let Some(path) = std::env::var_os("PATH") else {
        return false;
    };
    let wanted = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
    std::env::split_paths(&path).any(|p| {
        let p = p.canonicalize().unwrap_or(p);
        p == wanted
    })
}
