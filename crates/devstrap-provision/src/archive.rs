//! Release archive extraction (zip, tar.gz, or a bare executable).

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use devstrap_core::manifest::ArchiveKind;

use crate::error::ProvisionError;

/// Extractor chosen for an archive kind. Both formats are read in-process,
/// so "installing the extraction utility" amounts to picking one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extractor {
    Zip,
    TarGz,
    /// Asset is already the executable; it is copied under the binary name.
    Passthrough,
}

impl Extractor {
    pub fn for_kind(kind: ArchiveKind) -> Self {
        match kind {
            ArchiveKind::Zip => Extractor::Zip,
            ArchiveKind::TarGz => Extractor::TarGz,
            ArchiveKind::Raw => Extractor::Passthrough,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Extractor::Zip => "built-in zip reader",
            Extractor::TarGz => "built-in gzip/tar reader",
            Extractor::Passthrough => "none (asset is the executable)",
        }
    }

    /// Extract `archive` into `dest`. Returns the paths of extracted files.
    /// `binary` is only used by [`Extractor::Passthrough`].
    pub fn extract(&self, archive: &Path, dest: &Path, binary: &str) -> Result<Vec<PathBuf>, ProvisionError> {
        devstrap_fs::ensure_dir(dest)?;
        match self {
            Extractor::Zip => extract_zip(archive, dest),
            Extractor::TarGz => extract_tar_gz(archive, dest),
            Extractor::Passthrough => {
                let out = dest.join(binary);
                if out.as_path() != archive {
                    fs::copy(archive, &out).map_err(|e| ProvisionError::io(&out, e))?;
                }
                Ok(vec![out])
            }
        }
    }
}

fn archive_err(path: &Path, reason: impl ToString) -> ProvisionError {
    ProvisionError::Archive {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Relative path with only normal components, or `None` if it would escape.
/// Names made of `.` alone (the archive root, e.g. `./`) yield an empty path.
fn safe_relative(name: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for c in name.components() {
        match c {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

fn extract_zip(archive: &Path, dest: &Path) -> Result<Vec<PathBuf>, ProvisionError> {
    let file = fs::File::open(archive).map_err(|e| ProvisionError::io(archive, e))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| archive_err(archive, e))?;
    let mut extracted = Vec::new();

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|e| archive_err(archive, e))?;
        let raw_name = entry.name().to_string();
        let rel = entry
            .enclosed_name()
            .and_then(safe_relative)
            .ok_or_else(|| ProvisionError::UnsafeEntry {
                entry: raw_name.clone(),
            })?;
        if rel.as_os_str().is_empty() {
            continue;
        }
        let out_path = dest.join(&rel);

        if entry.is_dir() {
            devstrap_fs::ensure_dir(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            devstrap_fs::ensure_dir(parent)?;
        }
        // Remove first so a running or read-only previous copy is replaced, not truncated.
        let _ = fs::remove_file(&out_path);
        let mut out_file = fs::File::create(&out_path).map_err(|e| ProvisionError::io(&out_path, e))?;
        io::copy(&mut entry, &mut out_file).map_err(|e| ProvisionError::io(&out_path, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&out_path, fs::Permissions::from_mode(mode & 0o777))
                    .map_err(|e| ProvisionError::io(&out_path, e))?;
            }
        }
        extracted.push(out_path);
    }
    Ok(extracted)
}

fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<Vec<PathBuf>, ProvisionError> {
    let file = fs::File::open(archive).map_err(|e| ProvisionError::io(archive, e))?;
    let mut tar = tar::Archive::new(flate2::read::GzDecoder::new(file));
    // Plain rwx bits only; setuid/setgid/sticky are dropped.
    tar.set_preserve_permissions(false);
    tar.set_overwrite(true);
    let mut extracted = Vec::new();

    let entries = tar.entries().map_err(|e| archive_err(archive, e))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| archive_err(archive, e))?;
        let name = entry
            .path()
            .map_err(|e| archive_err(archive, e))?
            .into_owned();
        let rel = safe_relative(&name).ok_or_else(|| ProvisionError::UnsafeEntry {
            entry: name.display().to_string(),
        })?;
        if rel.as_os_str().is_empty() {
            continue;
        }
        let is_file = entry.header().entry_type().is_file();
        let unpacked = entry.unpack_in(dest).map_err(|e| archive_err(archive, e))?;
        if !unpacked {
            return Err(ProvisionError::UnsafeEntry {
                entry: name.display().to_string(),
            });
        }
        if is_file {
            extracted.push(dest.join(rel));
        }
    }
    Ok(extracted)
}

/// Find the executable after extraction: `dest/<binary>` first, otherwise the
/// first extracted file with the same file name (archives often wrap their
/// contents in a versioned top-level directory).
pub fn locate_binary(dest: &Path, binary: &str, extracted: &[PathBuf]) -> Result<PathBuf, ProvisionError> {
    let direct = dest.join(binary);
    if direct.is_file() {
        return Ok(direct);
    }
    let wanted = Path::new(binary).file_name();
    extracted
        .iter()
        .find(|p| p.file_name() == wanted && p.is_file())
        .cloned()
        .ok_or_else(|| ProvisionError::BinaryNotFound {
            binary: binary.to_string(),
            dir: dest.to_path_buf(),
        })
}

/// Top-level entries of `extracted` relative to `dest`, for cleanup.
pub fn top_level_entries(dest: &Path, extracted: &[PathBuf]) -> Vec<PathBuf> {
    let mut tops: Vec<PathBuf> = extracted
        .iter()
        .filter_map(|p| p.strip_prefix(dest).ok())
        .filter_map(|rel| rel.components().next())
        .map(|c| dest.join(c.as_os_str()))
        .collect();
    tops.sort();
    tops.dedup();
    tops
}
