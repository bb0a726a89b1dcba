//! Provisioning manifest: the desired state the pipeline converges to.
//!
//! The manifest is YAML (`devstrap.yaml`). When no file exists the built-in
//! manifest is used, which pins the environment this tool was written for:
//! a `venv` with `requirements.txt` installed, plus the deno release binary
//! in `/usr/local/bin`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::platform::Target;

pub const DEFAULT_VENV_DIR: &str = "venv";
pub const DEFAULT_REQUIREMENTS: &str = "requirements.txt";
pub const DEFAULT_INSTALL_DIR: &str = "/usr/local/bin";

const BUILTIN_TOOL: &str = "deno";
const BUILTIN_VERSION: &str = "2.5.6";
const BUILTIN_URL: &str =
    "https://github.com/denoland/deno/releases/download/v{version}/deno-x86_64-unknown-linux-gnu.zip";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse manifest {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid manifest field '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("failed to serialize manifest: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

/// Archive format of the release asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveKind {
    #[serde(rename = "zip")]
    Zip,
    #[serde(rename = "tar.gz", alias = "tgz")]
    TarGz,
    /// The asset is the executable itself.
    #[serde(rename = "raw")]
    Raw,
}

impl ArchiveKind {
    /// Infer from the asset file name; unknown suffixes are treated as raw.
    pub fn from_file_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".zip") {
            ArchiveKind::Zip
        } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            ArchiveKind::TarGz
        } else {
            ArchiveKind::Raw
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveKind::Zip => "zip",
            ArchiveKind::TarGz => "tar.gz",
            ArchiveKind::Raw => "raw",
        }
    }
}

/// Python virtual environment section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PythonEnv {
    #[serde(default = "default_venv_dir")]
    pub venv_dir: PathBuf,
    #[serde(default = "default_requirements")]
    pub requirements: PathBuf,
    /// Interpreter used to create the venv; `python3`/`python` from PATH when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<String>,
}

impl Default for PythonEnv {
    fn default() -> Self {
        Self {
            venv_dir: default_venv_dir(),
            requirements: default_requirements(),
            interpreter: None,
        }
    }
}

/// Pinned release binary section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolRelease {
    pub name: String,
    /// Release version without the leading `v`, e.g. `2.5.6`.
    pub version: String,
    /// Download URL. `{version}` is replaced with `version`.
    pub url: String,
    /// Expected SHA-256 of the downloaded asset (lowercase hex).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    /// Inferred from the URL when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<ArchiveKind>,
    /// Path of the executable inside the archive; defaults to the tool name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<String>,
    #[serde(default = "default_install_dir")]
    pub install_dir: PathBuf,
    #[serde(default = "default_version_args")]
    pub version_args: Vec<String>,
    #[serde(default)]
    pub target: Target,
}

impl ToolRelease {
    pub fn resolved_url(&self) -> String {
        self.url.replace("{version}", &self.version)
    }

    /// Last path segment of the URL, without query string.
    pub fn asset_file_name(&self) -> String {
        let url = self.resolved_url();
        let path = url.split(['?', '#']).next().unwrap_or(&url);
        path.rsplit('/')
            .find(|s| !s.is_empty())
            .unwrap_or(self.name.as_str())
            .to_string()
    }

    pub fn archive_kind(&self) -> ArchiveKind {
        self.archive
            .unwrap_or_else(|| ArchiveKind::from_file_name(&self.asset_file_name()))
    }

    /// Relative path of the executable inside the extracted archive.
    pub fn binary_path(&self) -> String {
        self.binary
            .clone()
            .unwrap_or_else(|| self.target.exe_name(&self.name))
    }

    /// File name the binary is installed under.
    pub fn installed_name(&self) -> String {
        self.target.exe_name(&self.name)
    }

    pub fn install_path(&self) -> PathBuf {
        self.install_dir.join(self.installed_name())
    }

    /// Version string the version check must report.
    pub fn expected_version(&self) -> &str {
        self.version.strip_prefix('v').unwrap_or(&self.version)
    }
}

/// Full desired state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Directory the archive is downloaded and extracted into.
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,
    /// Omit to skip the venv and requirements steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python: Option<PythonEnv>,
    pub tool: ToolRelease,
}

/// Where a loaded manifest came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestSource {
    File(PathBuf),
    Builtin,
}

impl std::fmt::Display for ManifestSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManifestSource::File(p) => write!(f, "{}", p.display()),
            ManifestSource::Builtin => write!(f, "built-in defaults"),
        }
    }
}

impl Manifest {
    /// The hard-coded environment: venv + requirements.txt + deno for linux x86_64.
    pub fn builtin() -> Self {
        Self {
            workdir: default_workdir(),
            python: Some(PythonEnv::default()),
            tool: ToolRelease {
                name: BUILTIN_TOOL.to_string(),
                version: BUILTIN_VERSION.to_string(),
                url: BUILTIN_URL.to_string(),
                sha256: None,
                archive: Some(ArchiveKind::Zip),
                binary: None,
                install_dir: default_install_dir(),
                version_args: default_version_args(),
                target: Target::new("linux", "x86_64"),
            },
        }
    }

    pub fn from_yaml_str(raw: &str, path: &Path) -> Result<Self, ManifestError> {
        let manifest: Manifest =
            serde_yaml::from_str(raw).map_err(|source| ManifestError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let raw = fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&raw, path)
    }

    /// Load `path` if it exists, otherwise fall back to [`Manifest::builtin`].
    pub fn load_or_builtin(path: &Path) -> Result<(Self, ManifestSource), ManifestError> {
        if path.exists() {
            let manifest = Self::load(path)?;
            Ok((manifest, ManifestSource::File(path.to_path_buf())))
        } else {
            tracing::debug!(path = %path.display(), "no manifest file, using built-in defaults");
            Ok((Self::builtin(), ManifestSource::Builtin))
        }
    }

    pub fn to_yaml(&self) -> Result<String, ManifestError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), ManifestError> {
        let tool = &self.tool;
        if tool.name.trim().is_empty() {
            return Err(invalid("tool.name", "must not be empty"));
        }
        if tool.name.contains(['/', '\\']) {
            return Err(invalid("tool.name", "must be a bare file name"));
        }
        if tool.expected_version().trim().is_empty() {
            return Err(invalid("tool.version", "must not be empty"));
        }
        let url = tool.resolved_url();
        if !(url.starts_with("https://") || url.starts_with("http://") || url.starts_with("file://"))
        {
            return Err(invalid(
                "tool.url",
                format!("unsupported scheme in '{}' (expected http, https or file)", url),
            ));
        }
        if let Some(ref sha) = tool.sha256 {
            if !is_sha256_hex(sha) {
                return Err(invalid("tool.sha256", "expected 64 hex characters"));
            }
        }
        if let Some(ref bin) = tool.binary {
            let p = Path::new(bin);
            if bin.is_empty()
                || p.is_absolute()
                || p.components()
                    .any(|c| matches!(c, std::path::Component::ParentDir))
            {
                return Err(invalid(
                    "tool.binary",
                    "must be a relative path inside the archive",
                ));
            }
        }
        if tool.version_args.is_empty() {
            return Err(invalid("tool.version_args", "must contain at least one argument"));
        }
        if let Some(ref py) = self.python {
            if py.venv_dir.as_os_str().is_empty() {
                return Err(invalid("python.venv_dir", "must not be empty"));
            }
        }
        Ok(())
    }

    /// Resolve a manifest-relative path against `workdir`.
    pub fn in_workdir(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workdir.join(path)
        }
    }
}

pub fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit())
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ManifestError {
    ManifestError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn default_workdir() -> PathBuf {
    PathBuf::from(".")
}

fn default_venv_dir() -> PathBuf {
    PathBuf::from(DEFAULT_VENV_DIR)
}

fn default_requirements() -> PathBuf {
    PathBuf::from(DEFAULT_REQUIREMENTS)
}

fn default_install_dir() -> PathBuf {
    PathBuf::from(DEFAULT_INSTALL_DIR)
}

fn default_version_args() -> Vec<String> {
    vec!["--version".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_pins_deno_release() {
        let m = Manifest::builtin();
        m.validate().unwrap();
        assert_eq!(
            m.tool.resolved_url(),
            "https://github.com/denoland/deno/releases/download/v2.5.6/deno-x86_64-unknown-linux-gnu.zip"
        );
        assert_eq!(m.tool.asset_file_name(), "deno-x86_64-unknown-linux-gnu.zip");
        assert_eq!(m.tool.archive_kind(), ArchiveKind::Zip);
        assert_eq!(m.tool.install_path(), PathBuf::from("/usr/local/bin/deno"));
        assert_eq!(m.python.as_ref().unwrap().venv_dir, PathBuf::from("venv"));
    }

    #[test]
    fn test_minimal_yaml_fills_defaults() {
        let raw = "tool:\n  name: rg\n  version: v14.1.0\n  url: https://example.com/rg-{version}.tar.gz\n";
        let m = Manifest::from_yaml_str(raw, Path::new("devstrap.yaml")).unwrap();
        assert!(m.python.is_none());
        assert_eq!(m.tool.expected_version(), "14.1.0");
        assert_eq!(m.tool.resolved_url(), "https://example.com/rg-v14.1.0.tar.gz");
        assert_eq!(m.tool.archive_kind(), ArchiveKind::TarGz);
        assert_eq!(m.tool.version_args, vec!["--version"]);
        assert_eq!(m.workdir, PathBuf::from("."));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let raw = "tool:\n  name: x\n  version: '1'\n  url: https://e/x\n  colour: blue\n";
        let err = Manifest::from_yaml_str(raw, Path::new("m.yaml")).unwrap_err();
        assert!(matches!(err, ManifestError::Parse { .. }));
    }

    #[test]
    fn test_validation_failures() {
        let mut m = Manifest::builtin();
        m.tool.url = "ftp://example.com/x.zip".to_string();
        assert!(matches!(
            m.validate(),
            Err(ManifestError::Invalid { field: "tool.url", .. })
        ));

        let mut m = Manifest::builtin();
        m.tool.sha256 = Some("abc".to_string());
        assert!(matches!(
            m.validate(),
            Err(ManifestError::Invalid { field: "tool.sha256", .. })
        ));

        let mut m = Manifest::builtin();
        m.tool.binary = Some("../escape".to_string());
        assert!(matches!(
            m.validate(),
            Err(ManifestError::Invalid { field: "tool.binary", .. })
        ));
    }

    #[test]
    fn test_yaml_roundtrip_of_builtin() {
        let m = Manifest::builtin();
        let yaml = m.to_yaml().unwrap();
        assert!(yaml.contains("archive: zip"));
        let back = Manifest::from_yaml_str(&yaml, Path::new("devstrap.yaml")).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn test_load_or_builtin() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("devstrap.yaml");
        let (_, source) = Manifest::load_or_builtin(&path).unwrap();
        assert_eq!(source, ManifestSource::Builtin);

        fs::write(
            &path,
            "tool:\n  name: t\n  version: '1.0'\n  url: file:///tmp/t\n",
        )
        .unwrap();
        let (m, source) = Manifest::load_or_builtin(&path).unwrap();
        assert_eq!(source, ManifestSource::File(path.clone()));
        assert_eq!(m.tool.archive_kind(), ArchiveKind::Raw);
    }

    #[test]
    fn test_asset_name_strips_query() {
        let mut m = Manifest::builtin();
        m.tool.url = "https://e.com/dl/tool.zip?token=1".to_string();
        assert_eq!(m.tool.asset_file_name(), "tool.zip");
    }
}
