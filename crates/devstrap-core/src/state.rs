//! Provisioning receipt persisted at `<workdir>/.devstrap/state.json`.
//!
//! The receipt only informs convergence decisions and `devstrap status`.
//! Deleting it never breaks anything; the next run simply redoes the steps
//! it cannot prove are satisfied.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const STATE_DIR: &str = ".devstrap";
const STATE_FILE_NAME: &str = "state.json";
const STATE_VERSION: u32 = 1;

/// Recorded after a successful requirements install.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementsReceipt {
    pub path: PathBuf,
    pub sha256: String,
    pub venv_dir: PathBuf,
    pub installed_at: DateTime<Utc>,
}

/// Recorded after the tool passed its version check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolReceipt {
    pub name: String,
    pub version: String,
    pub url: String,
    pub path: PathBuf,
    /// SHA-256 of the installed executable.
    pub sha256: String,
    /// First line of the version check output.
    pub reported_version: String,
    pub installed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateFile {
    pub version: u32,
    #[serde(default)]
    pub requirements: Option<RequirementsReceipt>,
    #[serde(default)]
    pub tool: Option<ToolReceipt>,
    /// Downloaded archive and extracted top-level entries in the workdir.
    #[serde(default)]
    pub artifacts: Vec<PathBuf>,
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            requirements: None,
            tool: None,
            artifacts: Vec::new(),
            last_run: None,
        }
    }
}

pub fn state_dir(workdir: &Path) -> PathBuf {
    workdir.join(STATE_DIR)
}

pub fn state_path(workdir: &Path) -> PathBuf {
    state_dir(workdir).join(STATE_FILE_NAME)
}

/// Load the receipt; a missing file yields an empty one.
pub fn load_state(workdir: &Path) -> Result<StateFile> {
    let path = state_path(workdir);
    if !path.exists() {
        return Ok(StateFile::default());
    }
    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read state file: {}", path.display()))?;
    let state: StateFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse state file: {}", path.display()))?;
    if state.version != STATE_VERSION {
        anyhow::bail!(
            "Unsupported state file version {} in {} (expected {})",
            state.version,
            path.display(),
            STATE_VERSION
        );
    }
    Ok(state)
}

pub fn save_state(workdir: &Path, state: &StateFile) -> Result<()> {
    let path = state_path(workdir);
    let data = serde_json::to_string_pretty(state)?;
    devstrap_fs::atomic_write(&path, data.as_bytes())
        .with_context(|| format!("Failed to write state file: {}", path.display()))?;
    Ok(())
}

/// Load, apply `f`, stamp `last_run`, save.
pub fn update_state<F>(workdir: &Path, f: F) -> Result<StateFile>
where
    F: FnOnce(&mut StateFile),
{
    let mut state = load_state(workdir)?;
    f(&mut state);
    state.last_run = Some(Utc::now());
    save_state(workdir, &state)?;
    Ok(state)
}

/// SHA-256 of a file's content as lowercase hex.
pub fn file_sha256(path: &Path) -> Result<String> {
    use sha2::{Digest, Sha256};
    use std::io::Read;

    let mut file = fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_state_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let state = load_state(tmp.path()).unwrap();
        assert_eq!(state, StateFile::default());
    }

    #[test]
    fn test_update_persists_receipts() {
        let tmp = tempfile::tempdir().unwrap();
        update_state(tmp.path(), |s| {
            s.requirements = Some(RequirementsReceipt {
                path: PathBuf::from("requirements.txt"),
                sha256: "ab".repeat(32),
                venv_dir: PathBuf::from("venv"),
                installed_at: Utc::now(),
            });
        })
        .unwrap();

        let loaded = load_state(tmp.path()).unwrap();
        assert_eq!(loaded.requirements.unwrap().sha256, "ab".repeat(32));
        assert!(loaded.tool.is_none());
        assert!(loaded.last_run.is_some());
    }

    #[test]
    fn test_corrupt_state_names_path() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(state_dir(tmp.path())).unwrap();
        fs::write(state_path(tmp.path()), "{not json").unwrap();
        let err = load_state(tmp.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("state.json"));
    }

    #[test]
    fn test_file_sha256() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("f");
        fs::write(&path, b"abc").unwrap();
        assert_eq!(
            file_sha256(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
