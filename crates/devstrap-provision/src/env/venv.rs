//! Python virtual environment creation and activation.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::ProvisionError;
use crate::process::run_captured;

const INTERPRETER_CANDIDATES: &[&str] = &["python3", "python"];

/// A virtual environment directory. Existence is judged by its interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Venv {
    dir: PathBuf,
}

impl Venv {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `bin/` on unix, `Scripts/` on Windows. Falls back to `bin/` before creation.
    pub fn bin_dir(&self) -> PathBuf {
        let scripts = self.dir.join("Scripts");
        if scripts.join("python.exe").exists() {
            scripts
        } else {
            self.dir.join("bin")
        }
    }

    pub fn python(&self) -> PathBuf {
        let bin = self.bin_dir();
        if bin.ends_with("Scripts") {
            bin.join("python.exe")
        } else {
            bin.join("python")
        }
    }

    pub fn exists(&self) -> bool {
        self.python().exists()
    }

    pub fn activation(&self) -> Activation {
        Activation::for_venv(self)
    }
}

/// The environment mutation `activate` performs, applied to child commands
/// instead of the current process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    set: Vec<(String, OsString)>,
    unset: Vec<String>,
}

impl Activation {
    fn for_venv(venv: &Venv) -> Self {
        let bin = venv.bin_dir();
        let mut paths = vec![bin];
        if let Some(existing) = std::env::var_os("PATH") {
            paths.extend(std::env::split_paths(&existing));
        }
        let path = std::env::join_paths(paths)
            .unwrap_or_else(|_| venv.bin_dir().into_os_string());
        Self {
            set: vec![
                (
                    "VIRTUAL_ENV".to_string(),
                    venv.dir().as_os_str().to_os_string(),
                ),
                ("PATH".to_string(), path),
            ],
            unset: vec!["PYTHONHOME".to_string()],
        }
    }

    pub fn apply(&self, cmd: &mut Command) {
        for key in &self.unset {
            cmd.env_remove(key);
        }
        for (key, value) in &self.set {
            cmd.env(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&OsString> {
        self.set.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

/// Resolve the interpreter used to create the venv: `preferred` if given
/// (name or path), else the first of `python3`, `python` on PATH.
pub fn find_interpreter(preferred: Option<&str>) -> Result<PathBuf, ProvisionError> {
    let candidates: Vec<&str> = match preferred {
        Some(p) => vec![p],
        None => INTERPRETER_CANDIDATES.to_vec(),
    };
    for name in &candidates {
        if let Ok(path) = which::which(name) {
            return Ok(path);
        }
    }
    Err(ProvisionError::InterpreterNotFound {
        tried: candidates.join(", "),
    })
}

/// `<interpreter> -m venv <dir>`.
pub fn create_venv(interpreter: &Path, venv: &Venv) -> Result<(), ProvisionError> {
    if let Some(parent) = venv.dir().parent() {
        if !parent.as_os_str().is_empty() {
            devstrap_fs::ensure_dir(parent)?;
        }
    }
    let mut cmd = Command::new(interpreter);
    cmd.arg("-m").arg("venv").arg(venv.dir());
    run_captured(&mut cmd)?;
    Ok(())
}
