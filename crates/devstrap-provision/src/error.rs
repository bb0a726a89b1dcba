use std::path::PathBuf;

use devstrap_core::manifest::ManifestError;
use devstrap_core::platform::Target;
use devstrap_fs::FsError;
use thiserror::Error;

use crate::env::requirements::RequirementsError;
use crate::step::Step;

/// Failure of a single provisioning operation.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("release targets {wanted} but this host is {host}")]
    UnsupportedTarget { wanted: Target, host: Target },

    #[error("no Python interpreter found (tried: {tried})")]
    InterpreterNotFound { tried: String },

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} exited with {}: {stderr}", exit_desc(.status))]
    CommandFailed {
        program: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error(transparent)]
    Requirements(#[from] RequirementsError),

    #[error("download of {url} failed: {reason}")]
    Download { url: String, reason: String },

    #[error("download of {url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("checksum mismatch for {url}: expected sha256 {expected}, got {actual}")]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("failed to read archive {path}: {reason}")]
    Archive { path: PathBuf, reason: String },

    #[error("archive entry '{entry}' escapes the extraction directory")]
    UnsafeEntry { entry: String },

    #[error("binary '{binary}' not found in extracted archive under {dir}")]
    BinaryNotFound { binary: String, dir: PathBuf },

    #[error("{source}{hint}")]
    Install { source: FsError, hint: String },

    #[error(transparent)]
    Fs(#[from] FsError),

    #[error("version check expected '{expected}' but the tool reported: {output}")]
    VersionMismatch { expected: String, output: String },

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("{0} was not produced by an earlier step")]
    MissingInput(&'static str),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ProvisionError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ProvisionError::Io {
            path: path.into(),
            source,
        }
    }
}

fn exit_desc(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

/// Why a pipeline run stopped.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Checked before step 1; nothing ran.
    #[error("preflight check failed")]
    Preflight(#[source] ProvisionError),

    /// A step failed; later steps did not run.
    #[error("step {step} failed")]
    Step {
        step: Step,
        #[source]
        source: ProvisionError,
    },
}

impl PipelineError {
    pub fn new(step: Step, source: ProvisionError) -> Self {
        PipelineError::Step { step, source }
    }

    pub fn step(&self) -> Option<Step> {
        match self {
            PipelineError::Preflight(_) => None,
            PipelineError::Step { step, .. } => Some(*step),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_command_failed_message() {
        let err = ProvisionError::CommandFailed {
            program: "pip".to_string(),
            status: Some(1),
            stderr: "no matching distribution".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "pip exited with status 1: no matching distribution"
        );
        let signalled = ProvisionError::CommandFailed {
            program: "pip".to_string(),
            status: None,
            stderr: String::new(),
        };
        assert!(signalled.to_string().contains("a signal"));
    }

    #[test]
    fn test_pipeline_error_chains_source() {
        let err = PipelineError::new(
            Step::FetchArchive,
            ProvisionError::HttpStatus {
                url: "https://example.com/a.zip".to_string(),
                status: 404,
            },
        );
        assert_eq!(err.to_string(), "step [4/9] fetch release archive failed");
        assert_eq!(err.step(), Some(Step::FetchArchive));
        assert!(err.source().unwrap().to_string().contains("HTTP 404"));
    }
}
