//! Child process helpers shared by the venv, pip and version-check steps.

use std::process::{Command, Output};

use crate::error::ProvisionError;

/// Longest stderr tail kept in error messages.
const STDERR_TAIL: usize = 2000;

/// Run `cmd` to completion, capturing output. Non-zero exit is an error
/// carrying the tail of stderr.
pub fn run_captured(cmd: &mut Command) -> Result<Output, ProvisionError> {
    let program = program_name(cmd);
    tracing::debug!(command = %describe(cmd), "running");
    let out = cmd.output().map_err(|source| ProvisionError::Spawn {
        program: program.clone(),
        source,
    })?;
    if !out.status.success() {
        return Err(ProvisionError::CommandFailed {
            program,
            status: out.status.code(),
            stderr: tail(&String::from_utf8_lossy(&out.stderr), STDERR_TAIL),
        });
    }
    Ok(out)
}

/// Space-joined program and arguments, for logs.
pub fn describe(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|s| s.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

fn program_name(cmd: &Command) -> String {
    let program = std::path::Path::new(cmd.get_program());
    program
        .file_name()
        .unwrap_or(program.as_os_str())
        .to_string_lossy()
        .into_owned()
}

fn tail(s: &str, max: usize) -> String {
    let s = s.trim();
    if s.len() <= max {
        return s.to_string();
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &s[start..])
}
