//! Post-install version check.

use std::path::Path;
use std::process::Command;

use crate::error::ProvisionError;
use crate::process::run_captured;

/// Run `<binary> <args>` and require the output to mention `expected`.
/// Returns the first output line containing the version (or the first line).
pub fn check_version(binary: &Path, args: &[String], expected: &str) -> Result<String, ProvisionError> {
    let output = version_output(binary, args)?;
    if !output.contains(expected) {
        return Err(ProvisionError::VersionMismatch {
            expected: expected.to_string(),
            output: output.trim().to_string(),
        });
    }
    Ok(summary_line(&output, expected))
}

/// Like [`check_version`] but never fails; used to decide whether an
/// existing install already satisfies the manifest.
pub fn installed_version(binary: &Path, args: &[String]) -> Option<String> {
    if !binary.is_file() {
        return None;
    }
    version_output(binary, args).ok()
}

fn version_output(binary: &Path, args: &[String]) -> Result<String, ProvisionError> {
    let mut cmd = Command::new(binary);
    cmd.args(args);
    let out = run_captured(&mut cmd)?;
    let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
    // Some tools print their version on stderr.
    text.push_str(&String::from_utf8_lossy(&out.stderr));
    Ok(text)
}

fn summary_line(output: &str, expected: &str) -> String {
    output
        .lines()
        .map(str::trim)
        .find(|l| l.contains(expected))
        .or_else(|| output.lines().map(str::trim).find(|l| !l.is_empty()))
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_line() {
        let out = "deno 2.5.6 (stable, release, x86_64-unknown-linux-gnu)\nv8 14.0\ntypescript 5.9\n";
        assert_eq!(
            summary_line(out, "2.5.6"),
            "deno 2.5.6 (stable, release, x86_64-unknown-linux-gnu)"
        );
        assert_eq!(summary_line("\n  x 1\n", "9"), "x 1");
    }

    #[cfg(unix)]
    fn fake_tool(dir: &Path, output: &str) -> std::path::PathBuf {
        let path = dir.join("tool");
        std::fs::write(&path, format!("#!/bin/sh\necho '{}'\n", output)).unwrap();
        devstrap_fs::set_executable(&path).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn test_check_version_match_and_mismatch() {
        let tmp = tempfile::tempdir().unwrap();
        let tool = fake_tool(tmp.path(), "tool 1.2.3");
        let args = vec!["--version".to_string()];
        assert_eq!(check_version(&tool, &args, "1.2.3").unwrap(), "tool 1.2.3");
        let err = check_version(&tool, &args, "2.0.0").unwrap_err();
        assert!(matches!(err, ProvisionError::VersionMismatch { .. }));
        assert_eq!(installed_version(&tool, &args).unwrap().trim(), "tool 1.2.3");
    }

    #[test]
    fn test_installed_version_of_missing_binary() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(installed_version(&tmp.path().join("nope"), &[]).is_none());
    }
}
