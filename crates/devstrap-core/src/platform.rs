//! Host platform detection and release target matching.

use serde::{Deserialize, Serialize};
use std::fmt;

/// OS/arch pair a release archive was built for.
///
/// Names follow `std::env::consts` (`linux`, `macos`, `windows`; `x86_64`,
/// `aarch64`). Common aliases in release asset names (`amd64`, `arm64`,
/// `darwin`) are accepted when comparing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub os: String,
    pub arch: String,
}

impl Target {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    pub fn host() -> Self {
        Self::new(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// True if this target can run on `other` (alias-insensitive).
    pub fn matches(&self, other: &Target) -> bool {
        normalize_os(&self.os) == normalize_os(&other.os)
            && normalize_arch(&self.arch) == normalize_arch(&other.arch)
    }

    /// Executable file name for this target (`.exe` suffix on Windows).
    pub fn exe_name(&self, name: &str) -> String {
        if normalize_os(&self.os) == "windows" && !name.ends_with(".exe") {
            format!("{}.exe", name)
        } else {
            name.to_string()
        }
    }
}

impl Default for Target {
    fn default() -> Self {
        Self::new("linux", "x86_64")
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.arch, self.os)
    }
}

fn normalize_os(os: &str) -> String {
    match os.to_ascii_lowercase().as_str() {
        "darwin" | "apple" | "osx" => "macos".to_string(),
        "win" | "win32" | "win64" => "windows".to_string(),
        other => other.to_string(),
    }
}

fn normalize_arch(arch: &str) -> String {
    match arch.to_ascii_lowercase().as_str() {
        "amd64" | "x64" | "x86-64" => "x86_64".to_string(),
        "arm64" => "aarch64".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_matches_itself() {
        let host = Target::host();
        assert!(host.matches(&Target::host()));
    }

    #[test]
    fn test_aliases() {
        assert!(Target::new("darwin", "arm64").matches(&Target::new("macos", "aarch64")));
        assert!(Target::new("linux", "amd64").matches(&Target::new("linux", "x86_64")));
        assert!(!Target::new("linux", "x86_64").matches(&Target::new("linux", "aarch64")));
        assert!(!Target::new("linux", "x86_64").matches(&Target::new("macos", "x86_64")));
    }

    #[test]
    fn test_exe_name_and_display() {
        assert_eq!(Target::new("windows", "x86_64").exe_name("deno"), "deno.exe");
        assert_eq!(Target::new("linux", "x86_64").exe_name("deno"), "deno");
        assert_eq!(Target::default().to_string(), "x86_64-linux");
    }
}
