//! Environment variable loading helpers
//!
//! Keeps the primary-then-alias fallback chain in one place.

use std::env;
use std::path::Path;

/// Load `.env` from the current directory into the process environment.
/// Variables that are already set are never overridden. Runs once per process.
pub fn load_dotenv() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let dir = env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from("."));
        load_dotenv_from_dir(&dir);
    });
}

/// Load `<dir>/.env` (no-op if absent). Returns the number of variables set.
pub fn load_dotenv_from_dir(dir: &Path) -> usize {
    let Ok(content) = std::fs::read_to_string(dir.join(".env")) else {
        return 0;
    };
    let mut applied = 0;
    for (key, value) in parse_dotenv(&content) {
        if env::var(&key).is_err() {
            set_env_var(&key, &value);
            applied += 1;
        }
    }
    tracing::debug!(dir = %dir.display(), applied, "loaded .env");
    applied
}

/// Parse `KEY=value` lines. Comments, blank lines and `export ` prefixes are
/// handled; surrounding quotes are stripped; `#` after an unquoted value
/// starts a comment.
pub(crate) fn parse_dotenv(content: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some(eq_pos) = line.find('=') else {
            continue;
        };
        let key = line[..eq_pos].trim();
        let mut value = line[eq_pos + 1..].trim();
        if let Some(hash_pos) = value.find('#') {
            let before_hash = value[..hash_pos].trim_end();
            if !before_hash.contains('"') && !before_hash.contains('\'') {
                value = before_hash;
            }
        }
        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            value = &value[1..value.len() - 1];
        }
        if !key.is_empty() {
            out.push((key.to_string(), value.to_string()));
        }
    }
    out
}

/// Read the primary variable or the first set alias, falling back to `default`.
pub fn env_or<F>(primary: &str, aliases: &[&str], default: F) -> String
where
    F: FnOnce() -> String,
{
    env::var(primary)
        .ok()
        .or_else(|| aliases.iter().find_map(|a| env::var(a).ok()))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(default)
}

/// Read the primary variable or an alias; empty values count as unset.
pub fn env_optional(primary: &str, aliases: &[&str]) -> Option<String> {
    env::var(primary)
        .ok()
        .or_else(|| aliases.iter().find_map(|a| env::var(a).ok()))
        .and_then(|s| {
            let s = s.trim().to_string();
            if s.is_empty() {
                None
            } else {
                Some(s)
            }
        })
}

/// Boolean variable: 0/false/no/off are false, anything else set is true.
pub fn env_bool(primary: &str, aliases: &[&str], default: bool) -> bool {
    let v = env::var(primary)
        .ok()
        .or_else(|| aliases.iter().find_map(|a| env::var(a).ok()));
    match v.as_deref() {
        Some(s) => !matches!(
            s.trim().to_lowercase().as_str(),
            "0" | "false" | "no" | "off"
        ),
        None => default,
    }
}

/// Numeric variable; unparsable values fall back to `default`.
pub fn env_u64(primary: &str, default: u64) -> u64 {
    env_optional(primary, &[])
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(default)
}

// SAFETY contract: only called from `load_dotenv*`, which runs on the main
// thread before any worker or child process is started.
#[allow(unsafe_code)]
fn set_env_var(key: &str, value: &str) {
    unsafe { env::set_var(key, value) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dotenv_quotes_and_comments() {
        let parsed = parse_dotenv(
            "# comment\n\nA=1\nexport B=\"two words\"\nC='x' \nD=plain # trailing\nbroken line\n",
        );
        assert_eq!(
            parsed,
            vec![
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "two words".to_string()),
                ("C".to_string(), "x".to_string()),
                ("D".to_string(), "plain".to_string()),
            ]
        );
    }

    #[test]
    fn test_env_bool_and_optional_defaults() {
        assert!(env_bool("DEVSTRAP_TEST_UNSET_BOOL_KEY", &[], true));
        assert!(!env_bool("DEVSTRAP_TEST_UNSET_BOOL_KEY", &[], false));
        assert_eq!(env_optional("DEVSTRAP_TEST_UNSET_OPT_KEY", &[]), None);
        assert_eq!(
            env_or("DEVSTRAP_TEST_UNSET_OR_KEY", &[], || "fallback".to_string()),
            "fallback"
        );
        assert_eq!(env_u64("DEVSTRAP_TEST_UNSET_NUM_KEY", 7), 7);
    }

    #[test]
    fn test_dotenv_does_not_override_existing() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(".env"),
            "DEVSTRAP_TEST_DOTENV_NEW=from-file\nPATH=clobbered\n",
        )
        .unwrap();
        let applied = load_dotenv_from_dir(tmp.path());
        assert_eq!(applied, 1);
        assert_eq!(env::var("DEVSTRAP_TEST_DOTENV_NEW").unwrap(), "from-file");
        assert_ne!(env::var("PATH").unwrap(), "clobbered");
    }
}
