//! Config structs grouped by concern, loaded from the environment.

use super::env_keys::{http as http_keys, observability as obv_keys, paths as path_keys};
use super::loader::{env_bool, env_optional, env_or, env_u64};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MANIFEST_FILE: &str = "devstrap.yaml";

/// Manifest, install and cache locations. Every field is an override; `None`
/// means "use the manifest value or the built-in default".
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    pub manifest: Option<PathBuf>,
    pub install_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub workdir: Option<PathBuf>,
    pub python: Option<String>,
}

impl PathsConfig {
    pub fn from_env() -> Self {
        super::loader::load_dotenv();
        Self {
            manifest: env_optional(path_keys::DEVSTRAP_MANIFEST, &[]).map(PathBuf::from),
            install_dir: env_optional(path_keys::DEVSTRAP_INSTALL_DIR, &[]).map(PathBuf::from),
            cache_dir: env_optional(path_keys::DEVSTRAP_CACHE_DIR, &[]).map(PathBuf::from),
            workdir: env_optional(path_keys::DEVSTRAP_WORKDIR, &[]).map(PathBuf::from),
            python: env_optional(path_keys::DEVSTRAP_PYTHON, &[]),
        }
    }

    /// Manifest path: override, else `devstrap.yaml` in the current directory.
    pub fn manifest_path(&self) -> PathBuf {
        self.manifest
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MANIFEST_FILE))
    }
}

/// Release download settings
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: Duration,
    /// Extra attempts after the first one
    pub retries: u32,
    pub proxy: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retries: 3,
            proxy: None,
        }
    }
}

impl HttpConfig {
    pub fn from_env() -> Self {
        super::loader::load_dotenv();
        let defaults = Self::default();
        let retries = env_u64(http_keys::DEVSTRAP_HTTP_RETRIES, u64::from(defaults.retries));
        Self {
            timeout: Duration::from_secs(env_u64(
                http_keys::DEVSTRAP_HTTP_TIMEOUT_SECS,
                defaults.timeout.as_secs(),
            )),
            retries: u32::try_from(retries).unwrap_or(u32::MAX),
            proxy: env_optional(http_keys::PROXY_ALIASES[0], &http_keys::PROXY_ALIASES[1..]),
        }
    }
}

/// Logging: quiet, log_level, log_json
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub quiet: bool,
    pub log_level: String,
    pub log_json: bool,
}

impl ObservabilityConfig {
    pub fn from_env() -> &'static Self {
        use std::sync::OnceLock;
        static CACHE: OnceLock<ObservabilityConfig> = OnceLock::new();
        CACHE.get_or_init(|| {
            super::loader::load_dotenv();
            Self {
                quiet: env_bool(obv_keys::DEVSTRAP_QUIET, &[], false),
                log_level: env_or(obv_keys::DEVSTRAP_LOG_LEVEL, &[], || {
                    "devstrap=info".to_string()
                }),
                log_json: env_bool(obv_keys::DEVSTRAP_LOG_JSON, &[], false),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_defaults() {
        let cfg = PathsConfig::default();
        assert_eq!(cfg.manifest_path(), PathBuf::from("devstrap.yaml"));
        // No archive cache unless one is configured.
        assert!(cfg.cache_dir.is_none());
    }

    #[test]
    fn test_http_defaults() {
        let cfg = HttpConfig::default();
        assert_eq!(cfg.timeout, Duration::from_secs(30));
        assert_eq!(cfg.retries, 3);
    }
}
