//! Environment variable key constants.
//!
//! Primary variables use the `DEVSTRAP_*` prefix.

/// Manifest, install and cache locations
pub mod paths {
    pub const DEVSTRAP_MANIFEST: &str = "DEVSTRAP_MANIFEST";
    pub const DEVSTRAP_INSTALL_DIR: &str = "DEVSTRAP_INSTALL_DIR";
    pub const DEVSTRAP_CACHE_DIR: &str = "DEVSTRAP_CACHE_DIR";
    pub const DEVSTRAP_WORKDIR: &str = "DEVSTRAP_WORKDIR";
    /// Interpreter used to create the venv
    pub const DEVSTRAP_PYTHON: &str = "DEVSTRAP_PYTHON";
}

/// Release download behaviour
pub mod http {
    pub const DEVSTRAP_HTTP_TIMEOUT_SECS: &str = "DEVSTRAP_HTTP_TIMEOUT_SECS";
    pub const DEVSTRAP_HTTP_RETRIES: &str = "DEVSTRAP_HTTP_RETRIES";
    /// Standard proxy variables honoured for release downloads.
    pub const PROXY_ALIASES: &[&str] = &["HTTPS_PROXY", "https_proxy", "ALL_PROXY"];
}

/// Logging
pub mod observability {
    pub const DEVSTRAP_QUIET: &str = "DEVSTRAP_QUIET";
    pub const DEVSTRAP_LOG_LEVEL: &str = "DEVSTRAP_LOG_LEVEL";
    pub const DEVSTRAP_LOG_JSON: &str = "DEVSTRAP_LOG_JSON";
}
