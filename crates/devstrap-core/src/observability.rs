//! Observability: tracing init.
//!
//! Uses config::ObservabilityConfig for DEVSTRAP_QUIET, DEVSTRAP_LOG_LEVEL, DEVSTRAP_LOG_JSON.
//! `RUST_LOG` takes precedence over both when set.

use tracing_subscriber::{prelude::*, EnvFilter};

use crate::config::ObservabilityConfig;

/// Tracing initialization mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TracingMode {
    /// Use DEVSTRAP_LOG_LEVEL / DEVSTRAP_QUIET from env
    Default,
    /// `--quiet` on the command line: warnings and errors only
    Quiet,
    /// `--verbose` on the command line: debug for devstrap crates
    Verbose,
}

/// Filter directive for the given mode and config.
pub fn filter_directive(mode: TracingMode, cfg: &ObservabilityConfig) -> String {
    match mode {
        TracingMode::Quiet => "devstrap=warn".to_string(),
        TracingMode::Verbose => "devstrap=debug".to_string(),
        TracingMode::Default if cfg.quiet => "devstrap=warn".to_string(),
        TracingMode::Default => cfg.log_level.clone(),
    }
}

/// Initialize tracing. Call once at process startup; later calls are ignored.
/// Logs go to stderr so stdout stays clean for command output.
pub fn init_tracing(mode: TracingMode) {
    let cfg = ObservabilityConfig::from_env();
    let level = filter_directive(mode, cfg);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

    let _ = if cfg.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .try_init()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(quiet: bool) -> ObservabilityConfig {
        ObservabilityConfig {
            quiet,
            log_level: "devstrap=trace".to_string(),
            log_json: false,
        }
    }

    #[test]
    fn test_filter_directive() {
        assert_eq!(filter_directive(TracingMode::Default, &cfg(false)), "devstrap=trace");
        assert_eq!(filter_directive(TracingMode::Default, &cfg(true)), "devstrap=warn");
        assert_eq!(filter_directive(TracingMode::Quiet, &cfg(false)), "devstrap=warn");
        assert_eq!(filter_directive(TracingMode::Verbose, &cfg(true)), "devstrap=debug");
    }
}
