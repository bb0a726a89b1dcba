//! Subcommand implementations.
//!
//! Every command resolves the manifest the same way: CLI flag, then
//! `DEVSTRAP_*` environment, then `./devstrap.yaml`, then built-in defaults.

pub mod clean;
pub mod init;
pub mod status;
pub mod up;

use anyhow::{Context, Result};

use devstrap_core::config::{HttpConfig, PathsConfig};
use devstrap_core::manifest::{Manifest, ManifestSource};
use devstrap_provision::{Pipeline, PipelineOptions};

use crate::cli::ManifestArgs;

/// Manifest with the workdir override applied.
pub(crate) fn load_manifest(args: &ManifestArgs) -> Result<(Manifest, ManifestSource)> {
    let paths = PathsConfig::from_env();
    let path = args.manifest.clone().unwrap_or_else(|| paths.manifest_path());
    let (mut manifest, source) = Manifest::load_or_builtin(&path)
        .with_context(|| format!("Failed to load manifest {}", path.display()))?;
    if let Some(dir) = args.workdir.clone().or(paths.workdir) {
        manifest.workdir = dir;
    }
    tracing::debug!(source = %source, workdir = %manifest.workdir.display(), "manifest loaded");
    Ok((manifest, source))
}

pub(crate) fn base_options(args: &ManifestArgs) -> PipelineOptions {
    let paths = PathsConfig::from_env();
    PipelineOptions {
        skip_python: args.skip_python,
        install_dir: args.install_dir.clone().or(paths.install_dir),
        python: paths.python,
        cache_dir: paths.cache_dir,
        http: HttpConfig::from_env(),
        ..PipelineOptions::default()
    }
}

pub(crate) fn build_pipeline(
    args: &ManifestArgs,
    options: PipelineOptions,
) -> Result<(Pipeline, ManifestSource)> {
    let (manifest, source) = load_manifest(args)?;
    let pipeline = Pipeline::new(manifest, options)
        .with_context(|| format!("Invalid configuration (manifest: {})", source))?;
    Ok((pipeline, source))
}
