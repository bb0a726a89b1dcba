//! `devstrap init` writes the built-in manifest so it can be edited.

use anyhow::{Context, Result};
use std::path::Path;

use devstrap_core::manifest::Manifest;

const HEADER: &str = "\
# devstrap manifest
#
# python:   venv + requirements installed by steps 1-3 (remove to skip them)
# tool:     release binary fetched, extracted and installed by steps 4-8,
#           then checked with `<name> <version_args>` in step 9.
#           `{version}` in url is replaced with version.
#           Add `sha256: <hex>` to pin the download.
";

/// `devstrap init`
pub fn cmd_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    let content = render_default()?;
    devstrap_fs::atomic_write(path, content.as_bytes())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    eprintln!("✅ Wrote default manifest to {}", path.display());
    eprintln!("   Run `devstrap up` to provision, `devstrap plan` to preview.");
    Ok(())
}

fn render_default() -> Result<String> {
    let yaml = Manifest::builtin()
        .to_yaml()
        .context("Failed to render default manifest")?;
    Ok(format!("{}\n{}", HEADER, yaml))
}
