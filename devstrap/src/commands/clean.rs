//! `devstrap clean`: remove what the pipeline left in the workdir.
//!
//! Targets are the artifacts recorded in the receipt (downloaded archive,
//! extracted top-level entries), a staged archive that never got extracted,
//! the `.devstrap/` state directory, and with `--all` the venv. The installed
//! binary is never touched.

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};

use devstrap_core::state;

use super::load_manifest;
use crate::cli::ManifestArgs;

pub struct CleanArgs {
    pub dry_run: bool,
    pub force: bool,
    pub all: bool,
}

/// `devstrap clean`
pub fn cmd_clean(manifest_args: &ManifestArgs, args: CleanArgs) -> Result<()> {
    let (manifest, _) = load_manifest(manifest_args)?;
    let workdir = manifest.workdir.clone();
    let receipt = state::load_state(&workdir).unwrap_or_else(|e| {
        tracing::warn!("receipt unreadable, cleaning without it: {:#}", e);
        state::StateFile::default()
    });

    let mut candidates = receipt.artifacts.clone();
    candidates.push(workdir.join(manifest.tool.asset_file_name()));
    candidates.push(state::state_dir(&workdir));
    if args.all && !manifest_args.skip_python {
        if let Some(ref py) = manifest.python {
            candidates.push(manifest.in_workdir(&py.venv_dir));
        }
    }
    let entries = collect_targets(&workdir, candidates);

    if entries.is_empty() {
        eprintln!("Nothing to clean in {}", workdir.display());
        return Ok(());
    }

    let total_size: u64 = entries.iter().map(|(_, size)| size).sum();
    eprintln!("🗂  Provisioning leftovers in {}:", workdir.display());
    eprintln!();
    for (path, size) in &entries {
        eprintln!("  • {} ({})", display_rel(path, &workdir), devstrap_fs::format_size(*size));
    }
    eprintln!();
    eprintln!("Total: {} ({} entries)", devstrap_fs::format_size(total_size), entries.len());

    if args.dry_run {
        eprintln!();
        eprintln!("(Dry run: no files removed. Drop --dry-run to delete.)");
        return Ok(());
    }

    if !args.force {
        eprint!("\nRemove these entries? [y/N] ");
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        if !matches!(answer.trim().to_lowercase().as_str(), "y" | "yes") {
            eprintln!("Cancelled.");
            return Ok(());
        }
    }

    let (removed, errors) = remove_all(&entries);
    eprintln!();
    if errors == 0 {
        eprintln!(
            "✓ Removed {} entr{}, freed {}",
            removed,
            if removed == 1 { "y" } else { "ies" },
            devstrap_fs::format_size(total_size)
        );
    } else {
        eprintln!("⚠ Removed {}/{} entries ({} errors)", removed, entries.len(), errors);
    }
    Ok(())
}

/// Existing candidates inside `workdir` (never `workdir` itself), deduplicated,
/// with their sizes.
fn collect_targets(workdir: &Path, candidates: Vec<PathBuf>) -> Vec<(PathBuf, u64)> {
    let mut paths: Vec<PathBuf> = candidates
        .into_iter()
        .filter(|p| p.starts_with(workdir) && p.as_path() != workdir)
        .filter(|p| p.symlink_metadata().is_ok())
        .collect();
    paths.sort();
    paths.dedup();
    // Drop entries already covered by a parent in the list.
    let mut targets: Vec<PathBuf> = Vec::with_capacity(paths.len());
    for p in paths {
        if !targets.iter().any(|t| p.starts_with(t)) {
            targets.push(p);
        }
    }
    targets
        .into_iter()
        .map(|p| {
            let size = devstrap_fs::dir_size(&p);
            (p, size)
        })
        .collect()
}

fn remove_all(entries: &[(PathBuf, u64)]) -> (usize, usize) {
    let mut removed = 0;
    let mut errors = 0;
    for (path, _) in entries {
        let result = if path.is_dir() && !path.is_symlink() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        match result {
            Ok(()) => removed += 1,
            Err(e) => {
                eprintln!("  ✗ Failed to remove {}: {}", path.display(), e);
                errors += 1;
            }
        }
    }
    (removed, errors)
}

fn display_rel(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| path.display().to_string())
}
