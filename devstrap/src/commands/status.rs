//! `devstrap status`

use anyhow::Result;
use serde_json::json;

use super::{base_options, build_pipeline};
use crate::cli::ManifestArgs;

pub fn cmd_status(manifest: &ManifestArgs, json: bool) -> Result<()> {
    let (pipeline, source) = build_pipeline(manifest, base_options(manifest))?;
    let inspection = pipeline.inspect();
    let tool = &pipeline.manifest().tool;

    if json {
        let out = json!({
            "manifest": source.to_string(),
            "tool": {
                "name": tool.name,
                "version": tool.expected_version(),
                "target": tool.target.to_string(),
            },
            "status": inspection,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Manifest:      {}", source);
    println!("Workdir:       {}", inspection.workdir.display());
    match inspection.venv {
        Some(ref venv) => println!(
            "Venv:          {} ({})",
            venv.display(),
            if inspection.venv_exists { "present" } else { "missing" }
        ),
        None => println!("Venv:          (not managed)"),
    }
    if let Some(ref req) = inspection.requirements {
        let state = match (&inspection.requirements_digest, inspection.requirements_in_sync) {
            (None, _) => "missing or invalid",
            (Some(_), true) => "installed, unchanged",
            (Some(_), false) => "not installed or changed since last install",
        };
        println!("Requirements:  {} ({})", req.display(), state);
    }
    println!(
        "{:<14} {} {} at {}",
        format!("{}:", tool.name),
        tool.expected_version(),
        if inspection.tool_satisfied { "✓" } else { "✗" },
        inspection.tool_path.display()
    );
    if let Some(ref out) = inspection.tool_version_output {
        let first = out.lines().next().unwrap_or_default();
        println!("               reports: {}", first);
    }
    if let Some(ref receipt) = inspection.receipt.tool {
        println!(
            "               installed {} from {}",
            receipt.installed_at.format("%Y-%m-%d %H:%M:%S UTC"),
            receipt.url
        );
    }
    if let Some(last) = inspection.receipt.last_run {
        println!("Last run:      {}", last.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    Ok(())
}
