//! `devstrap up` and `devstrap plan`.

use anyhow::Result;
use std::path::PathBuf;

use devstrap_provision::{Action, PlannedStep};

use super::{base_options, build_pipeline};
use crate::cli::ManifestArgs;

pub struct UpArgs {
    pub force: bool,
    pub dry_run: bool,
    pub python: Option<String>,
    pub cache_dir: Option<PathBuf>,
    pub json: bool,
}

pub fn cmd_up(manifest: &ManifestArgs, args: UpArgs) -> Result<()> {
    let mut options = base_options(manifest);
    options.force = args.force;
    if args.python.is_some() {
        options.python = args.python;
    }
    if args.cache_dir.is_some() {
        options.cache_dir = args.cache_dir;
    }
    let (pipeline, source) = build_pipeline(manifest, options)?;

    if args.dry_run {
        pipeline.check_target()?;
        return print_plan(&pipeline.plan(), args.json);
    }

    eprintln!(
        "Provisioning {} {} (manifest: {})",
        pipeline.manifest().tool.name,
        pipeline.manifest().tool.expected_version(),
        source
    );
    let report = pipeline.run()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let ran = report.ran();
        eprintln!();
        eprintln!(
            "✓ {} ready at {} ({} step(s) run, {} already satisfied)",
            report.reported_version,
            report.installed.display(),
            ran,
            report.steps.len() - ran
        );
    }
    Ok(())
}

pub fn cmd_plan(manifest: &ManifestArgs, json: bool) -> Result<()> {
    let (pipeline, _) = build_pipeline(manifest, base_options(manifest))?;
    if let Err(e) = pipeline.check_target() {
        eprintln!("⚠ {}", e);
    }
    print_plan(&pipeline.plan(), json)
}

fn print_plan(plan: &[PlannedStep], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(plan)?);
        return Ok(());
    }
    for planned in plan {
        match planned.action {
            Action::Run => println!("{}  run", planned.step),
            Action::Skip(ref reason) => println!("{}  skip ({})", planned.step, reason),
        }
    }
    Ok(())
}
