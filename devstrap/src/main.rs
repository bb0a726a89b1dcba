mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};
use devstrap_core::observability::{init_tracing, TracingMode};

fn main() -> Result<()> {
    devstrap_core::config::load_dotenv();
    let cli = Cli::parse();
    let mode = if cli.quiet {
        TracingMode::Quiet
    } else if cli.verbose {
        TracingMode::Verbose
    } else {
        TracingMode::Default
    };
    init_tracing(mode);

    match cli.command {
        Commands::Up {
            manifest,
            force,
            dry_run,
            python,
            cache_dir,
            json,
        } => {
            commands::up::cmd_up(
                &manifest,
                commands::up::UpArgs {
                    force,
                    dry_run,
                    python,
                    cache_dir,
                    json,
                },
            )?;
        }
        Commands::Plan { manifest, json } => {
            commands::up::cmd_plan(&manifest, json)?;
        }
        Commands::Status { manifest, json } => {
            commands::status::cmd_status(&manifest, json)?;
        }
        Commands::Init { path, force } => {
            commands::init::cmd_init(&path, force)?;
        }
        Commands::Clean {
            manifest,
            dry_run,
            force,
            all,
        } => {
            commands::clean::cmd_clean(
                &manifest,
                commands::clean::CleanArgs { dry_run, force, all },
            )?;
        }
    }

    Ok(())
}
