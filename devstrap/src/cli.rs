use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// devstrap - provision a Python venv and a pinned release binary
#[derive(Parser, Debug)]
#[command(name = "devstrap")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Only print warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Debug logging for devstrap crates
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command that reads the manifest.
#[derive(Args, Debug, Clone)]
pub struct ManifestArgs {
    /// Manifest file (default: ./devstrap.yaml, built-in defaults if absent)
    #[arg(long, short = 'm', value_name = "PATH", env = "DEVSTRAP_MANIFEST")]
    pub manifest: Option<PathBuf>,

    /// Directory the archive is downloaded and extracted into
    #[arg(long, value_name = "DIR", env = "DEVSTRAP_WORKDIR")]
    pub workdir: Option<PathBuf>,

    /// Where the binary is installed (overrides the manifest)
    #[arg(long, value_name = "DIR", env = "DEVSTRAP_INSTALL_DIR")]
    pub install_dir: Option<PathBuf>,

    /// Ignore the manifest's python section (skips steps 1-3)
    #[arg(long)]
    pub skip_python: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Converge the environment: run every step that is not already satisfied
    Up {
        #[command(flatten)]
        manifest: ManifestArgs,

        /// Rerun every step even if its outcome is already in place
        #[arg(long)]
        force: bool,

        /// Print the plan without changing anything
        #[arg(long)]
        dry_run: bool,

        /// Interpreter used to create the venv
        #[arg(long, value_name = "PYTHON", env = "DEVSTRAP_PYTHON")]
        python: Option<String>,

        /// Keep downloaded archives in this directory and reuse them
        #[arg(long, value_name = "DIR", env = "DEVSTRAP_CACHE_DIR")]
        cache_dir: Option<PathBuf>,

        /// Print the run report as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Show what `up` would do for each step
    Plan {
        #[command(flatten)]
        manifest: ManifestArgs,

        /// Output the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Report the venv, requirements and installed binary against the manifest
    Status {
        #[command(flatten)]
        manifest: ManifestArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write the default manifest to devstrap.yaml
    Init {
        /// Output path
        #[arg(long, value_name = "PATH", default_value = "devstrap.yaml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Remove the downloaded archive, extracted files and the receipt
    Clean {
        #[command(flatten)]
        manifest: ManifestArgs,

        /// Show what would be removed without removing it
        #[arg(long)]
        dry_run: bool,

        /// Do not ask for confirmation
        #[arg(long, short = 'f')]
        force: bool,

        /// Also remove the virtual environment
        #[arg(long)]
        all: bool,
    },
}
