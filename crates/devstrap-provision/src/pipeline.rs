//! Convergence over the nine provisioning steps.
//!
//! [`Pipeline::plan`] decides, per step, whether the desired state is
//! already there; [`Pipeline::run`] executes the plan in order and stops at
//! the first failure. With `force` every step runs unconditionally.

use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};

use devstrap_core::config::HttpConfig;
use devstrap_core::manifest::{Manifest, PythonEnv};
use devstrap_core::platform::Target;
use devstrap_core::state::{self, RequirementsReceipt, StateFile, ToolReceipt};

use crate::archive::{self, Extractor};
use crate::env::requirements;
use crate::env::venv::{self, Activation, Venv};
use crate::error::{PipelineError, ProvisionError};
use crate::fetch::{Downloader, Fetch};
use crate::info_log;
use crate::install;
use crate::step::Step;
use crate::verify;

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Rerun every step even when its outcome is already in place.
    pub force: bool,
    /// Skip steps 1-3 regardless of the manifest.
    pub skip_python: bool,
    pub install_dir: Option<PathBuf>,
    pub python: Option<String>,
    /// Keep downloaded archives here and reuse them across runs instead of
    /// staging them in the workdir.
    pub cache_dir: Option<PathBuf>,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "reason", rename_all = "snake_case")]
pub enum Action {
    Run,
    Skip(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedStep {
    pub step: Step,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: Step,
    #[serde(flatten)]
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub steps: Vec<StepReport>,
    pub installed: PathBuf,
    pub reported_version: String,
}

impl RunReport {
    pub fn ran(&self) -> usize {
        self.steps.iter().filter(|s| s.action == Action::Run).count()
    }
}

/// What `status` reports about the current environment.
#[derive(Debug, Clone, Serialize)]
pub struct Inspection {
    pub workdir: PathBuf,
    pub venv: Option<PathBuf>,
    pub venv_exists: bool,
    pub requirements: Option<PathBuf>,
    /// `None` when the file is missing or invalid.
    pub requirements_digest: Option<String>,
    pub requirements_in_sync: bool,
    pub tool_path: PathBuf,
    pub tool_version_output: Option<String>,
    pub tool_satisfied: bool,
    pub receipt: StateFile,
}

/// Values produced by one step and consumed by a later one.
#[derive(Default)]
struct RunContext {
    venv: Option<Venv>,
    activation: Option<Activation>,
    archive: Option<PathBuf>,
    extractor: Option<Extractor>,
    binary: Option<PathBuf>,
    installed: Option<PathBuf>,
    reported_version: Option<String>,
}

pub struct Pipeline {
    manifest: Manifest,
    options: PipelineOptions,
    fetcher: Box<dyn Fetch>,
}

impl Pipeline {
    pub fn new(mut manifest: Manifest, options: PipelineOptions) -> Result<Self, ProvisionError> {
        if let Some(ref dir) = options.install_dir {
            manifest.tool.install_dir = dir.clone();
        }
        if let (Some(python), Some(py)) = (&options.python, manifest.python.as_mut()) {
            py.interpreter = Some(python.clone());
        }
        if options.skip_python {
            manifest.python = None;
        }
        manifest.validate()?;
        let fetcher = Box::new(Downloader::new(&options.http)?);
        Ok(Self {
            manifest,
            options,
            fetcher,
        })
    }

    /// Replace the network seam (tests, mirrors).
    pub fn with_fetcher(mut self, fetcher: Box<dyn Fetch>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    fn workdir(&self) -> &Path {
        &self.manifest.workdir
    }

    fn python(&self) -> Option<&PythonEnv> {
        self.manifest.python.as_ref()
    }

    fn venv(&self) -> Option<Venv> {
        self.python()
            .map(|py| Venv::new(self.manifest.in_workdir(&py.venv_dir)))
    }

    fn requirements_path(&self) -> Option<PathBuf> {
        self.python()
            .map(|py| self.manifest.in_workdir(&py.requirements))
    }

    /// Where step 4 stores the release asset.
    pub fn archive_path(&self) -> PathBuf {
        let tool = &self.manifest.tool;
        match self.options.cache_dir {
            Some(ref cache) => cache
                .join(format!("{}-{}", tool.name, tool.expected_version()))
                .join(tool.asset_file_name()),
            None => self.workdir().join(tool.asset_file_name()),
        }
    }

    /// A cached archive is reused only when a checksum is pinned and matches.
    fn reusable_archive(&self, path: &Path) -> Option<String> {
        if self.options.force || self.options.cache_dir.is_none() {
            return None;
        }
        let expected = self.manifest.tool.sha256.as_deref()?;
        let actual = state::file_sha256(path).ok()?;
        actual.eq_ignore_ascii_case(expected).then_some(actual)
    }

    /// The release must be built for this host.
    pub fn check_target(&self) -> Result<(), ProvisionError> {
        let host = Target::host();
        if self.manifest.tool.target.matches(&host) {
            Ok(())
        } else {
            Err(ProvisionError::UnsupportedTarget {
                wanted: self.manifest.tool.target.clone(),
                host,
            })
        }
    }

    fn load_state(&self) -> StateFile {
        state::load_state(self.workdir()).unwrap_or_else(|e| {
            tracing::warn!("ignoring unreadable receipt: {:#}", e);
            StateFile::default()
        })
    }

    fn save_receipt<F>(&self, f: F)
    where
        F: FnOnce(&mut StateFile),
    {
        if let Err(e) = state::update_state(self.workdir(), f) {
            tracing::warn!("failed to record receipt: {:#}", e);
        }
    }

    /// Version-check output of an existing install, if it already reports the
    /// pinned version.
    fn tool_satisfied(&self) -> Option<String> {
        let tool = &self.manifest.tool;
        verify::installed_version(&tool.install_path(), &tool.version_args)
            .filter(|out| out.contains(tool.expected_version()))
    }

    fn requirements_in_sync(&self, receipt: &StateFile) -> bool {
        let (Some(venv), Some(path)) = (self.venv(), self.requirements_path()) else {
            return false;
        };
        let Some(ref rec) = receipt.requirements else {
            return false;
        };
        let Ok(req) = requirements::load(&path) else {
            return false;
        };
        venv.exists() && rec.venv_dir == venv.dir() && rec.sha256 == req.digest()
    }

    pub fn plan(&self) -> Vec<PlannedStep> {
        let receipt = self.load_state();
        self.plan_with(&receipt)
    }

    fn plan_with(&self, receipt: &StateFile) -> Vec<PlannedStep> {
        let force = self.options.force;
        let tool = &self.manifest.tool;
        let tool_done = if force { None } else { self.tool_satisfied() };

        Step::ALL
            .iter()
            .map(|&step| {
                let action = if step.is_python() {
                    match self.venv() {
                        None if self.options.skip_python => Action::Skip("--skip-python".to_string()),
                        None => Action::Skip("no python section in manifest".to_string()),
                        Some(venv) => match step {
                            Step::CreateVenv if !force && venv.exists() => Action::Skip(format!(
                                "venv already exists at {}",
                                venv.dir().display()
                            )),
                            Step::InstallRequirements
                                if !force && self.requirements_in_sync(receipt) =>
                            {
                                Action::Skip("requirements unchanged since last install".to_string())
                            }
                            _ => Action::Run,
                        },
                    }
                } else {
                    match (&tool_done, step) {
                        (Some(_), Step::VerifyVersion) | (None, _) => Action::Run,
                        (Some(_), _) => Action::Skip(format!(
                            "{} {} already installed at {}",
                            tool.name,
                            tool.expected_version(),
                            tool.install_path().display()
                        )),
                    }
                };
                PlannedStep { step, action }
            })
            .collect()
    }

    /// Execute the plan. Stops at the first failing step.
    pub fn run(&self) -> Result<RunReport, PipelineError> {
        self.check_target().map_err(PipelineError::Preflight)?;

        let receipt = self.load_state();
        let plan = self.plan_with(&receipt);
        let mut ctx = RunContext {
            venv: self.venv(),
            ..RunContext::default()
        };
        let mut reports = Vec::with_capacity(plan.len());

        for PlannedStep { step, action } in plan {
            match action {
                Action::Skip(ref reason) => {
                    info_log!("{} skipped: {}", step, reason);
                    reports.push(StepReport {
                        step,
                        action,
                        detail: None,
                    });
                }
                Action::Run => {
                    info_log!("{}", step);
                    let detail = self
                        .execute(step, &mut ctx)
                        .map_err(|e| PipelineError::new(step, e))?;
                    tracing::debug!(%step, detail = %detail, "step complete");
                    reports.push(StepReport {
                        step,
                        action,
                        detail: Some(detail),
                    });
                }
            }
        }

        Ok(RunReport {
            steps: reports,
            installed: ctx
                .installed
                .unwrap_or_else(|| self.manifest.tool.install_path()),
            reported_version: ctx.reported_version.unwrap_or_default(),
        })
    }

    fn execute(&self, step: Step, ctx: &mut RunContext) -> Result<String, ProvisionError> {
        let tool = &self.manifest.tool;
        match step {
            Step::CreateVenv => {
                let venv = ctx.venv.as_ref().ok_or(ProvisionError::MissingInput("venv"))?;
                let preferred = self.python().and_then(|py| py.interpreter.as_deref());
                let interpreter = venv::find_interpreter(preferred)?;
                venv::create_venv(&interpreter, venv)?;
                Ok(format!(
                    "created {} with {}",
                    venv.dir().display(),
                    interpreter.display()
                ))
            }
            Step::ActivateVenv => {
                let venv = ctx.venv.as_ref().ok_or(ProvisionError::MissingInput("venv"))?;
                ctx.activation = Some(venv.activation());
                Ok(format!("VIRTUAL_ENV={}", venv.dir().display()))
            }
            Step::InstallRequirements => {
                let venv = ctx.venv.as_ref().ok_or(ProvisionError::MissingInput("venv"))?;
                let activation = ctx
                    .activation
                    .as_ref()
                    .ok_or(ProvisionError::MissingInput("venv activation"))?;
                let path = self
                    .requirements_path()
                    .ok_or(ProvisionError::MissingInput("requirements path"))?;
                let req = requirements::load(&path)?;
                let detail = if req.has_installables() {
                    requirements::install(venv, activation, &req)?;
                    format!("installed from {}", path.display())
                } else {
                    format!("{} lists nothing to install", path.display())
                };
                let digest = req.digest();
                let venv_dir = venv.dir().to_path_buf();
                self.save_receipt(|s| {
                    s.requirements = Some(RequirementsReceipt {
                        path,
                        sha256: digest,
                        venv_dir,
                        installed_at: Utc::now(),
                    });
                });
                Ok(detail)
            }
            Step::FetchArchive => {
                let url = tool.resolved_url();
                let dest = self.archive_path();
                if let Some(sha256) = self.reusable_archive(&dest) {
                    ctx.archive = Some(dest.clone());
                    return Ok(format!("reused {} (sha256 {})", dest.display(), sha256));
                }
                let done = self.fetcher.fetch(&url, &dest, tool.sha256.as_deref())?;
                ctx.archive = Some(done.path);
                Ok(format!(
                    "{} ({}, sha256 {})",
                    url,
                    devstrap_fs::format_size(done.bytes),
                    done.sha256
                ))
            }
            Step::PrepareExtractor => {
                let extractor = Extractor::for_kind(tool.archive_kind());
                ctx.extractor = Some(extractor);
                Ok(format!("{}: {}", tool.archive_kind().as_str(), extractor.describe()))
            }
            Step::ExtractArchive => {
                let archive_path = ctx
                    .archive
                    .as_deref()
                    .ok_or(ProvisionError::MissingInput("archive"))?;
                let extractor = ctx
                    .extractor
                    .ok_or(ProvisionError::MissingInput("extractor"))?;
                let workdir = self.workdir();
                let binary_rel = tool.binary_path();
                let extracted = extractor.extract(archive_path, workdir, &binary_rel)?;
                let binary = archive::locate_binary(workdir, &binary_rel, &extracted)?;

                let mut artifacts = Vec::new();
                if archive_path.starts_with(workdir) {
                    artifacts.push(archive_path.to_path_buf());
                }
                artifacts.extend(archive::top_level_entries(workdir, &extracted));
                artifacts.retain(|p| p != &binary);
                self.save_receipt(|s| {
                    for a in artifacts {
                        if !s.artifacts.contains(&a) {
                            s.artifacts.push(a);
                        }
                    }
                });

                let detail = format!("{} files, binary at {}", extracted.len(), binary.display());
                ctx.binary = Some(binary);
                Ok(detail)
            }
            Step::MarkExecutable => {
                let binary = ctx
                    .binary
                    .as_deref()
                    .ok_or(ProvisionError::MissingInput("extracted binary"))?;
                install::mark_executable(binary)?;
                Ok(format!("chmod 755 {}", binary.display()))
            }
            Step::InstallBinary => {
                let binary = ctx
                    .binary
                    .take()
                    .ok_or(ProvisionError::MissingInput("extracted binary"))?;
                let dest = install::install_binary(&binary, &tool.install_dir, &tool.installed_name())?;
                let detail = format!("{} -> {}", binary.display(), dest.display());
                ctx.installed = Some(dest);
                Ok(detail)
            }
            Step::VerifyVersion => {
                let installed = ctx
                    .installed
                    .clone()
                    .unwrap_or_else(|| tool.install_path());
                let line = verify::check_version(
                    &installed,
                    &tool.version_args,
                    tool.expected_version(),
                )?;
                match state::file_sha256(&installed) {
                    Ok(sha256) => {
                        let receipt = ToolReceipt {
                            name: tool.name.clone(),
                            version: tool.expected_version().to_string(),
                            url: tool.resolved_url(),
                            path: installed.clone(),
                            sha256,
                            reported_version: line.clone(),
                            installed_at: Utc::now(),
                        };
                        self.save_receipt(|s| s.tool = Some(receipt));
                    }
                    Err(e) => tracing::warn!("could not hash {}: {:#}", installed.display(), e),
                }
                ctx.installed = Some(installed);
                ctx.reported_version = Some(line.clone());
                Ok(line)
            }
        }
    }

    /// Current state of each desired outcome, without changing anything.
    pub fn inspect(&self) -> Inspection {
        let receipt = self.load_state();
        let venv = self.venv();
        let requirements = self.requirements_path();
        let requirements_digest = requirements
            .as_deref()
            .and_then(|p| requirements::load(p).ok())
            .map(|r| r.digest());
        let tool = &self.manifest.tool;
        let tool_path = tool.install_path();
        let tool_version_output = verify::installed_version(&tool_path, &tool.version_args);
        let tool_satisfied = tool_version_output
            .as_deref()
            .is_some_and(|out| out.contains(tool.expected_version()));

        Inspection {
            workdir: self.workdir().to_path_buf(),
            venv_exists: venv.as_ref().is_some_and(Venv::exists),
            venv: venv.map(|v| v.dir().to_path_buf()),
            requirements,
            requirements_digest,
            requirements_in_sync: self.requirements_in_sync(&receipt),
            tool_path,
            tool_version_output: tool_version_output.map(|s| s.trim().to_string()),
            tool_satisfied,
            receipt,
        }
    }
}
