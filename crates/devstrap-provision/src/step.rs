use serde::Serialize;
use std::fmt;

/// The provisioning steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    CreateVenv,
    ActivateVenv,
    InstallRequirements,
    FetchArchive,
    PrepareExtractor,
    ExtractArchive,
    MarkExecutable,
    InstallBinary,
    VerifyVersion,
}

impl Step {
    pub const ALL: [Step; 9] = [
        Step::CreateVenv,
        Step::ActivateVenv,
        Step::InstallRequirements,
        Step::FetchArchive,
        Step::PrepareExtractor,
        Step::ExtractArchive,
        Step::MarkExecutable,
        Step::InstallBinary,
        Step::VerifyVersion,
    ];

    /// 1-based position in the pipeline.
    pub fn number(self) -> usize {
        Step::ALL.iter().position(|s| *s == self).unwrap_or(0) + 1
    }

    pub fn label(self) -> &'static str {
        match self {
            Step::CreateVenv => "create virtual environment",
            Step::ActivateVenv => "activate virtual environment",
            Step::InstallRequirements => "install requirements",
            Step::FetchArchive => "fetch release archive",
            Step::PrepareExtractor => "prepare archive extractor",
            Step::ExtractArchive => "extract archive",
            Step::MarkExecutable => "mark binary executable",
            Step::InstallBinary => "install binary",
            Step::VerifyVersion => "verify installed version",
        }
    }

    /// Steps 1-3 depend on the manifest's python section.
    pub fn is_python(self) -> bool {
        matches!(
            self,
            Step::CreateVenv | Step::ActivateVenv | Step::InstallRequirements
        )
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}/{}] {}", self.number(), Step::ALL.len(), self.label())
    }
}
