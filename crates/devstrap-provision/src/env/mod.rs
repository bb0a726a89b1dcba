//! Python environment: venv creation, activation, requirements install.

pub mod requirements;
pub mod venv;

pub use requirements::{RequirementsError, RequirementsFile};
pub use venv::{Activation, Venv};
