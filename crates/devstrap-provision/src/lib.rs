//! Provisioning pipeline for a local development environment.
//!
//! The nine steps run strictly in order (see [`Step`]); [`pipeline::Pipeline`]
//! decides which ones are already satisfied and runs the rest, aborting at
//! the first failure.

pub mod log;

pub mod archive;
pub mod env;
pub mod error;
pub mod fetch;
pub mod install;
pub mod pipeline;
pub mod process;
pub mod step;
pub mod verify;

pub use error::{PipelineError, ProvisionError};
pub use pipeline::{Action, Inspection, Pipeline, PipelineOptions, PlannedStep, RunReport, StepReport};
pub use step::Step;
