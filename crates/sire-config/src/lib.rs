//! Sire Config
//!
//! Workflow document schema and parsing. Documents are authored in YAML or
//! JSON and converted into validated [`sire_workflow::Workflow`] values
//! before anything executes.

mod error;
mod workflow;

pub use error::ConfigError;
pub use workflow::{EdgeDoc, RetryDoc, StepDoc, WorkflowDoc};
