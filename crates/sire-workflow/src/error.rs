use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
  #[error("workflow has a cycle")]
  CycleDetected,

  #[error("duplicate step id: '{0}'")]
  DuplicateStep(String),

  #[error("edge references unknown step: from={from}, to={to}")]
  UnknownEdgeEndpoint { from: String, to: String },

  #[error("step '{0}' has an invalid retry policy: max_attempts must be at least 1")]
  InvalidRetry(String),
}
