use sire_dispatch::DispatchError;
use sire_store::StoreError;
use sire_workflow::WorkflowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
  /// The workflow is structurally unsound (cycle, duplicate step, ...).
  #[error(transparent)]
  Workflow(#[from] WorkflowError),

  #[error("unknown backoff policy: {0}")]
  UnknownBackoff(String),

  /// A step's dispatch failed. Also returned when the failure only
  /// scheduled a retry, so the caller knows this invocation did not
  /// complete the run.
  #[error("step '{step_id}' failed: {source}")]
  StepFailed {
    step_id: String,
    #[source]
    source: DispatchError,
  },

  /// The caller canceled the run. Step states stay at the last checkpoint
  /// and the execution remains resumable.
  #[error("execution canceled")]
  Canceled,

  /// A checkpoint failed. Always fatal to the current run: progressing
  /// without durability is forbidden.
  #[error(transparent)]
  Store(#[from] StoreError),
}
