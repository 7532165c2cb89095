use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::workflow::Workflow;

/// Status of a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
  Running,
  Retrying,
  Completed,
  Failed,
}

impl ExecutionStatus {
  /// Terminal executions are never picked up again by the resumption agent.
  pub fn is_terminal(&self) -> bool {
    matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      ExecutionStatus::Running => "running",
      ExecutionStatus::Retrying => "retrying",
      ExecutionStatus::Completed => "completed",
      ExecutionStatus::Failed => "failed",
    }
  }
}

/// Status of a single step within an execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
  #[default]
  Pending,
  Running,
  Completed,
  Failed,
  Retrying,
}

/// A single durable run of a workflow.
///
/// The workflow definition is embedded so a loaded execution can be resumed
/// without an external definition store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
  pub id: String,
  pub workflow_id: String,
  pub workflow: Workflow,
  pub status: ExecutionStatus,
  #[serde(default)]
  pub step_states: HashMap<String, StepState>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// The state of one step within an execution. A step without a recorded
/// state is equivalent to a pending one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepState {
  pub status: StepStatus,
  /// Frozen once the step completes; never redispatched afterwards.
  #[serde(default)]
  pub output: Map<String, Value>,
  #[serde(default)]
  pub error: String,
  /// Number of dispatches consumed so far.
  #[serde(default)]
  pub attempts: u32,
  /// Earliest time the next attempt may run. `None` means immediately.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub next_attempt: Option<DateTime<Utc>>,
}

impl Execution {
  /// Create a fresh execution for a workflow, ready to be saved and run.
  pub fn new(workflow: &Workflow) -> Self {
    let now = Utc::now();
    Self {
      id: uuid::Uuid::new_v4().to_string(),
      workflow_id: workflow.id.clone(),
      workflow: workflow.clone(),
      status: ExecutionStatus::Running,
      step_states: HashMap::new(),
      created_at: now,
      updated_at: now,
    }
  }

  /// An execution is runnable now when no retrying step is still waiting
  /// out its backoff.
  pub fn is_runnable_at(&self, now: DateTime<Utc>) -> bool {
    self.step_states.values().all(|state| {
      state.status != StepStatus::Retrying
        || state.next_attempt.is_none_or(|next| next <= now)
    })
  }
}
