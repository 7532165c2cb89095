use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde_json::{Map, Value};
use sire_dispatch::{DispatchError, Dispatcher};
use sire_store::Store;
use sire_workflow::{
  Execution, ExecutionStatus, Graph, Step, StepState, StepStatus, Workflow,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::{self, BackoffPolicy};
use crate::error::EngineError;
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};

/// The durable execution engine.
///
/// Generic over `N: ExecutionNotifier` to allow different observation
/// strategies; `Engine::new` gives a no-op notifier.
pub struct Engine<N: ExecutionNotifier = NoopNotifier> {
  dispatcher: Arc<dyn Dispatcher>,
  store: Arc<dyn Store>,
  notifier: N,
}

impl Engine<NoopNotifier> {
  pub fn new(dispatcher: Arc<dyn Dispatcher>, store: Arc<dyn Store>) -> Self {
    Self::with_notifier(dispatcher, store, NoopNotifier)
  }
}

impl<N: ExecutionNotifier> Engine<N> {
  pub fn with_notifier(
    dispatcher: Arc<dyn Dispatcher>,
    store: Arc<dyn Store>,
    notifier: N,
  ) -> Self {
    Self {
      dispatcher,
      store,
      notifier,
    }
  }

  /// Drive an execution as far as it can go right now.
  ///
  /// `execution` may be freshly constructed or loaded from the store with
  /// partial progress; completed steps are never redispatched. The call
  /// returns once the execution reaches a terminal status, or yields with
  /// status `retrying` when a step is waiting out its backoff (without
  /// error if nothing failed in this invocation, with the step's error if
  /// the failure happened here).
  ///
  /// Every transition is checkpointed: a step's `running` mark is durable
  /// before its tool is invoked, and its result is durable before any
  /// successor starts.
  pub async fn execute(
    &self,
    mut execution: Execution,
    workflow: &Workflow,
    inputs: &Map<String, Value>,
    cancel: CancellationToken,
  ) -> Result<Execution, EngineError> {
    // Idempotent re-submission of a finished run.
    if execution.status == ExecutionStatus::Completed {
      return Ok(execution);
    }

    let graph = workflow.graph();
    if let Err(err) = workflow
      .validate()
      .and_then(|_| graph.topological_order().map(|_| ()))
    {
      execution.status = ExecutionStatus::Failed;
      self.checkpoint_best_effort(&mut execution).await;
      self.notifier.notify(ExecutionEvent::ExecutionFailed {
        execution_id: execution.id.clone(),
        error: err.to_string(),
      });
      return Err(err.into());
    }

    // An explicitly resubmitted failed execution gets a fresh attempt
    // budget for its failed steps. Completed work stays frozen.
    if execution.status == ExecutionStatus::Failed {
      for state in execution.step_states.values_mut() {
        if state.status == StepStatus::Failed {
          *state = StepState::default();
        }
      }
    }
    execution.status = ExecutionStatus::Running;

    info!(
        execution_id = %execution.id,
        workflow_id = %execution.workflow_id,
        "executing workflow"
    );
    self.notifier.notify(ExecutionEvent::ExecutionStarted {
      execution_id: execution.id.clone(),
      workflow_id: execution.workflow_id.clone(),
    });

    // Rehydrate outputs of already-completed steps for input merging.
    let mut step_outputs: HashMap<String, Map<String, Value>> = execution
      .step_states
      .iter()
      .filter(|(_, state)| state.status == StepStatus::Completed)
      .map(|(id, state)| (id.clone(), state.output.clone()))
      .collect();

    loop {
      if cancel.is_cancelled() {
        return Err(EngineError::Canceled);
      }

      let ready = graph.ready_steps(&execution.step_states, Utc::now());
      if ready.is_empty() {
        break;
      }

      // Reject unknown backoff policies before anything in the wave runs.
      let mut policies: HashMap<String, (BackoffPolicy, u32)> = HashMap::new();
      for step_id in &ready {
        let retry = workflow.step(step_id).and_then(|s| s.retry.as_ref());
        if let Some(retry) = retry {
          match BackoffPolicy::parse(&retry.backoff) {
            Ok(policy) => {
              policies.insert(step_id.clone(), (policy, retry.max_attempts));
            }
            Err(err) => {
              let state = execution.step_states.entry(step_id.clone()).or_default();
              state.status = StepStatus::Failed;
              state.error = err.to_string();
              execution.status = ExecutionStatus::Failed;
              self.store.save(&mut execution).await?;
              self.notifier.notify(ExecutionEvent::ExecutionFailed {
                execution_id: execution.id.clone(),
                error: err.to_string(),
              });
              return Err(err);
            }
          }
        }
      }

      // Mark the wave running; the marks must be durable before any tool
      // is invoked so a crash cannot double-apply external effects
      // silently.
      for step_id in &ready {
        let state = execution.step_states.entry(step_id.clone()).or_default();
        state.status = StepStatus::Running;
        state.attempts += 1;
        state.next_attempt = None;
        self.notifier.notify(ExecutionEvent::StepStarted {
          execution_id: execution.id.clone(),
          step_id: step_id.clone(),
          attempt: state.attempts,
        });
      }
      self.store.save(&mut execution).await?;

      // Dispatch all ready steps concurrently.
      let mut handles = Vec::with_capacity(ready.len());
      for step_id in &ready {
        let Some(step) = workflow.step(step_id) else {
          continue;
        };
        let step_inputs = merge_inputs(inputs, step, &graph, &step_outputs);
        debug!(
            execution_id = %execution.id,
            step_id = %step_id,
            tool = %step.tool,
            "dispatching step"
        );

        let dispatcher = self.dispatcher.clone();
        let tool = step.tool.clone();
        let step_id = step_id.clone();
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
          let result = dispatcher.dispatch(&tool, step_inputs, cancel).await;
          (step_id, result)
        }));
      }

      let wave = join_all(handles).await;

      let now = Utc::now();
      let mut canceled = false;
      let mut hard_failure: Option<EngineError> = None;
      let mut retry_scheduled: Option<EngineError> = None;

      for joined in wave {
        let (step_id, result) = match joined {
          Ok(pair) => pair,
          Err(join_err) => {
            hard_failure.get_or_insert(EngineError::StepFailed {
              step_id: "unknown".to_string(),
              source: DispatchError::LocalTool(format!("task join error: {}", join_err)),
            });
            continue;
          }
        };

        match result {
          Ok(output) => {
            let state = execution.step_states.entry(step_id.clone()).or_default();
            state.status = StepStatus::Completed;
            state.output = output.clone();
            state.error = String::new();
            state.next_attempt = None;
            step_outputs.insert(step_id.clone(), output.clone());

            debug!(execution_id = %execution.id, step_id = %step_id, "step completed");
            self.notifier.notify(ExecutionEvent::StepCompleted {
              execution_id: execution.id.clone(),
              step_id,
              output,
            });
          }
          Err(DispatchError::Canceled) => {
            // The step stays at its last checkpoint and will be
            // redispatched on resume.
            canceled = true;
          }
          Err(err) => {
            let state = execution.step_states.entry(step_id.clone()).or_default();
            let policy = policies.get(&step_id);
            let can_retry = err.is_retryable()
              && policy.is_some_and(|(_, max_attempts)| state.attempts < *max_attempts);

            if can_retry {
              let Some((policy, _)) = policy else {
                continue;
              };
              let next_attempt = now
                + chrono::Duration::from_std(backoff::delay(*policy, state.attempts))
                  .unwrap_or_else(|_| chrono::Duration::seconds(300));
              state.status = StepStatus::Retrying;
              state.error = err.to_string();
              state.next_attempt = Some(next_attempt);

              warn!(
                  execution_id = %execution.id,
                  step_id = %step_id,
                  attempts = state.attempts,
                  next_attempt = %next_attempt,
                  error = %err,
                  "step failed, retry scheduled"
              );
              self.notifier.notify(ExecutionEvent::StepRetryScheduled {
                execution_id: execution.id.clone(),
                step_id: step_id.clone(),
                attempts: state.attempts,
                next_attempt,
              });
              retry_scheduled.get_or_insert(EngineError::StepFailed {
                step_id,
                source: err,
              });
            } else {
              state.status = StepStatus::Failed;
              state.error = err.to_string();
              state.next_attempt = None;

              warn!(
                  execution_id = %execution.id,
                  step_id = %step_id,
                  error = %err,
                  "step failed"
              );
              self.notifier.notify(ExecutionEvent::StepFailed {
                execution_id: execution.id.clone(),
                step_id: step_id.clone(),
                error: err.to_string(),
              });
              hard_failure.get_or_insert(EngineError::StepFailed {
                step_id,
                source: err,
              });
            }
          }
        }
      }

      if let Some(err) = hard_failure {
        execution.status = ExecutionStatus::Failed;
        self.store.save(&mut execution).await?;
        self.notifier.notify(ExecutionEvent::ExecutionFailed {
          execution_id: execution.id.clone(),
          error: err.to_string(),
        });
        return Err(err);
      }

      if canceled {
        // Keep whatever completed in this wave; the run itself stops here
        // with its status untouched so the agent can resume it.
        self.store.save(&mut execution).await?;
        return Err(EngineError::Canceled);
      }

      if let Some(err) = retry_scheduled {
        execution.status = ExecutionStatus::Retrying;
        self.store.save(&mut execution).await?;
        return Err(err);
      }

      self.store.save(&mut execution).await?;
    }

    let all_completed = workflow.steps.iter().all(|step| {
      execution
        .step_states
        .get(&step.id)
        .is_some_and(|state| state.status == StepStatus::Completed)
    });

    if all_completed {
      execution.status = ExecutionStatus::Completed;
      self.store.save(&mut execution).await?;
      info!(execution_id = %execution.id, "execution completed");
      self.notifier.notify(ExecutionEvent::ExecutionCompleted {
        execution_id: execution.id.clone(),
      });
    } else {
      // Nothing is ready and nothing failed: some step is waiting out its
      // retry backoff. Yield to the resumption agent.
      execution.status = ExecutionStatus::Retrying;
      self.store.save(&mut execution).await?;
      info!(execution_id = %execution.id, "execution yielded, retry pending");
    }

    Ok(execution)
  }

  async fn checkpoint_best_effort(&self, execution: &mut Execution) {
    if let Err(err) = self.store.save(execution).await {
      warn!(
          execution_id = %execution.id,
          error = %err,
          "failed to checkpoint execution"
      );
    }
  }
}

/// Compute a step's inputs: workflow inputs, then static params, then the
/// outputs of direct predecessors in edge-declaration order. Later sources
/// win; merging replaces whole top-level keys.
fn merge_inputs(
  inputs: &Map<String, Value>,
  step: &Step,
  graph: &Graph,
  step_outputs: &HashMap<String, Map<String, Value>>,
) -> Map<String, Value> {
  let mut merged = inputs.clone();

  for (key, value) in &step.params {
    merged.insert(key.clone(), value.clone());
  }

  for pred in graph.upstream(&step.id) {
    if let Some(output) = step_outputs.get(pred) {
      for (key, value) in output {
        merged.insert(key.clone(), value.clone());
      }
    }
  }

  merged
}
