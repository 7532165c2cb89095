//! Execution events and notifiers for observability.
//!
//! Events are emitted as the engine moves an execution through its steps,
//! letting consumers observe progress, stream to UIs, or feed metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

/// Events emitted during workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExecutionEvent {
  /// The engine started (or resumed) driving an execution.
  ExecutionStarted {
    execution_id: String,
    workflow_id: String,
  },

  /// A step was dispatched.
  StepStarted {
    execution_id: String,
    step_id: String,
    attempt: u32,
  },

  /// A step completed successfully.
  StepCompleted {
    execution_id: String,
    step_id: String,
    output: Map<String, Value>,
  },

  /// A step failed but has retry budget left; it will run again once the
  /// backoff elapses.
  StepRetryScheduled {
    execution_id: String,
    step_id: String,
    attempts: u32,
    next_attempt: DateTime<Utc>,
  },

  /// A step failed terminally.
  StepFailed {
    execution_id: String,
    step_id: String,
    error: String,
  },

  /// The execution reached `completed`.
  ExecutionCompleted { execution_id: String },

  /// The execution reached `failed`.
  ExecutionFailed {
    execution_id: String,
    error: String,
  },
}

/// Trait for receiving execution events.
///
/// The engine calls `notify` for each event - implementations decide what
/// to do with them (persist, broadcast, log, ignore, etc.).
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// A no-op notifier that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {
    // Intentionally empty
  }
}

/// A notifier that sends events to an unbounded channel.
///
/// Unbounded so a slow consumer never blocks the engine; event volume is a
/// handful per step, so memory growth is not a practical concern.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // Ignore send errors - receiver may have been dropped
    let _ = self.sender.send(event);
  }
}
