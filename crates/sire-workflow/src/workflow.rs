use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::WorkflowError;
use crate::graph::Graph;

/// An immutable workflow definition: a DAG of steps connected by edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
  pub id: String,
  pub name: String,
  pub steps: Vec<Step>,
  #[serde(default)]
  pub edges: Vec<Edge>,
}

/// A single unit of work in a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
  pub id: String,
  /// Tool reference, e.g. `sire:local/file.read` or
  /// `mcp:https://hub.example/rpc#math.add`.
  pub tool: String,
  #[serde(default)]
  pub params: Map<String, Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub retry: Option<RetryPolicy>,
}

/// Retry behavior for a step. Without a policy a step gets exactly one
/// attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  /// Backoff strategy name, e.g. "exponential".
  pub backoff: String,
}

/// A directed connection between two steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
  pub from: String,
  pub to: String,
}

impl Workflow {
  /// Get a step by ID.
  pub fn step(&self, step_id: &str) -> Option<&Step> {
    self.steps.iter().find(|s| s.id == step_id)
  }

  /// Build the graph structure for traversal.
  pub fn graph(&self) -> Graph {
    Graph::new(self)
  }

  /// Check structural soundness: step IDs are unique, every edge endpoint
  /// refers to an existing step, and retry policies allow at least one
  /// attempt. Cycle detection is a separate concern, see
  /// [`Graph::topological_order`].
  pub fn validate(&self) -> Result<(), WorkflowError> {
    let mut seen = HashSet::new();
    for step in &self.steps {
      if !seen.insert(step.id.as_str()) {
        return Err(WorkflowError::DuplicateStep(step.id.clone()));
      }
      if let Some(retry) = &step.retry {
        if retry.max_attempts < 1 {
          return Err(WorkflowError::InvalidRetry(step.id.clone()));
        }
      }
    }

    for edge in &self.edges {
      if !seen.contains(edge.from.as_str()) || !seen.contains(edge.to.as_str()) {
        return Err(WorkflowError::UnknownEdgeEndpoint {
          from: edge.from.clone(),
          to: edge.to.clone(),
        });
      }
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn step(id: &str) -> Step {
    Step {
      id: id.to_string(),
      tool: format!("sire:local/test.{}", id),
      params: Map::new(),
      retry: None,
    }
  }

  fn edge(from: &str, to: &str) -> Edge {
    Edge {
      from: from.to_string(),
      to: to.to_string(),
    }
  }

  #[test]
  fn validate_accepts_well_formed_workflow() {
    let workflow = Workflow {
      id: "wf-1".to_string(),
      name: "Test".to_string(),
      steps: vec![step("a"), step("b")],
      edges: vec![edge("a", "b")],
    };

    assert!(workflow.validate().is_ok());
  }

  #[test]
  fn validate_rejects_duplicate_step_ids() {
    let workflow = Workflow {
      id: "wf-1".to_string(),
      name: "Test".to_string(),
      steps: vec![step("a"), step("a")],
      edges: vec![],
    };

    assert!(matches!(
      workflow.validate(),
      Err(WorkflowError::DuplicateStep(id)) if id == "a"
    ));
  }

  #[test]
  fn validate_rejects_unknown_edge_endpoints() {
    let workflow = Workflow {
      id: "wf-1".to_string(),
      name: "Test".to_string(),
      steps: vec![step("a")],
      edges: vec![edge("a", "ghost")],
    };

    assert!(matches!(
      workflow.validate(),
      Err(WorkflowError::UnknownEdgeEndpoint { to, .. }) if to == "ghost"
    ));
  }

  #[test]
  fn validate_rejects_zero_attempt_retry() {
    let mut flaky = step("a");
    flaky.retry = Some(RetryPolicy {
      max_attempts: 0,
      backoff: "exponential".to_string(),
    });
    let workflow = Workflow {
      id: "wf-1".to_string(),
      name: "Test".to_string(),
      steps: vec![flaky],
      edges: vec![],
    };

    assert!(matches!(
      workflow.validate(),
      Err(WorkflowError::InvalidRetry(id)) if id == "a"
    ));
  }
}
