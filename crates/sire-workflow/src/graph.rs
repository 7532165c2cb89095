use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};

use crate::error::WorkflowError;
use crate::execution::{StepState, StepStatus};
use crate::workflow::Workflow;

/// Graph structure for traversal and analysis.
///
/// Upstream lists preserve edge-declaration order; the input-merge rules
/// depend on it when a step has multiple predecessors.
#[derive(Debug, Clone)]
pub struct Graph {
  /// Step IDs in declaration order.
  order: Vec<String>,
  /// Adjacency list: step_id -> downstream step_ids.
  adjacency: HashMap<String, Vec<String>>,
  /// Reverse adjacency: step_id -> upstream step_ids.
  reverse_adjacency: HashMap<String, Vec<String>>,
}

impl Graph {
  /// Build a graph from a workflow's steps and edges.
  pub fn new(workflow: &Workflow) -> Self {
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    let mut reverse_adjacency: HashMap<String, Vec<String>> = HashMap::new();

    let order: Vec<String> = workflow.steps.iter().map(|s| s.id.clone()).collect();
    for step_id in &order {
      adjacency.entry(step_id.clone()).or_default();
      reverse_adjacency.entry(step_id.clone()).or_default();
    }

    for edge in &workflow.edges {
      adjacency
        .entry(edge.from.clone())
        .or_default()
        .push(edge.to.clone());
      reverse_adjacency
        .entry(edge.to.clone())
        .or_default()
        .push(edge.from.clone());
    }

    Self {
      order,
      adjacency,
      reverse_adjacency,
    }
  }

  /// Get downstream steps for a given step.
  pub fn downstream(&self, step_id: &str) -> &[String] {
    self
      .adjacency
      .get(step_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Get upstream steps for a given step, in edge-declaration order.
  pub fn upstream(&self, step_id: &str) -> &[String] {
    self
      .reverse_adjacency
      .get(step_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Kahn's algorithm: repeatedly take steps with no unprocessed
  /// predecessors. Ties break by step-declaration order, so the result is
  /// deterministic for a given workflow.
  ///
  /// Fails with [`WorkflowError::CycleDetected`] when the edge set contains
  /// a cycle.
  pub fn topological_order(&self) -> Result<Vec<String>, WorkflowError> {
    let mut in_degree: HashMap<&str, usize> = self
      .order
      .iter()
      .map(|id| (id.as_str(), self.upstream(id).len()))
      .collect();

    let mut queue: VecDeque<&str> = self
      .order
      .iter()
      .map(String::as_str)
      .filter(|id| in_degree[id] == 0)
      .collect();

    let mut result = Vec::with_capacity(self.order.len());
    while let Some(step_id) = queue.pop_front() {
      result.push(step_id.to_string());

      for next in self.downstream(step_id) {
        let degree = in_degree.entry(next.as_str()).or_insert(0);
        *degree = degree.saturating_sub(1);
        if *degree == 0 {
          queue.push_back(next.as_str());
        }
      }
    }

    if result.len() != self.order.len() {
      return Err(WorkflowError::CycleDetected);
    }

    Ok(result)
  }

  /// Steps that may be dispatched now.
  ///
  /// A step is ready when it is not terminal, is not waiting out a retry
  /// backoff, and every predecessor has completed. A persisted `running`
  /// state counts as ready: it means a previous process crashed between the
  /// running checkpoint and the step's result.
  pub fn ready_steps(
    &self,
    step_states: &HashMap<String, StepState>,
    now: DateTime<Utc>,
  ) -> Vec<String> {
    self
      .order
      .iter()
      .filter(|id| {
        let dispatchable = match step_states.get(*id) {
          None => true,
          Some(state) => match state.status {
            StepStatus::Pending | StepStatus::Running => true,
            StepStatus::Completed | StepStatus::Failed => false,
            StepStatus::Retrying => state.next_attempt.is_none_or(|next| next <= now),
          },
        };

        dispatchable
          && self.upstream(id).iter().all(|pred| {
            step_states
              .get(pred)
              .is_some_and(|s| s.status == StepStatus::Completed)
          })
      })
      .cloned()
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::workflow::{Edge, Step};
  use chrono::Duration;
  use serde_json::Map;

  fn workflow(steps: &[&str], edges: &[(&str, &str)]) -> Workflow {
    Workflow {
      id: "wf".to_string(),
      name: "wf".to_string(),
      steps: steps
        .iter()
        .map(|id| Step {
          id: id.to_string(),
          tool: format!("sire:local/test.{}", id),
          params: Map::new(),
          retry: None,
        })
        .collect(),
      edges: edges
        .iter()
        .map(|(from, to)| Edge {
          from: from.to_string(),
          to: to.to_string(),
        })
        .collect(),
    }
  }

  fn state(status: StepStatus) -> StepState {
    StepState {
      status,
      ..StepState::default()
    }
  }

  #[test]
  fn topological_order_linear() {
    let graph = workflow(&["a", "b", "c"], &[("a", "b"), ("b", "c")]).graph();
    assert_eq!(graph.topological_order().unwrap(), vec!["a", "b", "c"]);
  }

  #[test]
  fn topological_order_diamond_is_deterministic() {
    let graph = workflow(
      &["a", "b", "c", "d"],
      &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")],
    )
    .graph();

    // Declaration order breaks the b/c tie.
    assert_eq!(graph.topological_order().unwrap(), vec!["a", "b", "c", "d"]);
  }

  #[test]
  fn topological_order_detects_cycle() {
    let graph = workflow(&["a", "b"], &[("a", "b"), ("b", "a")]).graph();
    assert!(matches!(
      graph.topological_order(),
      Err(WorkflowError::CycleDetected)
    ));
  }

  #[test]
  fn ready_steps_waits_for_predecessors() {
    let graph = workflow(&["a", "b"], &[("a", "b")]).graph();
    let now = Utc::now();

    let mut states = HashMap::new();
    assert_eq!(graph.ready_steps(&states, now), vec!["a"]);

    states.insert("a".to_string(), state(StepStatus::Completed));
    assert_eq!(graph.ready_steps(&states, now), vec!["b"]);
  }

  #[test]
  fn ready_steps_skips_terminal_states() {
    let graph = workflow(&["a", "b"], &[]).graph();
    let now = Utc::now();

    let mut states = HashMap::new();
    states.insert("a".to_string(), state(StepStatus::Completed));
    states.insert("b".to_string(), state(StepStatus::Failed));

    assert!(graph.ready_steps(&states, now).is_empty());
  }

  #[test]
  fn ready_steps_includes_crashed_running_step() {
    let graph = workflow(&["a"], &[]).graph();
    let mut states = HashMap::new();
    states.insert("a".to_string(), state(StepStatus::Running));

    assert_eq!(graph.ready_steps(&states, Utc::now()), vec!["a"]);
  }

  #[test]
  fn ready_steps_honors_retry_backoff() {
    let graph = workflow(&["a"], &[]).graph();
    let now = Utc::now();

    let mut states = HashMap::new();
    states.insert(
      "a".to_string(),
      StepState {
        status: StepStatus::Retrying,
        next_attempt: Some(now + Duration::minutes(1)),
        ..StepState::default()
      },
    );
    assert!(graph.ready_steps(&states, now).is_empty());

    states.get_mut("a").unwrap().next_attempt = Some(now - Duration::seconds(1));
    assert_eq!(graph.ready_steps(&states, now), vec!["a"]);
  }
}
