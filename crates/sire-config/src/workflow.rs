use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sire_workflow::{Edge, RetryPolicy, Step, Workflow};

use crate::error::ConfigError;

/// A workflow document as authored by the user.
///
/// Field names are the stable wire surface; they match the YAML/JSON schema
/// exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDoc {
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub steps: Vec<StepDoc>,
  #[serde(default)]
  pub edges: Vec<EdgeDoc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDoc {
  pub id: String,
  pub tool: String,
  #[serde(default)]
  pub params: Map<String, Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub retry: Option<RetryDoc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryDoc {
  pub max_attempts: u32,
  pub backoff: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDoc {
  pub from: String,
  pub to: String,
}

impl WorkflowDoc {
  /// Parse a YAML document.
  pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
    Ok(serde_yaml::from_str(content)?)
  }

  /// Parse a JSON document.
  pub fn from_json(content: &str) -> Result<Self, ConfigError> {
    Ok(serde_json::from_str(content)?)
  }

  /// Read a document from disk, picking the format by file extension.
  /// Anything that is not `.json` is treated as YAML, which also accepts
  /// JSON input.
  pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
      .await
      .map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
      })?;

    match path.extension().and_then(|e| e.to_str()) {
      Some("json") => Self::from_json(&content),
      _ => Self::from_yaml(&content),
    }
  }

  /// Convert into a validated [`Workflow`].
  pub fn into_workflow(self) -> Result<Workflow, ConfigError> {
    let workflow = Workflow {
      id: self.id,
      name: self.name,
      steps: self
        .steps
        .into_iter()
        .map(|step| Step {
          id: step.id,
          tool: step.tool,
          params: step.params,
          retry: step.retry.map(|retry| RetryPolicy {
            max_attempts: retry.max_attempts,
            backoff: retry.backoff,
          }),
        })
        .collect(),
      edges: self
        .edges
        .into_iter()
        .map(|edge| Edge {
          from: edge.from,
          to: edge.to,
        })
        .collect(),
    };

    workflow.validate()?;
    Ok(workflow)
  }
}
