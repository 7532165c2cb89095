use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read workflow file {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse workflow document: {0}")]
  Yaml(#[from] serde_yaml::Error),

  #[error("failed to parse workflow document: {0}")]
  Json(#[from] serde_json::Error),

  #[error(transparent)]
  Invalid(#[from] sire_workflow::WorkflowError),
}
