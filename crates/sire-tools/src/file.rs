use async_trait::async_trait;
use serde_json::{json, Map, Value};
use sire_dispatch::{DispatchError, Tool};
use tokio_util::sync::CancellationToken;

use crate::require_str;

/// `file.read {path} -> {content}`
pub struct FileRead;

#[async_trait]
impl Tool for FileRead {
  async fn call(
    &self,
    params: Map<String, Value>,
    _cancel: CancellationToken,
  ) -> Result<Map<String, Value>, DispatchError> {
    let path = require_str(&params, "path")?;

    let content = tokio::fs::read_to_string(path)
      .await
      .map_err(|e| DispatchError::LocalTool(format!("failed to read file {}: {}", path, e)))?;

    let mut output = Map::new();
    output.insert("content".to_string(), json!(content));
    Ok(output)
  }
}

/// `file.write {path, content} -> {}`
pub struct FileWrite;

#[async_trait]
impl Tool for FileWrite {
  async fn call(
    &self,
    params: Map<String, Value>,
    _cancel: CancellationToken,
  ) -> Result<Map<String, Value>, DispatchError> {
    let path = require_str(&params, "path")?;
    let content = require_str(&params, "content")?;

    tokio::fs::write(path, content)
      .await
      .map_err(|e| DispatchError::LocalTool(format!("failed to write to file {}: {}", path, e)))?;

    Ok(Map::new())
  }
}
