//! Sire Tools
//!
//! Built-in local tools, registered under `sire:local/...`:
//!
//! - `file.read` / `file.write` - local filesystem access
//! - `http.request` - arbitrary HTTP requests
//! - `transform.map` / `transform.filter` / `transform.reduce` - expression
//!   based data transforms

mod file;
mod http;
mod transform;

use std::sync::Arc;

use serde_json::{Map, Value};
use sire_dispatch::{DispatchError, ToolRegistry};

pub use file::{FileRead, FileWrite};
pub use http::HttpRequest;
pub use transform::{Transform, TransformOp};

/// Register all built-in tools on a registry.
pub fn register_builtin(registry: &mut ToolRegistry) -> Result<(), DispatchError> {
  registry.register("file", "read", Arc::new(FileRead))?;
  registry.register("file", "write", Arc::new(FileWrite))?;
  registry.register("http", "request", Arc::new(HttpRequest::new()))?;
  registry.register("transform", "map", Arc::new(Transform::new(TransformOp::Map)))?;
  registry.register(
    "transform",
    "filter",
    Arc::new(Transform::new(TransformOp::Filter)),
  )?;
  registry.register(
    "transform",
    "reduce",
    Arc::new(Transform::new(TransformOp::Reduce)),
  )?;
  Ok(())
}

pub(crate) fn require_str<'a>(
  params: &'a Map<String, Value>,
  key: &str,
) -> Result<&'a str, DispatchError> {
  params.get(key).and_then(Value::as_str).ok_or_else(|| {
    DispatchError::LocalTool(format!(
      "parameter '{}' is required and must be a string",
      key
    ))
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builtin_registration_is_one_shot() {
    let mut registry = ToolRegistry::new();
    register_builtin(&mut registry).unwrap();

    // Registering again collides with the existing entries.
    assert!(matches!(
      register_builtin(&mut registry),
      Err(DispatchError::DuplicateTool { .. })
    ));
  }
}
