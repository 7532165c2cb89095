use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::DispatchError;
use crate::uri::LocalToolRef;
use crate::Dispatcher;

/// An in-process tool callable by the local dispatcher.
#[async_trait]
pub trait Tool: Send + Sync {
  async fn call(
    &self,
    params: Map<String, Value>,
    cancel: CancellationToken,
  ) -> Result<Map<String, Value>, DispatchError>;
}

/// Registry of in-process tools, keyed by `(service, method)`.
///
/// Built once at startup and then shared read-only; registration is one-shot
/// and a duplicate fails loudly rather than silently replacing a tool.
#[derive(Default)]
pub struct ToolRegistry {
  tools: HashMap<(String, String), Arc<dyn Tool>>,
}

impl ToolRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a tool under `service.method`.
  pub fn register(
    &mut self,
    service: &str,
    method: &str,
    tool: Arc<dyn Tool>,
  ) -> Result<(), DispatchError> {
    let key = (service.to_string(), method.to_string());
    if self.tools.contains_key(&key) {
      return Err(DispatchError::DuplicateTool {
        service: service.to_string(),
        method: method.to_string(),
      });
    }
    self.tools.insert(key, tool);
    Ok(())
  }

  /// Register an async function as a tool. Convenient for tests and tools
  /// that do not need cancellation awareness.
  pub fn register_fn<F, Fut>(
    &mut self,
    service: &str,
    method: &str,
    f: F,
  ) -> Result<(), DispatchError>
  where
    F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Map<String, Value>, DispatchError>> + Send + 'static,
  {
    self.register(service, method, Arc::new(FnTool { f }))
  }

  fn get(&self, service: &str, method: &str) -> Option<Arc<dyn Tool>> {
    self
      .tools
      .get(&(service.to_string(), method.to_string()))
      .cloned()
  }
}

struct FnTool<F> {
  f: F,
}

#[async_trait]
impl<F, Fut> Tool for FnTool<F>
where
  F: Fn(Map<String, Value>) -> Fut + Send + Sync,
  Fut: Future<Output = Result<Map<String, Value>, DispatchError>> + Send,
{
  async fn call(
    &self,
    params: Map<String, Value>,
    _cancel: CancellationToken,
  ) -> Result<Map<String, Value>, DispatchError> {
    (self.f)(params).await
  }
}

/// Dispatcher for `sire:local/...` tool references.
pub struct LocalDispatcher {
  registry: Arc<ToolRegistry>,
}

impl LocalDispatcher {
  pub fn new(registry: Arc<ToolRegistry>) -> Self {
    Self { registry }
  }
}

#[async_trait]
impl Dispatcher for LocalDispatcher {
  async fn dispatch(
    &self,
    tool: &str,
    params: Map<String, Value>,
    cancel: CancellationToken,
  ) -> Result<Map<String, Value>, DispatchError> {
    let tool_ref = LocalToolRef::parse(tool)?;

    let callable = self
      .registry
      .get(&tool_ref.service, &tool_ref.method)
      .ok_or_else(|| DispatchError::ToolNotFound {
        service: tool_ref.service.clone(),
        method: tool_ref.method.clone(),
      })?;

    debug!(service = %tool_ref.service, method = %tool_ref.method, "dispatching local tool");

    tokio::select! {
      _ = cancel.cancelled() => Err(DispatchError::Canceled),
      result = callable.call(params, cancel.clone()) => result,
    }
  }
}
