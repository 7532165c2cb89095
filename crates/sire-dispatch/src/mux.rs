use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::error::DispatchError;
use crate::uri;
use crate::Dispatcher;

/// Routes tool references to sub-dispatchers by URI scheme.
///
/// The mux is itself a [`Dispatcher`], so muxes can nest and tests can wrap
/// individual transports.
#[derive(Default)]
pub struct DispatcherMux {
  dispatchers: HashMap<String, Arc<dyn Dispatcher>>,
}

impl DispatcherMux {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a dispatcher for a scheme. Later registrations replace
  /// earlier ones.
  pub fn register(&mut self, scheme: impl Into<String>, dispatcher: Arc<dyn Dispatcher>) {
    self.dispatchers.insert(scheme.into(), dispatcher);
  }
}

#[async_trait]
impl Dispatcher for DispatcherMux {
  async fn dispatch(
    &self,
    tool: &str,
    params: Map<String, Value>,
    cancel: CancellationToken,
  ) -> Result<Map<String, Value>, DispatchError> {
    let scheme = uri::scheme(tool)?;

    let dispatcher = self
      .dispatchers
      .get(scheme)
      .ok_or_else(|| DispatchError::UnknownScheme(scheme.to_string()))?;

    dispatcher.dispatch(tool, params, cancel).await
  }
}
