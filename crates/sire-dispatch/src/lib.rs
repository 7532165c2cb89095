//! Sire Dispatch
//!
//! Tool dispatch for the workflow engine. A tool is referenced by URI; the
//! [`DispatcherMux`] routes on the URI scheme and forwards to a registered
//! sub-dispatcher. Two transports ship with the crate:
//!
//! - [`LocalDispatcher`]: `sire:local/service.method` looked up in an
//!   in-process [`ToolRegistry`].
//! - [`RemoteDispatcher`]: `mcp:http[s]://host/path#service.method` invoked
//!   as a JSON-RPC 2.0 call.
//!
//! The mux is itself a [`Dispatcher`], so dispatchers compose.

mod error;
mod local;
mod mux;
mod remote;
mod uri;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

pub use error::DispatchError;
pub use local::{LocalDispatcher, Tool, ToolRegistry};
pub use mux::DispatcherMux;
pub use remote::RemoteDispatcher;
pub use uri::{LocalToolRef, RemoteToolRef};

/// Capability to execute a tool given its URI and an input mapping.
#[async_trait]
pub trait Dispatcher: Send + Sync {
  /// Execute `tool` with `params`, honoring `cancel`. A canceled dispatch
  /// must abort and return [`DispatchError::Canceled`].
  async fn dispatch(
    &self,
    tool: &str,
    params: Map<String, Value>,
    cancel: CancellationToken,
  ) -> Result<Map<String, Value>, DispatchError>;
}
