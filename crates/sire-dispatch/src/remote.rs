use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::DispatchError;
use crate::uri::RemoteToolRef;
use crate::Dispatcher;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A JSON-RPC 2.0 request.
#[derive(Debug, Serialize)]
struct JsonRpcRequest {
  jsonrpc: &'static str,
  method: String,
  params: Value,
  id: u64,
}

/// A JSON-RPC 2.0 response.
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
  #[serde(default)]
  result: Option<Value>,
  #[serde(default)]
  error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
  code: i64,
  message: String,
}

/// Dispatcher for `mcp:...` tool references, speaking JSON-RPC 2.0 over
/// HTTP.
pub struct RemoteDispatcher {
  client: reqwest::Client,
}

impl RemoteDispatcher {
  /// Create a dispatcher with the default 30 s request timeout.
  pub fn new() -> Self {
    Self::with_timeout(DEFAULT_TIMEOUT)
  }

  pub fn with_timeout(timeout: Duration) -> Self {
    Self {
      client: reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default(),
    }
  }
}

impl Default for RemoteDispatcher {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl Dispatcher for RemoteDispatcher {
  async fn dispatch(
    &self,
    tool: &str,
    params: Map<String, Value>,
    cancel: CancellationToken,
  ) -> Result<Map<String, Value>, DispatchError> {
    let tool_ref = RemoteToolRef::parse(tool)?;

    let request = JsonRpcRequest {
      jsonrpc: "2.0",
      method: tool_ref.method.clone(),
      params: Value::Object(params),
      id: 1,
    };

    debug!(endpoint = %tool_ref.endpoint, method = %tool_ref.method, "dispatching remote tool");

    let response = tokio::select! {
      _ = cancel.cancelled() => return Err(DispatchError::Canceled),
      response = self.client.post(tool_ref.endpoint.clone()).json(&request).send() => {
        response.map_err(|e| DispatchError::Transport(e.to_string()))?
      }
    };

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(DispatchError::Transport(format!(
        "remote server returned status {}: {}",
        status.as_u16(),
        body
      )));
    }

    let rpc_response: JsonRpcResponse = response
      .json()
      .await
      .map_err(|e| DispatchError::InvalidResponse(e.to_string()))?;

    if let Some(error) = rpc_response.error {
      return Err(DispatchError::RemoteTool {
        code: error.code,
        message: error.message,
      });
    }

    match rpc_response.result {
      None | Some(Value::Null) => Ok(Map::new()),
      Some(Value::Object(output)) => Ok(output),
      Some(other) => Err(DispatchError::InvalidResponse(format!(
        "result must be a JSON object, got {}",
        other
      ))),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use axum::routing::post;
  use axum::{Json, Router};
  use serde_json::json;

  /// Serve `handler` on an ephemeral port and return the `mcp:` tool URI
  /// pointing at it.
  async fn serve(response: Value) -> String {
    let app = Router::new().route(
      "/rpc",
      post(move |Json(request): Json<Value>| {
        let mut response = response.clone();
        if let Some(obj) = response.as_object_mut() {
          obj.insert("jsonrpc".to_string(), json!("2.0"));
          obj.insert("id".to_string(), request["id"].clone());
        }
        async move { Json(response) }
      }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      axum::serve(listener, app).await.unwrap();
    });

    format!("mcp:http://{}/rpc#math.add", addr)
  }

  #[tokio::test]
  async fn dispatches_successful_call() {
    let uri = serve(json!({ "result": { "sum": 3 } })).await;
    let dispatcher = RemoteDispatcher::new();

    let mut params = Map::new();
    params.insert("a".to_string(), json!(1));
    params.insert("b".to_string(), json!(2));

    let output = dispatcher
      .dispatch(&uri, params, CancellationToken::new())
      .await
      .unwrap();
    assert_eq!(output["sum"], 3);
  }

  #[tokio::test]
  async fn surfaces_rpc_error_object() {
    let uri = serve(json!({
      "error": { "code": -32000, "message": "division by zero" }
    }))
    .await;
    let dispatcher = RemoteDispatcher::new();

    let err = dispatcher
      .dispatch(&uri, Map::new(), CancellationToken::new())
      .await
      .unwrap_err();
    assert_eq!(
      err.to_string(),
      "remote tool error (code -32000): division by zero"
    );
  }

  #[tokio::test]
  async fn rejects_non_object_result() {
    let uri = serve(json!({ "result": [1, 2, 3] })).await;
    let dispatcher = RemoteDispatcher::new();

    let err = dispatcher
      .dispatch(&uri, Map::new(), CancellationToken::new())
      .await
      .unwrap_err();
    assert!(matches!(err, DispatchError::InvalidResponse(_)));
  }

  #[tokio::test]
  async fn null_result_is_empty_output() {
    let uri = serve(json!({ "result": null })).await;
    let dispatcher = RemoteDispatcher::new();

    let output = dispatcher
      .dispatch(&uri, Map::new(), CancellationToken::new())
      .await
      .unwrap();
    assert!(output.is_empty());
  }

  #[tokio::test]
  async fn non_success_status_is_transport_error() {
    let app = Router::new().route(
      "/rpc",
      post(|| async { (axum::http::StatusCode::BAD_GATEWAY, "upstream down") }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      axum::serve(listener, app).await.unwrap();
    });

    let dispatcher = RemoteDispatcher::new();
    let err = dispatcher
      .dispatch(
        &format!("mcp:http://{}/rpc#math.add", addr),
        Map::new(),
        CancellationToken::new(),
      )
      .await
      .unwrap_err();

    assert!(matches!(err, DispatchError::Transport(_)));
    assert!(err.to_string().contains("502"));
  }

  #[tokio::test]
  async fn unreachable_endpoint_is_transport_error() {
    let dispatcher = RemoteDispatcher::with_timeout(Duration::from_millis(200));

    // Port 9 (discard) is near-certainly closed.
    let err = dispatcher
      .dispatch(
        "mcp:http://127.0.0.1:9/rpc#math.add",
        Map::new(),
        CancellationToken::new(),
      )
      .await
      .unwrap_err();
    assert!(matches!(err, DispatchError::Transport(_)));
  }
}
