use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use sire_dispatch::{DispatchError, Tool};
use tokio_util::sync::CancellationToken;

/// Expected input shape for `http.request`.
#[derive(Debug, Deserialize)]
struct HttpInput {
  method: String,
  url: String,
  #[serde(default)]
  headers: HashMap<String, String>,
  #[serde(default)]
  body: Option<Value>,
}

/// `http.request {method, url, headers?, body?} -> {status, headers, body}`
///
/// The response body is parsed as JSON when possible and returned as a
/// string otherwise.
pub struct HttpRequest {
  client: Client,
}

impl HttpRequest {
  pub fn new() -> Self {
    Self {
      client: Client::new(),
    }
  }
}

impl Default for HttpRequest {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl Tool for HttpRequest {
  async fn call(
    &self,
    params: Map<String, Value>,
    cancel: CancellationToken,
  ) -> Result<Map<String, Value>, DispatchError> {
    let input: HttpInput = serde_json::from_value(Value::Object(params))
      .map_err(|e| DispatchError::LocalTool(format!("invalid http.request inputs: {}", e)))?;

    let method = parse_method(&input.method)?;

    let mut request = self.client.request(method, &input.url);
    for (key, value) in &input.headers {
      request = request.header(key, value);
    }
    if let Some(body) = &input.body {
      request = request.json(body);
    }

    let response = tokio::select! {
      _ = cancel.cancelled() => return Err(DispatchError::Canceled),
      response = request.send() => {
        response.map_err(|e| DispatchError::LocalTool(format!("request failed: {}", e)))?
      }
    };

    let status = response.status().as_u16();
    let headers: HashMap<String, String> = response
      .headers()
      .iter()
      .filter_map(|(k, v)| {
        v.to_str()
          .ok()
          .map(|value| (k.as_str().to_string(), value.to_string()))
      })
      .collect();

    let body = response
      .text()
      .await
      .map_err(|e| DispatchError::LocalTool(format!("failed to read response body: {}", e)))?;
    let body_value = serde_json::from_str(&body).unwrap_or(Value::String(body));

    let mut output = Map::new();
    output.insert("status".to_string(), json!(status));
    output.insert("headers".to_string(), json!(headers));
    output.insert("body".to_string(), body_value);
    Ok(output)
  }
}

fn parse_method(method: &str) -> Result<Method, DispatchError> {
  match method.to_uppercase().as_str() {
    "GET" => Ok(Method::GET),
    "POST" => Ok(Method::POST),
    "PUT" => Ok(Method::PUT),
    "DELETE" => Ok(Method::DELETE),
    "PATCH" => Ok(Method::PATCH),
    "HEAD" => Ok(Method::HEAD),
    "OPTIONS" => Ok(Method::OPTIONS),
    other => Err(DispatchError::LocalTool(format!(
      "unsupported HTTP method: {}",
      other
    ))),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use axum::routing::get;
  use axum::{Json, Router};

  async fn serve_json() -> String {
    let app = Router::new().route(
      "/data",
      get(|| async { Json(json!({ "message": "pong" })) }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/data", addr)
  }

  fn params(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
      .iter()
      .map(|(k, v)| (k.to_string(), v.clone()))
      .collect()
  }

  #[tokio::test]
  async fn get_request_returns_parsed_json_body() {
    let url = serve_json().await;

    let output = HttpRequest::new()
      .call(
        params(&[("method", json!("get")), ("url", json!(url))]),
        CancellationToken::new(),
      )
      .await
      .unwrap();

    assert_eq!(output["status"], 200);
    assert_eq!(output["body"]["message"], "pong");
  }

  #[tokio::test]
  async fn unsupported_method_fails() {
    let result = HttpRequest::new()
      .call(
        params(&[("method", json!("BREW")), ("url", json!("http://localhost"))]),
        CancellationToken::new(),
      )
      .await;
    assert!(matches!(
      result,
      Err(DispatchError::LocalTool(message)) if message.contains("unsupported HTTP method")
    ));
  }

  #[tokio::test]
  async fn missing_url_fails() {
    let result = HttpRequest::new()
      .call(params(&[("method", json!("GET"))]), CancellationToken::new())
      .await;
    assert!(matches!(result, Err(DispatchError::LocalTool(_))));
  }
}
