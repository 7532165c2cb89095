use thiserror::Error;

/// Errors produced while dispatching a tool.
#[derive(Debug, Error)]
pub enum DispatchError {
  #[error("no dispatcher registered for scheme '{0}'")]
  UnknownScheme(String),

  #[error("invalid tool URI '{uri}': {message}")]
  InvalidToolUri { uri: String, message: String },

  #[error("tool '{service}.{method}' is already registered")]
  DuplicateTool { service: String, method: String },

  #[error("tool '{service}.{method}' not found")]
  ToolNotFound { service: String, method: String },

  /// A local tool ran and reported a failure.
  #[error("local tool error: {0}")]
  LocalTool(String),

  /// The remote endpoint could not be reached or answered outside 2xx.
  #[error("transport error: {0}")]
  Transport(String),

  /// The remote endpoint answered with a JSON-RPC error object.
  #[error("remote tool error (code {code}): {message}")]
  RemoteTool { code: i64, message: String },

  /// The remote endpoint answered 2xx but the payload was not usable.
  #[error("invalid remote tool response: {0}")]
  InvalidResponse(String),

  #[error("dispatch canceled")]
  Canceled,
}

impl DispatchError {
  /// Whether a step hitting this error may be retried under its policy.
  /// Tool and transport failures are transient; everything else is a
  /// configuration or caller problem that retrying cannot fix.
  pub fn is_retryable(&self) -> bool {
    matches!(
      self,
      DispatchError::LocalTool(_)
        | DispatchError::Transport(_)
        | DispatchError::RemoteTool { .. }
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn transient_errors_are_retryable() {
    assert!(DispatchError::Transport("connection refused".to_string()).is_retryable());
    assert!(DispatchError::LocalTool("boom".to_string()).is_retryable());
    assert!(DispatchError::RemoteTool {
      code: -32000,
      message: "busy".to_string()
    }
    .is_retryable());
  }

  #[test]
  fn configuration_errors_are_not_retryable() {
    assert!(!DispatchError::UnknownScheme("ftp".to_string()).is_retryable());
    assert!(!DispatchError::Canceled.is_retryable());
    assert!(!DispatchError::ToolNotFound {
      service: "file".to_string(),
      method: "read".to_string()
    }
    .is_retryable());
  }

  #[test]
  fn remote_tool_error_display() {
    let err = DispatchError::RemoteTool {
      code: -32000,
      message: "division by zero".to_string(),
    };
    assert_eq!(
      err.to_string(),
      "remote tool error (code -32000): division by zero"
    );
  }
}
