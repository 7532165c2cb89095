//! Tool URI parsing.
//!
//! Grammar:
//!
//! ```text
//! local-tool  = "sire:local/" service "." method
//! remote-tool = "mcp:" scheme "://" host [":" port] path "#" service "." method
//! ```

use reqwest::Url;

use crate::error::DispatchError;

/// A parsed `sire:local/...` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalToolRef {
  pub service: String,
  pub method: String,
}

/// A parsed `mcp:...` reference: the HTTP endpoint to POST to and the
/// JSON-RPC method name.
#[derive(Debug, Clone)]
pub struct RemoteToolRef {
  pub endpoint: Url,
  pub method: String,
}

fn invalid(uri: &str, message: impl Into<String>) -> DispatchError {
  DispatchError::InvalidToolUri {
    uri: uri.to_string(),
    message: message.into(),
  }
}

/// Extract the URI scheme, i.e. everything before the first `:`.
pub(crate) fn scheme(uri: &str) -> Result<&str, DispatchError> {
  match uri.split_once(':') {
    Some((scheme, _)) if !scheme.is_empty() => Ok(scheme),
    _ => Err(invalid(uri, "missing scheme")),
  }
}

impl LocalToolRef {
  /// Parse a `sire:local/service.method` reference.
  pub fn parse(uri: &str) -> Result<Self, DispatchError> {
    let rest = uri
      .strip_prefix("sire:")
      .ok_or_else(|| invalid(uri, "expected sire:local/service.method"))?;
    let service_method = rest
      .strip_prefix("local/")
      .ok_or_else(|| invalid(uri, "expected sire:local/service.method"))?;

    let (service, method) = service_method
      .split_once('.')
      .ok_or_else(|| invalid(uri, "expected sire:local/service.method"))?;
    if service.is_empty() || method.is_empty() {
      return Err(invalid(uri, "expected sire:local/service.method"));
    }

    Ok(Self {
      service: service.to_string(),
      method: method.to_string(),
    })
  }
}

impl RemoteToolRef {
  /// Parse an `mcp:http[s]://host[:port]/path#service.method` reference.
  pub fn parse(uri: &str) -> Result<Self, DispatchError> {
    let rest = uri
      .strip_prefix("mcp:")
      .ok_or_else(|| invalid(uri, "expected mcp:http://host/path#service.method"))?;

    let mut endpoint =
      Url::parse(rest).map_err(|e| invalid(uri, format!("invalid RPC URL: {}", e)))?;
    if !matches!(endpoint.scheme(), "http" | "https") {
      return Err(invalid(uri, "RPC URL must be http or https"));
    }
    if !endpoint.has_host() {
      return Err(invalid(uri, "missing host in RPC URL"));
    }

    let method = match endpoint.fragment() {
      Some(fragment) if !fragment.is_empty() => fragment.to_string(),
      _ => return Err(invalid(uri, "missing tool name (service.method) fragment")),
    };
    if !method.contains('.') {
      return Err(invalid(uri, "tool name must be of form service.method"));
    }
    endpoint.set_fragment(None);

    Ok(Self { endpoint, method })
  }
}
