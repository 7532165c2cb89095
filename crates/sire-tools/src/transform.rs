use async_trait::async_trait;
use minijinja::Environment;
use serde_json::{Map, Value};
use sire_dispatch::{DispatchError, Tool};
use tokio_util::sync::CancellationToken;

use crate::require_str;

/// Which transform a [`Transform`] tool instance performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformOp {
  Map,
  Filter,
  Reduce,
}

impl TransformOp {
  fn name(&self) -> &'static str {
    match self {
      TransformOp::Map => "map",
      TransformOp::Filter => "filter",
      TransformOp::Reduce => "reduce",
    }
  }
}

/// `transform.{map,filter,reduce} {data, expression, initial?} -> {result}`
///
/// Expressions are evaluated per item with `item` bound (and `acc` for
/// reduce). Filter expressions must produce a truthy/falsy value.
pub struct Transform {
  op: TransformOp,
}

impl Transform {
  pub fn new(op: TransformOp) -> Self {
    Self { op }
  }

  fn eval_error(&self, err: minijinja::Error) -> DispatchError {
    DispatchError::LocalTool(format!("{} expression error: {}", self.op.name(), err))
  }
}

#[async_trait]
impl Tool for Transform {
  async fn call(
    &self,
    params: Map<String, Value>,
    _cancel: CancellationToken,
  ) -> Result<Map<String, Value>, DispatchError> {
    let data = params
      .get("data")
      .and_then(Value::as_array)
      .ok_or_else(|| {
        DispatchError::LocalTool("parameter 'data' is required and must be an array".to_string())
      })?;
    let expression = require_str(&params, "expression")?;

    let env = Environment::new();
    let expr = env
      .compile_expression(expression)
      .map_err(|e| self.eval_error(e))?;

    let result = match self.op {
      TransformOp::Map => {
        let mut mapped = Vec::with_capacity(data.len());
        for item in data {
          let value = expr
            .eval(minijinja::context! { item => item })
            .map_err(|e| self.eval_error(e))?;
          mapped.push(to_json(&value)?);
        }
        Value::Array(mapped)
      }
      TransformOp::Filter => {
        let mut kept = Vec::new();
        for item in data {
          let value = expr
            .eval(minijinja::context! { item => item })
            .map_err(|e| self.eval_error(e))?;
          if value.is_true() {
            kept.push(item.clone());
          }
        }
        Value::Array(kept)
      }
      TransformOp::Reduce => {
        let mut acc = params.get("initial").cloned().unwrap_or(Value::Null);
        for item in data {
          let value = expr
            .eval(minijinja::context! { acc => &acc, item => item })
            .map_err(|e| self.eval_error(e))?;
          acc = to_json(&value)?;
        }
        acc
      }
    };

    let mut output = Map::new();
    output.insert("result".to_string(), result);
    Ok(output)
  }
}

fn to_json(value: &minijinja::Value) -> Result<Value, DispatchError> {
  serde_json::to_value(value)
    .map_err(|e| DispatchError::LocalTool(format!("expression produced unserializable value: {}", e)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  async fn run(op: TransformOp, params: Map<String, Value>) -> Result<Value, DispatchError> {
    Transform::new(op)
      .call(params, CancellationToken::new())
      .await
      .map(|mut output| output.remove("result").unwrap_or(Value::Null))
  }

  fn params(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
      .iter()
      .map(|(k, v)| (k.to_string(), v.clone()))
      .collect()
  }

  #[tokio::test]
  async fn map_applies_expression_per_item() {
    let result = run(
      TransformOp::Map,
      params(&[
        ("data", json!([1, 2, 3])),
        ("expression", json!("item * 2")),
      ]),
    )
    .await
    .unwrap();
    assert_eq!(result, json!([2, 4, 6]));
  }

  #[tokio::test]
  async fn filter_keeps_truthy_items() {
    let result = run(
      TransformOp::Filter,
      params(&[
        ("data", json!([1, 5, 10, 2])),
        ("expression", json!("item > 2")),
      ]),
    )
    .await
    .unwrap();
    assert_eq!(result, json!([5, 10]));
  }

  #[tokio::test]
  async fn reduce_folds_with_initial_value() {
    let result = run(
      TransformOp::Reduce,
      params(&[
        ("data", json!([1, 2, 3, 4])),
        ("expression", json!("acc + item")),
        ("initial", json!(0)),
      ]),
    )
    .await
    .unwrap();
    assert_eq!(result, json!(10));
  }

  #[tokio::test]
  async fn map_over_objects() {
    let result = run(
      TransformOp::Map,
      params(&[
        ("data", json!([{ "name": "ada" }, { "name": "grace" }])),
        ("expression", json!("item.name")),
      ]),
    )
    .await
    .unwrap();
    assert_eq!(result, json!(["ada", "grace"]));
  }

  #[tokio::test]
  async fn invalid_expression_fails() {
    let result = run(
      TransformOp::Map,
      params(&[
        ("data", json!([1])),
        ("expression", json!("item +* 2")),
      ]),
    )
    .await;
    assert!(matches!(
      result,
      Err(DispatchError::LocalTool(message)) if message.contains("map expression error")
    ));
  }

  #[tokio::test]
  async fn non_array_data_fails() {
    let result = run(
      TransformOp::Map,
      params(&[("data", json!("nope")), ("expression", json!("item"))]),
    )
    .await;
    assert!(matches!(result, Err(DispatchError::LocalTool(_))));
  }
}
