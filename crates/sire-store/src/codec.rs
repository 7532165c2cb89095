//! Versioned encoding of the persisted execution record.

use serde::{Deserialize, Serialize};
use sire_workflow::Execution;

use crate::error::StoreError;

/// Current schema version of the persisted envelope. Bump when the encoded
/// layout changes incompatibly; readers reject versions they do not know.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
  schema_version: u32,
  execution: &'a Execution,
}

#[derive(Deserialize)]
struct Envelope {
  schema_version: u32,
  execution: Execution,
}

pub(crate) fn encode(execution: &Execution) -> Result<String, StoreError> {
  serde_json::to_string(&EnvelopeRef {
    schema_version: SCHEMA_VERSION,
    execution,
  })
  .map_err(StoreError::Encode)
}

pub(crate) fn decode(data: &str) -> Result<Execution, StoreError> {
  let envelope: Envelope = serde_json::from_str(data).map_err(StoreError::Decode)?;
  if envelope.schema_version != SCHEMA_VERSION {
    return Err(StoreError::UnsupportedSchemaVersion(envelope.schema_version));
  }
  Ok(envelope.execution)
}
