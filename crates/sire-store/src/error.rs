use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("execution '{0}' not found")]
  NotFound(String),

  #[error("unsupported execution schema version {0}")]
  UnsupportedSchemaVersion(u32),

  #[error("failed to encode execution: {0}")]
  Encode(#[source] serde_json::Error),

  #[error("failed to decode execution: {0}")]
  Decode(#[source] serde_json::Error),

  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  #[error("migration error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),
}
