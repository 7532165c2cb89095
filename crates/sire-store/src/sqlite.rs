use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sire_workflow::Execution;
use sqlx::sqlite::{
  SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

use crate::codec;
use crate::error::StoreError;
use crate::Store;

/// SQLite-backed execution store.
///
/// One row per execution: the JSON-encoded record plus the columns the
/// pending scan filters on. Commits are fully synchronous, so a completed
/// `save` survives a process crash; a crash mid-save leaves the previous
/// committed row intact.
pub struct SqliteStore {
  pool: SqlitePool,
}

impl SqliteStore {
  /// Create a store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Open (or create) the database file at `path` and run migrations.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
    let options = SqliteConnectOptions::new()
      .filename(path)
      .create_if_missing(true)
      .journal_mode(SqliteJournalMode::Wal)
      .synchronous(SqliteSynchronous::Full);

    let pool = SqlitePoolOptions::new()
      .max_connections(5)
      .connect_with(options)
      .await?;

    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), StoreError> {
    sqlx::migrate!("../../migrations").run(&self.pool).await?;
    Ok(())
  }
}

#[async_trait]
impl Store for SqliteStore {
  async fn save(&self, execution: &mut Execution) -> Result<(), StoreError> {
    let mut tx = self.pool.begin().await?;

    let existing_created_at: Option<DateTime<Utc>> =
      sqlx::query_scalar("SELECT created_at FROM executions WHERE id = ?")
        .bind(&execution.id)
        .fetch_optional(&mut *tx)
        .await?;

    let now = Utc::now();
    if let Some(created_at) = existing_created_at {
      execution.created_at = created_at;
    }
    execution.updated_at = now;

    let data = codec::encode(execution)?;

    sqlx::query(
      r#"
            INSERT INTO executions (id, workflow_id, status, data, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
              workflow_id = excluded.workflow_id,
              status = excluded.status,
              data = excluded.data,
              updated_at = excluded.updated_at
            "#,
    )
    .bind(&execution.id)
    .bind(&execution.workflow_id)
    .bind(execution.status.as_str())
    .bind(&data)
    .bind(execution.created_at)
    .bind(execution.updated_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
  }

  async fn load(&self, id: &str) -> Result<Execution, StoreError> {
    let data: Option<String> = sqlx::query_scalar("SELECT data FROM executions WHERE id = ?")
      .bind(id)
      .fetch_optional(&self.pool)
      .await?;

    match data {
      Some(data) => codec::decode(&data),
      None => Err(StoreError::NotFound(id.to_string())),
    }
  }

  async fn list_pending(&self) -> Result<Vec<Execution>, StoreError> {
    let rows: Vec<String> = sqlx::query_scalar(
      r#"
            SELECT data FROM executions
            WHERE status IN ('running', 'retrying')
            ORDER BY created_at ASC
            "#,
    )
    .fetch_all(&self.pool)
    .await?;

    rows.iter().map(|data| codec::decode(data)).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use sire_workflow::{ExecutionStatus, StepState, StepStatus, Workflow};

  fn workflow() -> Workflow {
    Workflow {
      id: "wf".to_string(),
      name: "Test".to_string(),
      steps: vec![],
      edges: vec![],
    }
  }

  async fn open_temp_store() -> (SqliteStore, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let store = SqliteStore::open(dir.path().join("sire.db"))
      .await
      .expect("failed to open store");
    (store, dir)
  }

  #[tokio::test]
  async fn save_and_load_round_trips() {
    let (store, _dir) = open_temp_store().await;

    let mut execution = Execution::new(&workflow());
    execution.step_states.insert(
      "a".to_string(),
      StepState {
        status: StepStatus::Completed,
        output: serde_json::from_str("{\"x\":\"hello\"}").unwrap(),
        ..StepState::default()
      },
    );

    store.save(&mut execution).await.unwrap();
    let loaded = store.load(&execution.id).await.unwrap();
    assert_eq!(loaded, execution);
  }

  #[tokio::test]
  async fn load_missing_is_not_found() {
    let (store, _dir) = open_temp_store().await;
    assert!(matches!(
      store.load("nope").await,
      Err(StoreError::NotFound(_))
    ));
  }

  #[tokio::test]
  async fn second_save_preserves_created_at_and_advances_updated_at() {
    let (store, _dir) = open_temp_store().await;

    let mut execution = Execution::new(&workflow());
    store.save(&mut execution).await.unwrap();
    let created_at = execution.created_at;
    let first_updated_at = execution.updated_at;

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    execution.status = ExecutionStatus::Completed;
    store.save(&mut execution).await.unwrap();

    assert_eq!(execution.created_at, created_at);
    assert!(execution.updated_at >= first_updated_at);

    let loaded = store.load(&execution.id).await.unwrap();
    assert_eq!(loaded.status, ExecutionStatus::Completed);
    assert_eq!(loaded.created_at, created_at);
  }

  #[tokio::test]
  async fn list_pending_filters_terminal_executions() {
    let (store, _dir) = open_temp_store().await;

    let mut running = Execution::new(&workflow());
    store.save(&mut running).await.unwrap();

    let mut retrying = Execution::new(&workflow());
    retrying.status = ExecutionStatus::Retrying;
    store.save(&mut retrying).await.unwrap();

    let mut completed = Execution::new(&workflow());
    completed.status = ExecutionStatus::Completed;
    store.save(&mut completed).await.unwrap();

    let mut failed = Execution::new(&workflow());
    failed.status = ExecutionStatus::Failed;
    store.save(&mut failed).await.unwrap();

    let pending = store.list_pending().await.unwrap();
    let ids: Vec<&str> = pending.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(pending.len(), 2);
    assert!(ids.contains(&running.id.as_str()));
    assert!(ids.contains(&retrying.id.as_str()));
  }

  #[tokio::test]
  async fn store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sire.db");

    let mut execution = Execution::new(&workflow());
    {
      let store = SqliteStore::open(&path).await.unwrap();
      store.save(&mut execution).await.unwrap();
    }

    let store = SqliteStore::open(&path).await.unwrap();
    let loaded = store.load(&execution.id).await.unwrap();
    assert_eq!(loaded, execution);
  }
}
