use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sire_workflow::Execution;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::Store;

/// In-memory execution store with the same semantics as [`crate::SqliteStore`].
///
/// Used by tests and useful as a reference for the save/load contract; not
/// durable.
#[derive(Clone, Default)]
pub struct MemoryStore {
  executions: Arc<RwLock<HashMap<String, Execution>>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl Store for MemoryStore {
  async fn save(&self, execution: &mut Execution) -> Result<(), StoreError> {
    let mut executions = self.executions.write().await;

    if let Some(existing) = executions.get(&execution.id) {
      execution.created_at = existing.created_at;
    }
    execution.updated_at = Utc::now();

    executions.insert(execution.id.clone(), execution.clone());
    Ok(())
  }

  async fn load(&self, id: &str) -> Result<Execution, StoreError> {
    self
      .executions
      .read()
      .await
      .get(id)
      .cloned()
      .ok_or_else(|| StoreError::NotFound(id.to_string()))
  }

  async fn list_pending(&self) -> Result<Vec<Execution>, StoreError> {
    let executions = self.executions.read().await;
    let mut pending: Vec<Execution> = executions
      .values()
      .filter(|e| !e.status.is_terminal())
      .cloned()
      .collect();
    pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(pending)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use sire_workflow::{ExecutionStatus, Workflow};

  fn execution() -> Execution {
    Execution::new(&Workflow {
      id: "wf".to_string(),
      name: "wf".to_string(),
      steps: vec![],
      edges: vec![],
    })
  }

  #[tokio::test]
  async fn save_load_round_trips() {
    let store = MemoryStore::new();
    let mut e = execution();

    store.save(&mut e).await.unwrap();
    assert_eq!(store.load(&e.id).await.unwrap(), e);
  }

  #[tokio::test]
  async fn list_pending_excludes_terminal() {
    let store = MemoryStore::new();

    let mut running = execution();
    store.save(&mut running).await.unwrap();

    let mut done = execution();
    done.status = ExecutionStatus::Completed;
    store.save(&mut done).await.unwrap();

    let pending = store.list_pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, running.id);
  }
}
