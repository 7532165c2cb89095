//! Sire Store
//!
//! Durable persistence for workflow executions. The [`Store`] trait is the
//! engine's checkpointing surface: atomic upserts keyed by execution ID,
//! point loads, and enumeration of non-terminal executions for the
//! resumption agent.
//!
//! [`SqliteStore`] is the production implementation (single file, WAL, full
//! synchronous so a commit is on disk before `save` returns).
//! [`MemoryStore`] mirrors the same semantics for tests.

mod codec;
mod error;
mod memory;
mod sqlite;

use async_trait::async_trait;
use sire_workflow::Execution;

pub use codec::SCHEMA_VERSION;
pub use error::StoreError;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Storage for workflow executions.
#[async_trait]
pub trait Store: Send + Sync {
  /// Atomically upsert an execution keyed by its ID.
  ///
  /// Refreshes `updated_at`; `created_at` is preserved for an existing
  /// record. Both timestamps are written back into `execution` so the
  /// caller sees what was persisted.
  async fn save(&self, execution: &mut Execution) -> Result<(), StoreError>;

  /// Load the latest committed copy of an execution.
  async fn load(&self, id: &str) -> Result<Execution, StoreError>;

  /// All executions the resumption agent may still act on, i.e. those in
  /// the `running` or `retrying` state.
  async fn list_pending(&self) -> Result<Vec<Execution>, StoreError>;
}
