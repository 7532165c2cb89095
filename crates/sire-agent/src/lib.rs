//! Sire Agent
//!
//! The resumption agent: a background loop that periodically scans the
//! store for non-terminal executions whose retry deadline has passed and
//! hands each one back to the engine. Crashed or yielded runs make
//! progress again without any caller involvement.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Map;
use sire_engine::{Engine, ExecutionNotifier};
use sire_store::Store;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Background worker that scans for and resumes pending executions.
///
/// At most one run per execution ID is in flight at a time: the agent
/// tracks active IDs in-process and skips them on later ticks. That set is
/// not shared with foreground `Engine::execute` callers on the same
/// database; see DESIGN.md.
pub struct Agent<N: ExecutionNotifier + 'static = sire_engine::NoopNotifier> {
  store: Arc<dyn Store>,
  engine: Arc<Engine<N>>,
  interval: Duration,
  in_flight: Arc<Mutex<HashSet<String>>>,
}

impl<N: ExecutionNotifier + 'static> Agent<N> {
  pub fn new(store: Arc<dyn Store>, engine: Arc<Engine<N>>, interval: Duration) -> Self {
    Self {
      store,
      engine,
      interval,
      in_flight: Arc::new(Mutex::new(HashSet::new())),
    }
  }

  /// Run the scan loop until the token is canceled.
  pub async fn run(&self, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(self.interval);
    info!("resumption agent started, scanning for pending executions");

    loop {
      tokio::select! {
        _ = cancel.cancelled() => {
          info!("resumption agent shutting down");
          return;
        }
        _ = ticker.tick() => {
          self.scan_and_resume(&cancel).await;
        }
      }
    }
  }

  async fn scan_and_resume(&self, cancel: &CancellationToken) {
    let pending = match self.store.list_pending().await {
      Ok(pending) => pending,
      Err(err) => {
        error!(error = %err, "failed to list pending executions");
        return;
      }
    };

    if !pending.is_empty() {
      debug!(count = pending.len(), "found pending executions");
    }

    let now = Utc::now();
    for execution in pending {
      if !execution.is_runnable_at(now) {
        // A later tick will pick it up once the backoff elapses.
        continue;
      }

      {
        let mut in_flight = self.in_flight.lock().await;
        if !in_flight.insert(execution.id.clone()) {
          continue;
        }
      }

      info!(
          execution_id = %execution.id,
          workflow_id = %execution.workflow_id,
          "resuming execution"
      );

      let engine = self.engine.clone();
      let in_flight = self.in_flight.clone();
      let cancel = cancel.clone();
      tokio::spawn(async move {
        let execution_id = execution.id.clone();
        // The embedded definition is authoritative on resume; the original
        // submitter is long gone.
        let workflow = execution.workflow.clone();

        match engine
          .execute(execution, &workflow, &Map::new(), cancel)
          .await
        {
          Ok(result) => {
            info!(
                execution_id = %execution_id,
                status = result.status.as_str(),
                "execution progressed"
            );
          }
          Err(err) => {
            warn!(
                execution_id = %execution_id,
                error = %err,
                "execution did not complete"
            );
          }
        }

        in_flight.lock().await.remove(&execution_id);
      });
    }
  }
}
