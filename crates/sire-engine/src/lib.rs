//! Sire Engine
//!
//! The durable execution engine. [`Engine::execute`] drives one execution
//! through its workflow DAG: it picks ready steps, merges their inputs,
//! dispatches their tools, applies the results, schedules retries, and
//! checkpoints to the store after every transition. An execution handed
//! back in after a crash resumes from the last persisted boundary without
//! redispatching completed steps.

mod backoff;
mod engine;
mod error;
mod events;

pub use backoff::{delay, BackoffPolicy};
pub use engine::Engine;
pub use error::EngineError;
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
