use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use sire_agent::Agent;
use sire_config::WorkflowDoc;
use sire_dispatch::{Dispatcher, DispatcherMux, LocalDispatcher, RemoteDispatcher, ToolRegistry};
use sire_engine::Engine;
use sire_store::{SqliteStore, Store};
use sire_workflow::{Execution, ExecutionStatus};

/// Sire - a durable workflow orchestrator
#[derive(Parser)]
#[command(name = "sire")]
#[command(version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Validate and run workflows
  Workflow {
    #[command(subcommand)]
    command: WorkflowCommands,
  },

  /// Inspect workflow executions
  Execution {
    #[command(subcommand)]
    command: ExecutionCommands,
  },

  /// Run the background resumption agent
  Agent {
    #[command(subcommand)]
    command: AgentCommands,
  },
}

#[derive(Subcommand)]
enum WorkflowCommands {
  /// Parse and cycle-check a workflow file without executing it
  Validate {
    /// Path to the workflow file (YAML or JSON)
    #[arg(short, long)]
    file: PathBuf,
  },

  /// Submit a new execution and print its terminal state as JSON
  Run {
    /// Path to the workflow file (YAML or JSON)
    #[arg(short, long)]
    file: PathBuf,

    /// JSON object of workflow inputs
    #[arg(short, long)]
    inputs: Option<String>,

    /// Path to the database file for state persistence
    #[arg(short = 'd', long = "db-path", default_value = "sire.db")]
    db_path: PathBuf,
  },
}

#[derive(Subcommand)]
enum ExecutionCommands {
  /// List non-terminal executions
  List {
    /// Path to the database file for state persistence
    #[arg(short = 'd', long = "db-path", default_value = "sire.db")]
    db_path: PathBuf,
  },

  /// Print one execution's full state
  Status {
    /// The execution ID
    id: String,

    /// Path to the database file for state persistence
    #[arg(short = 'd', long = "db-path", default_value = "sire.db")]
    db_path: PathBuf,
  },
}

#[derive(Subcommand)]
enum AgentCommands {
  /// Scan the store and resume runnable executions until interrupted.
  ///
  /// Note: the agent's in-flight tracking is process-local. Running
  /// `workflow run` against the same database concurrently can race with
  /// the agent on retrying executions.
  Run {
    /// Path to the database file for state persistence
    #[arg(short = 'd', long = "db-path", default_value = "sire.db")]
    db_path: PathBuf,

    /// Scan interval in seconds
    #[arg(long, default_value_t = 10)]
    interval: u64,
  },
}

#[tokio::main]
async fn main() -> ExitCode {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  match run(cli).await {
    Ok(code) => code,
    Err(err) => {
      eprintln!("Error: {:#}", err);
      ExitCode::FAILURE
    }
  }
}

async fn run(cli: Cli) -> Result<ExitCode> {
  match cli.command {
    Commands::Workflow { command } => match command {
      WorkflowCommands::Validate { file } => validate_workflow(&file).await,
      WorkflowCommands::Run {
        file,
        inputs,
        db_path,
      } => run_workflow(&file, inputs, &db_path).await,
    },
    Commands::Execution { command } => match command {
      ExecutionCommands::List { db_path } => list_executions(&db_path).await,
      ExecutionCommands::Status { id, db_path } => execution_status(&id, &db_path).await,
    },
    Commands::Agent { command } => match command {
      AgentCommands::Run { db_path, interval } => run_agent(&db_path, interval).await,
    },
  }
}

/// Build the production dispatcher: local registry with the built-in tools
/// plus the remote JSON-RPC transport, behind the scheme mux.
fn build_dispatcher() -> Result<Arc<dyn Dispatcher>> {
  let mut registry = ToolRegistry::new();
  sire_tools::register_builtin(&mut registry).context("failed to register built-in tools")?;

  let mut mux = DispatcherMux::new();
  mux.register("sire", Arc::new(LocalDispatcher::new(Arc::new(registry))));
  mux.register("mcp", Arc::new(RemoteDispatcher::new()));
  Ok(Arc::new(mux))
}

/// Cancel the returned token on Ctrl-C so in-flight dispatches abort and
/// executions stay resumable.
fn cancel_on_ctrl_c() -> CancellationToken {
  let cancel = CancellationToken::new();
  let signal_cancel = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      signal_cancel.cancel();
    }
  });
  cancel
}

async fn validate_workflow(file: &Path) -> Result<ExitCode> {
  let workflow = WorkflowDoc::from_path(file).await?.into_workflow()?;
  workflow.graph().topological_order()?;

  println!("workflow '{}' is valid", workflow.id);
  Ok(ExitCode::SUCCESS)
}

async fn run_workflow(file: &Path, inputs: Option<String>, db_path: &Path) -> Result<ExitCode> {
  let workflow = WorkflowDoc::from_path(file).await?.into_workflow()?;

  let inputs: serde_json::Map<String, serde_json::Value> = match inputs {
    Some(raw) => serde_json::from_str(&raw).context("inputs must be a JSON object")?,
    None => serde_json::Map::new(),
  };

  let store = Arc::new(
    SqliteStore::open(db_path)
      .await
      .with_context(|| format!("failed to open database {}", db_path.display()))?,
  );
  let engine = Engine::new(build_dispatcher()?, store.clone());

  let mut execution = Execution::new(&workflow);
  let execution_id = execution.id.clone();
  store.save(&mut execution).await?;

  let cancel = cancel_on_ctrl_c();
  match engine.execute(execution, &workflow, &inputs, cancel).await {
    Ok(execution) => {
      println!("{}", serde_json::to_string_pretty(&execution)?);
      Ok(if execution.status == ExecutionStatus::Completed {
        ExitCode::SUCCESS
      } else {
        ExitCode::FAILURE
      })
    }
    Err(err) => {
      eprintln!("workflow execution failed: {}", err);
      if let Ok(execution) = store.load(&execution_id).await {
        println!("{}", serde_json::to_string_pretty(&execution)?);
      }
      Ok(ExitCode::FAILURE)
    }
  }
}

async fn list_executions(db_path: &Path) -> Result<ExitCode> {
  let store = SqliteStore::open(db_path)
    .await
    .with_context(|| format!("failed to open database {}", db_path.display()))?;

  let executions = store.list_pending().await?;
  if executions.is_empty() {
    println!("no pending executions");
    return Ok(ExitCode::SUCCESS);
  }

  println!(
    "{:<38} {:<24} {:<10} {:<27} {:<27}",
    "ID", "WORKFLOW ID", "STATUS", "CREATED AT", "UPDATED AT"
  );
  for execution in executions {
    println!(
      "{:<38} {:<24} {:<10} {:<27} {:<27}",
      execution.id,
      execution.workflow_id,
      execution.status.as_str(),
      execution.created_at.to_rfc3339(),
      execution.updated_at.to_rfc3339(),
    );
  }
  Ok(ExitCode::SUCCESS)
}

async fn execution_status(id: &str, db_path: &Path) -> Result<ExitCode> {
  let store = SqliteStore::open(db_path)
    .await
    .with_context(|| format!("failed to open database {}", db_path.display()))?;

  let execution = store.load(id).await?;
  println!("{}", serde_json::to_string_pretty(&execution)?);
  Ok(ExitCode::SUCCESS)
}

async fn run_agent(db_path: &Path, interval: u64) -> Result<ExitCode> {
  let store: Arc<SqliteStore> = Arc::new(
    SqliteStore::open(db_path)
      .await
      .with_context(|| format!("failed to open database {}", db_path.display()))?,
  );
  let engine = Arc::new(Engine::new(build_dispatcher()?, store.clone()));

  let agent = Agent::new(store, engine, Duration::from_secs(interval));
  agent.run(cancel_on_ctrl_c()).await;
  Ok(ExitCode::SUCCESS)
}
