//! `message-flow` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`   : start the API server.
//! - `migrate` : run pending database migrations.
//! - `validate`: import a workflow document into a scratch store.
//! - `run`     : import a workflow document and print its path.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use db::{MemoryStore, PgStore, Store};
use engine::document::{self, Imported, WorkflowDocument};
use engine::WorkflowExecutor;
use expression::BuiltinEvaluator;

#[derive(Parser)]
#[command(
    name = "message-flow",
    about = "Branching message workflows: build them, validate them, walk them",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API server.
    Serve {
        #[arg(long, env = "BIND_ADDRESS", default_value = "0.0.0.0:8080")]
        bind: SocketAddr,
        /// Postgres connection string; the in-memory store is used when unset.
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,
        #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 10)]
        max_connections: u32,
    },
    /// Run pending database migrations.
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
    /// Check that a workflow document satisfies the topology rules.
    Validate {
        /// Path to the workflow JSON file.
        path: PathBuf,
    },
    /// Resolve the path through a workflow document and print it as JSON.
    Run {
        /// Path to the workflow JSON file.
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            bind,
            database_url,
            max_connections,
        } => {
            let store: Arc<dyn Store> = match database_url {
                Some(url) => {
                    let pool = db::pool::create_pool(&url, max_connections)
                        .await
                        .context("failed to connect to database")?;
                    Arc::new(PgStore::new(pool))
                }
                None => {
                    info!("DATABASE_URL not set; using the in-memory store");
                    Arc::new(MemoryStore::new())
                }
            };
            let state = api::AppState::new(store, Arc::new(BuiltinEvaluator::new()));
            api::serve(bind, state).await.context("API server failed")?;
        }
        Command::Migrate { database_url } => {
            let pool = db::pool::create_pool(&database_url, 2)
                .await
                .context("failed to connect to database")?;
            db::pool::run_migrations(&pool)
                .await
                .context("migration failed")?;
            info!("migrations applied successfully");
        }
        Command::Validate { path } => {
            let store = MemoryStore::new();
            match import_file(&store, &path).await? {
                Ok(imported) => println!(
                    "✅ Workflow '{}' is valid: {} nodes.",
                    imported.workflow.name,
                    imported.keys.len()
                ),
                Err(err) => {
                    eprintln!("❌ Validation failed [{}]: {err}", err.kind());
                    std::process::exit(1);
                }
            }
        }
        Command::Run { path } => {
            let store = Arc::new(MemoryStore::new());
            let imported = match import_file(store.as_ref(), &path).await? {
                Ok(imported) => imported,
                Err(err) => {
                    eprintln!("❌ Validation failed [{}]: {err}", err.kind());
                    std::process::exit(1);
                }
            };

            let executor = WorkflowExecutor::new(store, Arc::new(BuiltinEvaluator::new()));
            match executor.run(imported.workflow.id).await {
                Ok(run) => println!("{}", serde_json::to_string_pretty(&run)?),
                Err(err) => {
                    eprintln!("❌ Run failed [{}]: {err}", err.kind());
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))
}

/// Read and import a workflow document.
///
/// I/O and JSON problems are the outer error; topology failures the inner.
async fn import_file(
    store: &dyn Store,
    path: &Path,
) -> anyhow::Result<Result<Imported, engine::EngineError>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    let document: WorkflowDocument =
        serde_json::from_str(&content).context("invalid workflow document")?;
    Ok(document::import(store, &document).await)
}
