//! Workflow execution entry point.
//!
//! `WorkflowExecutor::run`:
//! 1. Reads a consistent snapshot of the workflow from the store.
//! 2. Builds a fresh [`WorkflowGraph`]; nothing is cached between runs.
//! 3. Resolves the single path from start to end.

use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use db::Store;
use expression::Evaluator;

use crate::graph::WorkflowGraph;
use crate::models::WorkflowRun;
use crate::resolver::resolve_path;
use crate::EngineError;

/// Stateless orchestrator for workflow runs.
///
/// Cheap to clone; concurrent runs share nothing but the store and the
/// evaluator.
#[derive(Clone)]
pub struct WorkflowExecutor {
    store: Arc<dyn Store>,
    evaluator: Arc<dyn Evaluator>,
}

impl WorkflowExecutor {
    /// Create a new executor.
    pub fn new(store: Arc<dyn Store>, evaluator: Arc<dyn Evaluator>) -> Self {
        Self { store, evaluator }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Run the workflow and return the visited nodes in order.
    ///
    /// # Errors
    /// [`EngineError::NotFound`] for an unknown workflow, otherwise any of
    /// the failures of [`resolve_path`]. No partial path is returned.
    #[instrument(skip(self))]
    pub async fn run(&self, workflow_id: Uuid) -> Result<WorkflowRun, EngineError> {
        let snapshot = self.store.snapshot(workflow_id).await?;
        let graph = WorkflowGraph::build(&snapshot);

        match resolve_path(&graph, self.evaluator.as_ref()) {
            Ok(nodes) => {
                info!(steps = nodes.len(), "workflow run resolved");
                Ok(WorkflowRun { workflow_id, nodes })
            }
            Err(err) => {
                warn!(kind = %err.kind(), "workflow run failed: {err}");
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for WorkflowExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowExecutor").finish_non_exhaustive()
    }
}
