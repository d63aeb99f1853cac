//! Workflow-level management and deletes.
//!
//! Deletes need no topology checks: removing a node or edge can only make
//! a graph incomplete, which a run reports on its own.

use tracing::{info, instrument};
use uuid::Uuid;

use db::models::WorkflowRow;
use db::Store;

use crate::models::WorkflowDetail;
use crate::EngineError;

#[instrument(skip(store))]
pub async fn create_workflow(store: &dyn Store, name: &str) -> Result<WorkflowRow, EngineError> {
    if name.trim().is_empty() {
        return Err(EngineError::missing("name", "workflow"));
    }
    let row = store.create_workflow(name).await?;
    info!(workflow_id = %row.id, "workflow created");
    Ok(row)
}

/// The workflow with its nodes and edges.
pub async fn get_workflow(store: &dyn Store, id: Uuid) -> Result<WorkflowDetail, EngineError> {
    Ok(store.snapshot(id).await?.into())
}

/// Every workflow with its nodes and edges, newest first.
pub async fn list_workflows(store: &dyn Store) -> Result<Vec<WorkflowDetail>, EngineError> {
    let rows = store.list_workflows().await?;
    let mut details = Vec::with_capacity(rows.len());
    for row in rows {
        details.push(store.snapshot(row.id).await?.into());
    }
    Ok(details)
}

/// Delete a workflow with its nodes, payloads and edges.
#[instrument(skip(store))]
pub async fn delete_workflow(store: &dyn Store, id: Uuid) -> Result<(), EngineError> {
    store.delete_workflow(id).await?;
    info!("workflow deleted");
    Ok(())
}

/// Delete a node and every edge touching it; condition slots bound to
/// those edges are nulled.
#[instrument(skip(store))]
pub async fn delete_node(store: &dyn Store, id: Uuid) -> Result<(), EngineError> {
    store.delete_node(id).await?;
    info!("node deleted");
    Ok(())
}

/// Delete an edge, nulling the condition slot bound to it.
#[instrument(skip(store))]
pub async fn delete_edge(store: &dyn Store, id: Uuid) -> Result<(), EngineError> {
    store.delete_edge(id).await?;
    info!("edge deleted");
    Ok(())
}
