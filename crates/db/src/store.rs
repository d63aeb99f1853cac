//! The `Store` trait: the record store the engine is written against.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    Branch, EdgeRow, MessageStatus, NodePayload, NodeRow, NodeType, WorkflowRow,
    WorkflowSnapshot,
};
use crate::DbError;

/// Persistent storage for workflows, nodes and edges.
///
/// Every method is atomic from the caller's point of view. Deletes cascade:
/// workflow → nodes → payloads and every edge touching a deleted node.
/// Deleting an edge nulls any condition slot bound to it.
///
/// Implementations perform no topology validation.
#[async_trait]
pub trait Store: Send + Sync {
    // ------ workflows ------

    async fn create_workflow(&self, name: &str) -> Result<WorkflowRow, DbError>;

    async fn get_workflow(&self, id: Uuid) -> Result<WorkflowRow, DbError>;

    /// All workflows, newest first.
    async fn list_workflows(&self) -> Result<Vec<WorkflowRow>, DbError>;

    async fn delete_workflow(&self, id: Uuid) -> Result<(), DbError>;

    // ------ nodes ------

    async fn create_node(&self, workflow_id: Uuid, payload: NodePayload)
        -> Result<NodeRow, DbError>;

    async fn get_node(&self, id: Uuid) -> Result<NodeRow, DbError>;

    /// Nodes of a workflow ordered by `(created_at, id)`.
    async fn list_nodes(&self, workflow_id: Uuid) -> Result<Vec<NodeRow>, DbError>;

    /// The first node of `node_type` in the workflow, if any.
    async fn find_node_of_type(
        &self,
        workflow_id: Uuid,
        node_type: NodeType,
    ) -> Result<Option<NodeRow>, DbError>;

    /// Overwrite the status and text of a message node.
    async fn update_message(
        &self,
        id: Uuid,
        status: MessageStatus,
        text: &str,
    ) -> Result<NodeRow, DbError>;

    /// Overwrite the expression of a condition node. Branch bindings are kept.
    async fn update_condition(&self, id: Uuid, expression: &str) -> Result<NodeRow, DbError>;

    async fn delete_node(&self, id: Uuid) -> Result<(), DbError>;

    // ------ edges ------

    /// Insert an edge and, when `branch` is given, bind that slot of the
    /// source condition to it in the same operation.
    async fn create_edge(
        &self,
        source_node_id: Uuid,
        target_node_id: Uuid,
        branch: Option<Branch>,
    ) -> Result<EdgeRow, DbError>;

    async fn get_edge(&self, id: Uuid) -> Result<EdgeRow, DbError>;

    /// The edge joining `a` and `b` in either direction, if any.
    async fn find_edge_between(&self, a: Uuid, b: Uuid) -> Result<Option<EdgeRow>, DbError>;

    async fn count_outgoing_edges(&self, source_node_id: Uuid) -> Result<usize, DbError>;

    /// Every edge touching a node of the workflow, ordered by `(created_at, id)`.
    async fn list_edges(&self, workflow_id: Uuid) -> Result<Vec<EdgeRow>, DbError>;

    async fn delete_edge(&self, id: Uuid) -> Result<(), DbError>;

    // ------ reads ------

    /// The workflow, its nodes and its edges from a single consistent read.
    async fn snapshot(&self, workflow_id: Uuid) -> Result<WorkflowSnapshot, DbError>;
}
