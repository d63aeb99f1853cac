//! Postgres-backed `Store` implementation.
//!
//! A thin adapter from the [`Store`] trait onto the [`repository`](crate::repository)
//! functions. Cascades and slot nulling are enforced by foreign keys in the
//! migration; `snapshot` reads inside one `REPEATABLE READ` transaction.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    Branch, EdgeRow, MessageStatus, NodePayload, NodeRow, NodeType, WorkflowRow,
    WorkflowSnapshot,
};
use crate::pool::DbPool;
use crate::repository::{edges, nodes, workflows};
use crate::{DbError, Store};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_workflow(&self, name: &str) -> Result<WorkflowRow, DbError> {
        workflows::create_workflow(&self.pool, name).await
    }

    async fn get_workflow(&self, id: Uuid) -> Result<WorkflowRow, DbError> {
        workflows::get_workflow(&self.pool, id).await
    }

    async fn list_workflows(&self) -> Result<Vec<WorkflowRow>, DbError> {
        workflows::list_workflows(&self.pool).await
    }

    async fn delete_workflow(&self, id: Uuid) -> Result<(), DbError> {
        workflows::delete_workflow(&self.pool, id).await
    }

    async fn create_node(
        &self,
        workflow_id: Uuid,
        payload: NodePayload,
    ) -> Result<NodeRow, DbError> {
        nodes::create_node(&self.pool, workflow_id, payload).await
    }

    async fn get_node(&self, id: Uuid) -> Result<NodeRow, DbError> {
        nodes::get_node(&self.pool, id).await
    }

    async fn list_nodes(&self, workflow_id: Uuid) -> Result<Vec<NodeRow>, DbError> {
        nodes::list_nodes(&self.pool, workflow_id).await
    }

    async fn find_node_of_type(
        &self,
        workflow_id: Uuid,
        node_type: NodeType,
    ) -> Result<Option<NodeRow>, DbError> {
        nodes::find_node_of_type(&self.pool, workflow_id, node_type).await
    }

    async fn update_message(
        &self,
        id: Uuid,
        status: MessageStatus,
        text: &str,
    ) -> Result<NodeRow, DbError> {
        nodes::update_message(&self.pool, id, status, text).await
    }

    async fn update_condition(&self, id: Uuid, expression: &str) -> Result<NodeRow, DbError> {
        nodes::update_condition(&self.pool, id, expression).await
    }

    async fn delete_node(&self, id: Uuid) -> Result<(), DbError> {
        nodes::delete_node(&self.pool, id).await
    }

    async fn create_edge(
        &self,
        source_node_id: Uuid,
        target_node_id: Uuid,
        branch: Option<Branch>,
    ) -> Result<EdgeRow, DbError> {
        edges::create_edge(&self.pool, source_node_id, target_node_id, branch).await
    }

    async fn get_edge(&self, id: Uuid) -> Result<EdgeRow, DbError> {
        edges::get_edge(&self.pool, id).await
    }

    async fn find_edge_between(&self, a: Uuid, b: Uuid) -> Result<Option<EdgeRow>, DbError> {
        edges::find_edge_between(&self.pool, a, b).await
    }

    async fn count_outgoing_edges(&self, source_node_id: Uuid) -> Result<usize, DbError> {
        edges::count_outgoing_edges(&self.pool, source_node_id).await
    }

    async fn list_edges(&self, workflow_id: Uuid) -> Result<Vec<EdgeRow>, DbError> {
        edges::list_edges(&self.pool, workflow_id).await
    }

    async fn delete_edge(&self, id: Uuid) -> Result<(), DbError> {
        edges::delete_edge(&self.pool, id).await
    }

    async fn snapshot(&self, workflow_id: Uuid) -> Result<WorkflowSnapshot, DbError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let workflow = workflows::get_workflow(&mut *tx, workflow_id).await?;
        let nodes = nodes::list_nodes(&mut *tx, workflow_id).await?;
        let edges = edges::list_edges(&mut *tx, workflow_id).await?;

        tx.commit().await?;
        Ok(WorkflowSnapshot {
            workflow,
            nodes,
            edges,
        })
    }
}
