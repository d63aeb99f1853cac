//! In-memory `Store` implementation.
//!
//! Used by tests, the CLI's `validate`/`run` commands, and `serve` when no
//! database URL is configured. All state sits behind one lock, so every
//! trait method (including `snapshot`) is a single atomic step.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::models::{
    Branch, EdgeRow, Message, MessageStatus, NodePayload, NodeRow, NodeType, WorkflowRow,
    WorkflowSnapshot,
};
use crate::{DbError, Store};

#[derive(Debug, Default)]
struct State {
    workflows: HashMap<Uuid, WorkflowRow>,
    nodes: HashMap<Uuid, NodeRow>,
    edges: HashMap<Uuid, EdgeRow>,
    last_tick: Option<DateTime<Utc>>,
}

impl State {
    /// Strictly increasing creation timestamps, so creation order is never tied.
    fn tick(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_tick {
            if now <= last {
                now = last + Duration::microseconds(1);
            }
        }
        self.last_tick = Some(now);
        now
    }

    fn workflow(&self, id: Uuid) -> Result<&WorkflowRow, DbError> {
        self.workflows
            .get(&id)
            .ok_or(DbError::not_found("workflow", id))
    }

    fn node(&self, id: Uuid) -> Result<&NodeRow, DbError> {
        self.nodes.get(&id).ok_or(DbError::not_found("node", id))
    }

    fn node_mut(&mut self, id: Uuid) -> Result<&mut NodeRow, DbError> {
        self.nodes.get_mut(&id).ok_or(DbError::not_found("node", id))
    }

    fn nodes_of(&self, workflow_id: Uuid) -> Vec<NodeRow> {
        let mut nodes: Vec<NodeRow> = self
            .nodes
            .values()
            .filter(|n| n.workflow_id == workflow_id)
            .cloned()
            .collect();
        nodes.sort_by_key(|n| (n.created_at, n.id));
        nodes
    }

    fn edges_of(&self, workflow_id: Uuid) -> Vec<EdgeRow> {
        let mut edges: Vec<EdgeRow> = self
            .edges
            .values()
            .filter(|e| {
                [e.source_node_id, e.target_node_id].iter().any(|id| {
                    self.nodes
                        .get(id)
                        .is_some_and(|n| n.workflow_id == workflow_id)
                })
            })
            .cloned()
            .collect();
        edges.sort_by_key(|e| (e.created_at, e.id));
        edges
    }

    fn remove_edge(&mut self, id: Uuid) -> Option<EdgeRow> {
        let edge = self.edges.remove(&id)?;
        if let Some(NodePayload::Condition(condition)) = self
            .nodes
            .get_mut(&edge.source_node_id)
            .map(|n| &mut n.payload)
        {
            condition.unbind_edge(id);
        }
        Some(edge)
    }

    fn remove_node(&mut self, id: Uuid) -> Option<NodeRow> {
        let node = self.nodes.remove(&id)?;
        let touching: Vec<Uuid> = self
            .edges
            .values()
            .filter(|e| e.touches(id))
            .map(|e| e.id)
            .collect();
        for edge_id in touching {
            self.remove_edge(edge_id);
        }
        Some(node)
    }
}

/// Thread-safe in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_workflow(&self, name: &str) -> Result<WorkflowRow, DbError> {
        let mut state = self.state.write().await;
        let row = WorkflowRow {
            id: Uuid::new_v4(),
            name: name.to_owned(),
            created_at: state.tick(),
        };
        state.workflows.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_workflow(&self, id: Uuid) -> Result<WorkflowRow, DbError> {
        self.state.read().await.workflow(id).cloned()
    }

    async fn list_workflows(&self) -> Result<Vec<WorkflowRow>, DbError> {
        let state = self.state.read().await;
        let mut rows: Vec<WorkflowRow> = state.workflows.values().cloned().collect();
        rows.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(rows)
    }

    async fn delete_workflow(&self, id: Uuid) -> Result<(), DbError> {
        let mut state = self.state.write().await;
        state
            .workflows
            .remove(&id)
            .ok_or(DbError::not_found("workflow", id))?;

        let owned: Vec<Uuid> = state
            .nodes
            .values()
            .filter(|n| n.workflow_id == id)
            .map(|n| n.id)
            .collect();
        debug!(workflow_id = %id, nodes = owned.len(), "cascading workflow delete");
        for node_id in owned {
            state.remove_node(node_id);
        }
        Ok(())
    }

    async fn create_node(
        &self,
        workflow_id: Uuid,
        payload: NodePayload,
    ) -> Result<NodeRow, DbError> {
        let mut state = self.state.write().await;
        state.workflow(workflow_id)?;
        let row = NodeRow {
            id: Uuid::new_v4(),
            workflow_id,
            payload,
            created_at: state.tick(),
        };
        state.nodes.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_node(&self, id: Uuid) -> Result<NodeRow, DbError> {
        self.state.read().await.node(id).cloned()
    }

    async fn list_nodes(&self, workflow_id: Uuid) -> Result<Vec<NodeRow>, DbError> {
        Ok(self.state.read().await.nodes_of(workflow_id))
    }

    async fn find_node_of_type(
        &self,
        workflow_id: Uuid,
        node_type: NodeType,
    ) -> Result<Option<NodeRow>, DbError> {
        Ok(self
            .state
            .read()
            .await
            .nodes_of(workflow_id)
            .into_iter()
            .find(|n| n.node_type() == node_type))
    }

    async fn update_message(
        &self,
        id: Uuid,
        status: MessageStatus,
        text: &str,
    ) -> Result<NodeRow, DbError> {
        let mut state = self.state.write().await;
        let node = state.node_mut(id)?;
        let node_type = node.node_type();
        let NodePayload::Message(message) = &mut node.payload else {
            return Err(DbError::Corrupt {
                entity: "message",
                id,
                reason: format!("node is a {node_type} node"),
            });
        };
        *message = Message {
            status,
            text: text.to_owned(),
        };
        Ok(node.clone())
    }

    async fn update_condition(&self, id: Uuid, expression: &str) -> Result<NodeRow, DbError> {
        let mut state = self.state.write().await;
        let node = state.node_mut(id)?;
        let node_type = node.node_type();
        let NodePayload::Condition(condition) = &mut node.payload else {
            return Err(DbError::Corrupt {
                entity: "condition",
                id,
                reason: format!("node is a {node_type} node"),
            });
        };
        condition.expression = expression.to_owned();
        Ok(node.clone())
    }

    async fn delete_node(&self, id: Uuid) -> Result<(), DbError> {
        self.state
            .write()
            .await
            .remove_node(id)
            .map(|_| ())
            .ok_or(DbError::not_found("node", id))
    }

    async fn create_edge(
        &self,
        source_node_id: Uuid,
        target_node_id: Uuid,
        branch: Option<Branch>,
    ) -> Result<EdgeRow, DbError> {
        let mut state = self.state.write().await;
        state.node(target_node_id)?;
        state.node(source_node_id)?;

        let row = EdgeRow {
            id: Uuid::new_v4(),
            source_node_id,
            target_node_id,
            created_at: state.tick(),
        };

        if let Some(branch) = branch {
            if let NodePayload::Condition(condition) = &mut state.node_mut(source_node_id)?.payload
            {
                condition.bind(branch, row.id);
            }
        }

        state.edges.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_edge(&self, id: Uuid) -> Result<EdgeRow, DbError> {
        self.state
            .read()
            .await
            .edges
            .get(&id)
            .cloned()
            .ok_or(DbError::not_found("edge", id))
    }

    async fn find_edge_between(&self, a: Uuid, b: Uuid) -> Result<Option<EdgeRow>, DbError> {
        Ok(self
            .state
            .read()
            .await
            .edges
            .values()
            .find(|e| e.joins(a, b))
            .cloned())
    }

    async fn count_outgoing_edges(&self, source_node_id: Uuid) -> Result<usize, DbError> {
        Ok(self
            .state
            .read()
            .await
            .edges
            .values()
            .filter(|e| e.source_node_id == source_node_id)
            .count())
    }

    async fn list_edges(&self, workflow_id: Uuid) -> Result<Vec<EdgeRow>, DbError> {
        Ok(self.state.read().await.edges_of(workflow_id))
    }

    async fn delete_edge(&self, id: Uuid) -> Result<(), DbError> {
        self.state
            .write()
            .await
            .remove_edge(id)
            .map(|_| ())
            .ok_or(DbError::not_found("edge", id))
    }

    async fn snapshot(&self, workflow_id: Uuid) -> Result<WorkflowSnapshot, DbError> {
        let state = self.state.read().await;
        Ok(WorkflowSnapshot {
            workflow: state.workflow(workflow_id)?.clone(),
            nodes: state.nodes_of(workflow_id),
            edges: state.edges_of(workflow_id),
        })
    }
}
