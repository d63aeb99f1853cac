//! Request and response shapes for the engine's entry points.
//!
//! Persisted records live in `db::models`; the types here describe what a
//! caller asks for (a node to create, a patch, an edge) and what a run
//! hands back.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use db::models::{Branch, EdgeRow, MessageStatus, NodeRow, NodeType, WorkflowRow, WorkflowSnapshot};

use crate::graph::GraphNode;

// ---------------------------------------------------------------------------
// Mutations
// ---------------------------------------------------------------------------

/// A node to create. Payload fields are optional here so that missing ones
/// can be reported as `MissingField` rather than a deserialisation error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNode {
    pub workflow_id: Uuid,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MessageStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

impl NewNode {
    pub fn start(workflow_id: Uuid) -> Self {
        Self::bare(workflow_id, NodeType::Start)
    }

    pub fn end(workflow_id: Uuid) -> Self {
        Self::bare(workflow_id, NodeType::End)
    }

    pub fn message(workflow_id: Uuid, status: MessageStatus, text: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            text: Some(text.into()),
            ..Self::bare(workflow_id, NodeType::Message)
        }
    }

    pub fn condition(workflow_id: Uuid, expression: impl Into<String>) -> Self {
        Self {
            expression: Some(expression.into()),
            ..Self::bare(workflow_id, NodeType::Condition)
        }
    }

    fn bare(workflow_id: Uuid, node_type: NodeType) -> Self {
        Self {
            workflow_id,
            node_type,
            status: None,
            text: None,
            expression: None,
        }
    }
}

/// Partial update of a node's payload. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePatch {
    #[serde(default)]
    pub status: Option<MessageStatus>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub expression: Option<String>,
}

/// A directed edge to create. `branch` is required when the source is a
/// condition node and ignored otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEdge {
    pub source_node_id: Uuid,
    pub target_node_id: Uuid,
    #[serde(default)]
    pub branch: Option<Branch>,
}

impl NewEdge {
    pub fn new(source_node_id: Uuid, target_node_id: Uuid) -> Self {
        Self {
            source_node_id,
            target_node_id,
            branch: None,
        }
    }

    pub fn branch(source_node_id: Uuid, target_node_id: Uuid, branch: Branch) -> Self {
        Self {
            branch: Some(branch),
            ..Self::new(source_node_id, target_node_id)
        }
    }
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// A workflow together with its nodes and edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDetail {
    #[serde(flatten)]
    pub workflow: WorkflowRow,
    pub nodes: Vec<NodeRow>,
    pub edges: Vec<EdgeRow>,
}

impl From<WorkflowSnapshot> for WorkflowDetail {
    fn from(snapshot: WorkflowSnapshot) -> Self {
        Self {
            workflow: snapshot.workflow,
            nodes: snapshot.nodes,
            edges: snapshot.edges,
        }
    }
}

/// The outcome of a successful run: the visited nodes in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub workflow_id: Uuid,
    pub nodes: Vec<GraphNode>,
}

impl WorkflowRun {
    /// Identifiers of the visited nodes, in visitation order.
    pub fn node_ids(&self) -> Vec<Uuid> {
        self.nodes.iter().map(|node| node.id).collect()
    }
}
