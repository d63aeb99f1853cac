//! Typed records for workflows, nodes and edges.
//!
//! These are *persistence* models; they carry no graph behaviour.
//! Topology rules and execution live in the `engine` crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// workflows
// ---------------------------------------------------------------------------

/// A persisted workflow row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkflowRow {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// nodes
// ---------------------------------------------------------------------------

/// The closed set of node types. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Start,
    Message,
    Condition,
    End,
}

impl NodeType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Message => "message",
            Self::Condition => "condition",
            Self::End => "end",
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NodeType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start"     => Ok(Self::Start),
            "message"   => Ok(Self::Message),
            "condition" => Ok(Self::Condition),
            "end"       => Ok(Self::End),
            other       => Err(format!("unknown node type: {other}")),
        }
    }
}

/// Delivery state of a message node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Sent,
    Opened,
}

impl MessageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Opened => "opened",
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MessageStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "sent"    => Ok(Self::Sent),
            "opened"  => Ok(Self::Opened),
            other     => Err(format!("unknown message status: {other}")),
        }
    }
}

/// Payload owned by a `message` node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub status: MessageStatus,
    pub text: String,
}

/// Which outgoing edge of a condition node an edge is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    Yes,
    No,
}

impl std::fmt::Display for Branch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Yes => f.write_str("yes"),
            Self::No => f.write_str("no"),
        }
    }
}

/// Payload owned by a `condition` node.
///
/// `yes_edge` / `no_edge` are non-owning references to edges whose source
/// is this node. Deleting a referenced edge nulls the slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub expression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yes_edge: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_edge: Option<Uuid>,
}

impl Condition {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            yes_edge: None,
            no_edge: None,
        }
    }

    /// The edge bound to `branch`, if any.
    pub fn slot(&self, branch: Branch) -> Option<Uuid> {
        match branch {
            Branch::Yes => self.yes_edge,
            Branch::No => self.no_edge,
        }
    }

    /// Bind `branch` to `edge_id`, replacing any previous binding.
    pub fn bind(&mut self, branch: Branch, edge_id: Uuid) {
        match branch {
            Branch::Yes => self.yes_edge = Some(edge_id),
            Branch::No => self.no_edge = Some(edge_id),
        }
    }

    /// Null every slot that points at `edge_id`.
    pub fn unbind_edge(&mut self, edge_id: Uuid) {
        if self.yes_edge == Some(edge_id) {
            self.yes_edge = None;
        }
        if self.no_edge == Some(edge_id) {
            self.no_edge = None;
        }
    }
}

/// Type tag plus the type-specific payload of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodePayload {
    Start,
    Message(Message),
    Condition(Condition),
    End,
}

impl NodePayload {
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Start => NodeType::Start,
            Self::Message(_) => NodeType::Message,
            Self::Condition(_) => NodeType::Condition,
            Self::End => NodeType::End,
        }
    }
}

/// A persisted node with its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRow {
    pub id: Uuid,
    pub workflow_id: Uuid,
    #[serde(flatten)]
    pub payload: NodePayload,
    pub created_at: DateTime<Utc>,
}

impl NodeRow {
    pub fn node_type(&self) -> NodeType {
        self.payload.node_type()
    }

    pub fn condition(&self) -> Option<&Condition> {
        match &self.payload {
            NodePayload::Condition(condition) => Some(condition),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// edges
// ---------------------------------------------------------------------------

/// A persisted directed edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct EdgeRow {
    pub id: Uuid,
    pub source_node_id: Uuid,
    pub target_node_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl EdgeRow {
    /// True if this edge connects `a` and `b` in either direction.
    pub fn joins(&self, a: Uuid, b: Uuid) -> bool {
        (self.source_node_id == a && self.target_node_id == b)
            || (self.source_node_id == b && self.target_node_id == a)
    }

    pub fn touches(&self, node_id: Uuid) -> bool {
        self.source_node_id == node_id || self.target_node_id == node_id
    }
}

// ---------------------------------------------------------------------------
// snapshots
// ---------------------------------------------------------------------------

/// A consistent read of one workflow's topology.
///
/// `nodes` are ordered by `(created_at, id)`; `edges` holds every edge
/// whose source or target belongs to the workflow, in the same order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub workflow: WorkflowRow,
    pub nodes: Vec<NodeRow>,
    pub edges: Vec<EdgeRow>,
}
