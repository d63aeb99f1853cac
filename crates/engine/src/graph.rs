//! Graph builder: materialises a workflow snapshot into an in-memory
//! directed graph the resolver can walk.
//!
//! Each node carries its type and flattened payload. Condition nodes get
//! `yes_node_id` / `no_node_id`, the targets of their bound edges. Edges
//! carry no data; successor lists are ordered by edge `(created_at, id)`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use db::models::{EdgeRow, MessageStatus, NodePayload, NodeRow, NodeType, WorkflowSnapshot};

// ---------------------------------------------------------------------------
// Node data
// ---------------------------------------------------------------------------

/// Type tag plus the fields the resolver and callers see for a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeData {
    Start,
    Message {
        status: MessageStatus,
        text: String,
    },
    Condition {
        expression: String,
        yes_node_id: Option<Uuid>,
        no_node_id: Option<Uuid>,
    },
    End,
}

impl NodeData {
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Start => NodeType::Start,
            Self::Message { .. } => NodeType::Message,
            Self::Condition { .. } => NodeType::Condition,
            Self::End => NodeType::End,
        }
    }
}

/// A node of the built graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: Uuid,
    #[serde(flatten)]
    pub data: NodeData,
}

impl GraphNode {
    pub fn node_type(&self) -> NodeType {
        self.data.node_type()
    }
}

// ---------------------------------------------------------------------------
// WorkflowGraph
// ---------------------------------------------------------------------------

/// Directed graph of one workflow, rebuilt for every run.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    workflow_id: Uuid,
    nodes: HashMap<Uuid, GraphNode>,
    successors: HashMap<Uuid, Vec<Uuid>>,
    start: Option<Uuid>,
    end: Option<Uuid>,
}

impl WorkflowGraph {
    /// Build the graph from a consistent snapshot.
    ///
    /// Edges with an endpoint outside the snapshot's node set are skipped.
    pub fn build(snapshot: &WorkflowSnapshot) -> Self {
        let workflow_id = snapshot.workflow.id;
        let edges_by_id: HashMap<Uuid, &EdgeRow> =
            snapshot.edges.iter().map(|edge| (edge.id, edge)).collect();

        let mut nodes = HashMap::with_capacity(snapshot.nodes.len());
        let mut start = None;
        let mut end = None;

        for row in &snapshot.nodes {
            let data = node_data(row, &edges_by_id);
            match data.node_type() {
                NodeType::Start if start.is_none() => start = Some(row.id),
                NodeType::End if end.is_none() => end = Some(row.id),
                NodeType::Start | NodeType::End => {
                    warn!(node_id = %row.id, node_type = %row.node_type(), "duplicate terminal node ignored");
                }
                _ => {}
            }
            nodes.insert(row.id, GraphNode { id: row.id, data });
        }

        let mut ordered: Vec<&EdgeRow> = snapshot.edges.iter().collect();
        ordered.sort_by_key(|edge| (edge.created_at, edge.id));

        let mut successors: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for edge in ordered {
            if !nodes.contains_key(&edge.source_node_id) || !nodes.contains_key(&edge.target_node_id)
            {
                warn!(edge_id = %edge.id, "edge leaves the workflow; skipped");
                continue;
            }
            successors
                .entry(edge.source_node_id)
                .or_default()
                .push(edge.target_node_id);
        }

        debug!(
            %workflow_id,
            nodes = nodes.len(),
            edges = successors.values().map(Vec::len).sum::<usize>(),
            "graph built"
        );

        Self {
            workflow_id,
            nodes,
            successors,
            start,
            end,
        }
    }

    pub fn workflow_id(&self) -> Uuid {
        self.workflow_id
    }

    pub fn node(&self, id: Uuid) -> Option<&GraphNode> {
        self.nodes.get(&id)
    }

    /// Successors of `id` in edge creation order.
    pub fn successors(&self, id: Uuid) -> &[Uuid] {
        self.successors.get(&id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn first_successor(&self, id: Uuid) -> Option<Uuid> {
        self.successors(id).first().copied()
    }

    pub fn start(&self) -> Option<Uuid> {
        self.start
    }

    pub fn end(&self) -> Option<Uuid> {
        self.end
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

fn node_data(row: &NodeRow, edges_by_id: &HashMap<Uuid, &EdgeRow>) -> NodeData {
    match &row.payload {
        NodePayload::Start => NodeData::Start,
        NodePayload::End => NodeData::End,
        NodePayload::Message(message) => NodeData::Message {
            status: message.status,
            text: message.text.clone(),
        },
        NodePayload::Condition(condition) => {
            let target_of = |slot: Option<Uuid>| {
                let edge = edges_by_id.get(&slot?)?;
                if edge.source_node_id != row.id {
                    warn!(node_id = %row.id, edge_id = %edge.id, "bound edge does not leave its condition");
                    return None;
                }
                Some(edge.target_node_id)
            };
            NodeData::Condition {
                expression: condition.expression.clone(),
                yes_node_id: target_of(condition.yes_edge),
                no_node_id: target_of(condition.no_edge),
            }
        }
    }
}
