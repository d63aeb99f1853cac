//! Workflow documents: a whole workflow as one JSON value.
//!
//! Nodes are named by local keys; edges refer to those keys. Importing a
//! document replays every node and edge through the topology rules in
//! document order, so a document that imports cleanly is exactly one that
//! could have been built through the mutation API.
//!
//! ```json
//! {
//!   "name": "greeting",
//!   "nodes": [
//!     { "key": "start", "type": "start" },
//!     { "key": "hello", "type": "message", "status": "sent", "text": "Hello!" },
//!     { "key": "end", "type": "end" }
//!   ],
//!   "edges": [
//!     { "from": "start", "to": "hello" },
//!     { "from": "hello", "to": "end" }
//!   ]
//! }
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use db::models::{Branch, MessageStatus, NodeType, WorkflowRow};
use db::Store;

use crate::models::{NewEdge, NewNode};
use crate::{topology, workflows, EngineError};

/// A node declared in a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentNode {
    pub key: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MessageStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

/// An edge between two document keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentEdge {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<Branch>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDocument {
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<DocumentNode>,
    #[serde(default)]
    pub edges: Vec<DocumentEdge>,
}

/// The result of a successful import.
#[derive(Debug, Clone)]
pub struct Imported {
    pub workflow: WorkflowRow,
    /// Document key → created node id.
    pub keys: HashMap<String, Uuid>,
}

impl Imported {
    pub fn node_id(&self, key: &str) -> Result<Uuid, EngineError> {
        self.keys
            .get(key)
            .copied()
            .ok_or_else(|| EngineError::UnknownKey(key.to_owned()))
    }
}

/// Create the workflow described by `document`.
///
/// Stops at the first failing node or edge; whatever was created before
/// that point is left in the store.
#[instrument(skip_all, fields(name = %document.name))]
pub async fn import(store: &dyn Store, document: &WorkflowDocument) -> Result<Imported, EngineError> {
    let workflow = workflows::create_workflow(store, &document.name).await?;
    let mut imported = Imported {
        workflow,
        keys: HashMap::with_capacity(document.nodes.len()),
    };

    for node in &document.nodes {
        if imported.keys.contains_key(&node.key) {
            return Err(EngineError::InvalidTopology(format!(
                "node key '{}' declared twice",
                node.key
            )));
        }
        let row = topology::create_node(
            store,
            NewNode {
                workflow_id: imported.workflow.id,
                node_type: node.node_type,
                status: node.status,
                text: node.text.clone(),
                expression: node.expression.clone(),
            },
        )
        .await?;
        imported.keys.insert(node.key.clone(), row.id);
    }

    for edge in &document.edges {
        let new_edge = NewEdge {
            source_node_id: imported.node_id(&edge.from)?,
            target_node_id: imported.node_id(&edge.to)?,
            branch: edge.branch,
        };
        topology::create_edge(store, new_edge).await?;
    }

    info!(
        workflow_id = %imported.workflow.id,
        nodes = document.nodes.len(),
        edges = document.edges.len(),
        "document imported"
    );
    Ok(imported)
}
