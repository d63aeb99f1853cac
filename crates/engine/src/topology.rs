//! Topology validation, run on every node and edge mutation.
//!
//! Rules are checked with point queries against the store; no graph is
//! materialised. A mutation that fails a rule issues no write.
//!
//! Node rules:
//! 1. At most one `start` and one `end` node per workflow.
//! 2. `message` nodes need `status` and a non-empty `text`; `condition`
//!    nodes need a non-empty `expression`.
//!
//! Edge rules, first failure wins:
//! 1. Endpoints must differ.
//! 2. No existing edge between the unordered pair.
//! 3. Both endpoints exist and share a workflow.
//! 4. A `start` node is never a target.
//! 5. `start` / `message` sources have at most one outgoing edge,
//! 6. `condition` sources at most two.
//! 7. A `condition` target needs a `message` or `condition` source.
//! 8. An `end` node is never a source.
//! 9. Edges leaving a `condition` name their branch, which is then bound.

use tracing::{debug, info, instrument};
use uuid::Uuid;

use db::models::{Condition, EdgeRow, Message, NodePayload, NodeRow, NodeType};
use db::Store;

use crate::models::{NewEdge, NewNode, NodePatch};
use crate::EngineError;

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// Validate and insert a node.
///
/// # Errors
/// - [`EngineError::NotFound`] if the workflow does not exist.
/// - [`EngineError::MissingField`] / [`EngineError::FieldNotApplicable`]
///   for a payload that does not fit the node type.
/// - [`EngineError::InvalidTopology`] for a second start or end node.
#[instrument(skip(store, node), fields(workflow_id = %node.workflow_id, node_type = %node.node_type))]
pub async fn create_node(store: &dyn Store, node: NewNode) -> Result<NodeRow, EngineError> {
    store.get_workflow(node.workflow_id).await?;

    let payload = payload_for(&node)?;

    if matches!(node.node_type, NodeType::Start | NodeType::End) {
        if let Some(existing) = store
            .find_node_of_type(node.workflow_id, node.node_type)
            .await?
        {
            return Err(EngineError::InvalidTopology(format!(
                "workflow {} already has a {} node ({})",
                node.workflow_id, node.node_type, existing.id
            )));
        }
    }

    let row = store.create_node(node.workflow_id, payload).await?;
    info!(node_id = %row.id, "node created");
    Ok(row)
}

/// Apply a patch to a node's payload. The node type never changes.
///
/// Message nodes accept `status` and `text`, condition nodes `expression`;
/// start and end nodes accept nothing. Branch bindings only move through
/// [`create_edge`].
#[instrument(skip(store, patch), fields(node_id = %id))]
pub async fn update_node(
    store: &dyn Store,
    id: Uuid,
    patch: NodePatch,
) -> Result<NodeRow, EngineError> {
    let node = store.get_node(id).await?;
    let node_type = node.node_type();

    let row = match node.payload {
        NodePayload::Message(current) => {
            reject_field(patch.expression.is_some(), "expression", node_type)?;
            let text = patch.text.unwrap_or(current.text);
            if text.is_empty() {
                return Err(EngineError::missing("text", "message node"));
            }
            let status = patch.status.unwrap_or(current.status);
            store.update_message(id, status, &text).await?
        }
        NodePayload::Condition(_) => {
            reject_field(patch.status.is_some(), "status", node_type)?;
            reject_field(patch.text.is_some(), "text", node_type)?;
            match patch.expression {
                Some(expression) if expression.is_empty() => {
                    return Err(EngineError::missing("expression", "condition node"));
                }
                Some(expression) => store.update_condition(id, &expression).await?,
                None => return store.get_node(id).await.map_err(Into::into),
            }
        }
        NodePayload::Start | NodePayload::End => {
            reject_field(patch.status.is_some(), "status", node_type)?;
            reject_field(patch.text.is_some(), "text", node_type)?;
            reject_field(patch.expression.is_some(), "expression", node_type)?;
            return store.get_node(id).await.map_err(Into::into);
        }
    };

    info!("node updated");
    Ok(row)
}

/// Turn a creation request into a typed payload, checking field presence.
pub fn payload_for(node: &NewNode) -> Result<NodePayload, EngineError> {
    let node_type = node.node_type;
    match node_type {
        NodeType::Start | NodeType::End => {
            reject_field(node.status.is_some(), "status", node_type)?;
            reject_field(node.text.is_some(), "text", node_type)?;
            reject_field(node.expression.is_some(), "expression", node_type)?;
            Ok(if node_type == NodeType::Start {
                NodePayload::Start
            } else {
                NodePayload::End
            })
        }
        NodeType::Message => {
            reject_field(node.expression.is_some(), "expression", node_type)?;
            let status = node
                .status
                .ok_or_else(|| EngineError::missing("status", "message node"))?;
            let text = match node.text.as_deref() {
                Some(text) if !text.is_empty() => text.to_owned(),
                _ => return Err(EngineError::missing("text", "message node")),
            };
            Ok(NodePayload::Message(Message { status, text }))
        }
        NodeType::Condition => {
            reject_field(node.status.is_some(), "status", node_type)?;
            reject_field(node.text.is_some(), "text", node_type)?;
            match node.expression.as_deref() {
                Some(expression) if !expression.is_empty() => {
                    Ok(NodePayload::Condition(Condition::new(expression)))
                }
                _ => Err(EngineError::missing("expression", "condition node")),
            }
        }
    }
}

fn reject_field(present: bool, field: &'static str, node_type: NodeType) -> Result<(), EngineError> {
    if present {
        return Err(EngineError::FieldNotApplicable { field, node_type });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Edges
// ---------------------------------------------------------------------------

/// Validate and insert an edge, binding the condition slot when the source
/// is a condition node.
///
/// Rebinding a slot that is already bound moves the reference only; the
/// previously bound edge is left in place.
#[instrument(
    skip(store, edge),
    fields(source = %edge.source_node_id, target = %edge.target_node_id)
)]
pub async fn create_edge(store: &dyn Store, edge: NewEdge) -> Result<EdgeRow, EngineError> {
    let NewEdge {
        source_node_id,
        target_node_id,
        branch,
    } = edge;

    // 1
    if source_node_id == target_node_id {
        return Err(EngineError::InvalidEdge("nodes must differ".into()));
    }

    // 2
    if let Some(existing) = store.find_edge_between(source_node_id, target_node_id).await? {
        return Err(EngineError::DuplicateEdge {
            source_node_id,
            target_node_id,
            existing: existing.id,
        });
    }

    // 3
    let target = store.get_node(target_node_id).await?;
    let source = store.get_node(source_node_id).await?;
    if source.workflow_id != target.workflow_id {
        return Err(EngineError::CrossWorkflowEdge {
            source_node_id,
            target_node_id,
        });
    }

    // 4
    check_target(target.node_type())?;

    // 5, 6
    if let Some(limit) = fan_out_limit(source.node_type()) {
        let outgoing = store.count_outgoing_edges(source_node_id).await?;
        if outgoing >= limit {
            return Err(EngineError::FanOutExceeded {
                node_id: source_node_id,
                node_type: source.node_type(),
                limit,
            });
        }
    }

    // 7, 8
    check_pairing(source.node_type(), target.node_type())?;

    // 9
    let branch = match (source.node_type(), branch) {
        (NodeType::Condition, Some(branch)) => Some(branch),
        (NodeType::Condition, None) => {
            return Err(EngineError::missing(
                "branch",
                format!("edge leaving condition {source_node_id}"),
            ));
        }
        (_, Some(branch)) => {
            debug!(%branch, "branch ignored for non-condition source");
            None
        }
        (_, None) => None,
    };

    let row = store.create_edge(source_node_id, target_node_id, branch).await?;
    info!(edge_id = %row.id, branch = ?branch, "edge created");
    Ok(row)
}

/// Maximum number of outgoing edges a node of `node_type` may have.
///
/// `None` for `end`, which may have none at all and is rejected by
/// [`check_pairing`] instead.
pub fn fan_out_limit(node_type: NodeType) -> Option<usize> {
    match node_type {
        NodeType::Start | NodeType::Message => Some(1),
        NodeType::Condition => Some(2),
        NodeType::End => None,
    }
}

fn check_target(target: NodeType) -> Result<(), EngineError> {
    if target == NodeType::Start {
        return Err(EngineError::InvalidEdge(
            "a start node cannot be an edge target".into(),
        ));
    }
    Ok(())
}

fn check_pairing(source: NodeType, target: NodeType) -> Result<(), EngineError> {
    if target == NodeType::Condition && !matches!(source, NodeType::Message | NodeType::Condition) {
        return Err(EngineError::InvalidEdge(format!(
            "a condition node can only follow a message or condition node, not {source}"
        )));
    }
    if source == NodeType::End {
        return Err(EngineError::InvalidEdge(
            "an end node cannot have outgoing edges".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use db::models::{Branch, MessageStatus};
    use db::MemoryStore;

    fn new_node(node_type: NodeType) -> NewNode {
        NewNode {
            workflow_id: Uuid::new_v4(),
            node_type,
            status: None,
            text: None,
            expression: None,
        }
    }

    // ---- pure helpers ----

    #[test]
    fn message_requires_status_and_text() {
        let mut node = new_node(NodeType::Message);
        node.text = Some("hello".into());
        let err = payload_for(&node).unwrap_err();
        assert!(matches!(err, EngineError::MissingField { field: "status", .. }));

        node.status = Some(MessageStatus::Pending);
        node.text = Some(String::new());
        let err = payload_for(&node).unwrap_err();
        assert!(matches!(err, EngineError::MissingField { field: "text", .. }));

        node.text = Some("hello".into());
        assert_eq!(
            payload_for(&node).unwrap(),
            NodePayload::Message(Message {
                status: MessageStatus::Pending,
                text: "hello".into()
            })
        );
    }

    #[test]
    fn condition_requires_non_empty_expression() {
        let mut node = new_node(NodeType::Condition);
        assert_eq!(payload_for(&node).unwrap_err().kind(), ErrorKind::MissingField);

        node.expression = Some(String::new());
        assert_eq!(payload_for(&node).unwrap_err().kind(), ErrorKind::MissingField);

        node.expression = Some(r#"status == "sent""#.into());
        let payload = payload_for(&node).unwrap();
        assert_eq!(payload, NodePayload::Condition(Condition::new(r#"status == "sent""#)));
    }

    #[test]
    fn foreign_fields_are_rejected() {
        let mut start = new_node(NodeType::Start);
        start.text = Some("hi".into());
        assert!(matches!(
            payload_for(&start).unwrap_err(),
            EngineError::FieldNotApplicable { field: "text", node_type: NodeType::Start }
        ));

        let mut message = new_node(NodeType::Message);
        message.status = Some(MessageStatus::Sent);
        message.text = Some("hi".into());
        message.expression = Some("true".into());
        assert_eq!(payload_for(&message).unwrap_err().kind(), ErrorKind::InvalidField);
    }

    #[test]
    fn fan_out_limits_per_type() {
        assert_eq!(fan_out_limit(NodeType::Start), Some(1));
        assert_eq!(fan_out_limit(NodeType::Message), Some(1));
        assert_eq!(fan_out_limit(NodeType::Condition), Some(2));
        assert_eq!(fan_out_limit(NodeType::End), None);
    }

    #[test]
    fn endpoint_type_rules() {
        assert!(check_target(NodeType::Start).is_err());
        assert!(check_target(NodeType::End).is_ok());

        assert!(check_pairing(NodeType::Start, NodeType::Condition).is_err());
        assert!(check_pairing(NodeType::Message, NodeType::Condition).is_ok());
        assert!(check_pairing(NodeType::Condition, NodeType::Condition).is_ok());
        assert!(check_pairing(NodeType::End, NodeType::Message).is_err());
        assert!(check_pairing(NodeType::Start, NodeType::Message).is_ok());
    }

    // ---- store-backed rules ----

    #[tokio::test]
    async fn node_in_unknown_workflow_is_not_found() {
        let store = MemoryStore::new();
        let err = create_node(&store, NewNode::start(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn second_end_node_is_rejected() {
        let store = MemoryStore::new();
        let wf = store.create_workflow("ends").await.unwrap();
        create_node(&store, NewNode::end(wf.id)).await.unwrap();

        let err = create_node(&store, NewNode::end(wf.id)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTopology);
        assert_eq!(store.list_nodes(wf.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn edge_rules_fire_in_order() {
        let store = MemoryStore::new();
        let wf = store.create_workflow("edges").await.unwrap();
        let start = create_node(&store, NewNode::start(wf.id)).await.unwrap();
        let msg = create_node(&store, NewNode::message(wf.id, MessageStatus::Sent, "hi"))
            .await
            .unwrap();
        let other_msg = create_node(&store, NewNode::message(wf.id, MessageStatus::Sent, "yo"))
            .await
            .unwrap();
        let cond = create_node(&store, NewNode::condition(wf.id, "true")).await.unwrap();
        let end = create_node(&store, NewNode::end(wf.id)).await.unwrap();

        // self-loop
        let err = create_edge(&store, NewEdge::new(msg.id, msg.id)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidEdge);

        // start -> message, then the reverse pair is a duplicate
        create_edge(&store, NewEdge::new(start.id, msg.id)).await.unwrap();
        let err = create_edge(&store, NewEdge::new(msg.id, start.id)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateEdge);

        // missing endpoint
        let err = create_edge(&store, NewEdge::new(msg.id, Uuid::new_v4()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        // start as target
        let err = create_edge(&store, NewEdge::new(end.id, start.id)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidEdge);

        // start fan-out
        let err = create_edge(&store, NewEdge::new(start.id, other_msg.id))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FanOutExceeded);

        // end as source
        let err = create_edge(&store, NewEdge::new(end.id, other_msg.id))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidEdge);

        // message -> condition is fine, second edge from the message is not
        create_edge(&store, NewEdge::new(msg.id, cond.id)).await.unwrap();
        let err = create_edge(&store, NewEdge::new(msg.id, end.id)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FanOutExceeded);

        // condition edges need a branch, and allow two
        let err = create_edge(&store, NewEdge::new(cond.id, end.id)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingField);
        create_edge(&store, NewEdge::branch(cond.id, end.id, Branch::Yes))
            .await
            .unwrap();
        create_edge(&store, NewEdge::branch(cond.id, other_msg.id, Branch::No))
            .await
            .unwrap();
        let third = create_node(&store, NewNode::message(wf.id, MessageStatus::Sent, "3"))
            .await
            .unwrap();
        let err = create_edge(&store, NewEdge::branch(cond.id, third.id, Branch::No))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FanOutExceeded);
    }

    #[tokio::test]
    async fn rejected_edges_write_nothing() {
        let store = MemoryStore::new();
        let wf = store.create_workflow("rejects").await.unwrap();
        let start = create_node(&store, NewNode::start(wf.id)).await.unwrap();
        let cond = create_node(&store, NewNode::condition(wf.id, "true")).await.unwrap();

        // start -> condition: a condition needs a message or condition before it
        let err = create_edge(&store, NewEdge::new(start.id, cond.id)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidEdge);
        assert!(store.list_edges(wf.id).await.unwrap().is_empty());

        // unknown source
        let ghost = Uuid::new_v4();
        let err = create_edge(&store, NewEdge::new(ghost, cond.id)).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { entity: "node", id } if id == ghost));
        assert!(store.list_edges(wf.id).await.unwrap().is_empty());

        // both unknown: the target is reported
        let (from, to) = (Uuid::new_v4(), Uuid::new_v4());
        let err = create_edge(&store, NewEdge::new(from, to)).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { id, .. } if id == to));
        assert!(store.list_edges(wf.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cross_workflow_edge_is_rejected() {
        let store = MemoryStore::new();
        let a = store.create_workflow("a").await.unwrap();
        let b = store.create_workflow("b").await.unwrap();
        let start = create_node(&store, NewNode::start(a.id)).await.unwrap();
        let end = create_node(&store, NewNode::end(b.id)).await.unwrap();

        let err = create_edge(&store, NewEdge::new(start.id, end.id)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CrossWorkflowEdge);
        assert!(store.list_edges(a.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn branch_on_plain_source_is_ignored() {
        let store = MemoryStore::new();
        let wf = store.create_workflow("plain").await.unwrap();
        let start = create_node(&store, NewNode::start(wf.id)).await.unwrap();
        let end = create_node(&store, NewNode::end(wf.id)).await.unwrap();

        let edge = create_edge(&store, NewEdge::branch(start.id, end.id, Branch::Yes))
            .await
            .unwrap();
        assert_eq!(edge.source_node_id, start.id);
    }

    #[tokio::test]
    async fn update_respects_node_type() {
        let store = MemoryStore::new();
        let wf = store.create_workflow("update").await.unwrap();
        let msg = create_node(&store, NewNode::message(wf.id, MessageStatus::Pending, "hi"))
            .await
            .unwrap();
        let cond = create_node(&store, NewNode::condition(wf.id, "true")).await.unwrap();
        let start = create_node(&store, NewNode::start(wf.id)).await.unwrap();

        let patch = NodePatch {
            status: Some(MessageStatus::Opened),
            ..NodePatch::default()
        };
        let updated = update_node(&store, msg.id, patch).await.unwrap();
        assert_eq!(
            updated.payload,
            NodePayload::Message(Message {
                status: MessageStatus::Opened,
                text: "hi".into()
            })
        );

        let patch = NodePatch {
            text: Some(String::new()),
            ..NodePatch::default()
        };
        let err = update_node(&store, msg.id, patch).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingField);

        let patch = NodePatch {
            status: Some(MessageStatus::Sent),
            ..NodePatch::default()
        };
        let err = update_node(&store, cond.id, patch).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidField);

        let patch = NodePatch {
            expression: Some("false".into()),
            ..NodePatch::default()
        };
        let updated = update_node(&store, cond.id, patch).await.unwrap();
        assert_eq!(updated.condition().unwrap().expression, "false");

        let unchanged = update_node(&store, start.id, NodePatch::default()).await.unwrap();
        assert_eq!(unchanged, start);

        let err = update_node(&store, Uuid::new_v4(), NodePatch::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
