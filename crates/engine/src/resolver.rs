//! Path resolver: walks a built graph from its start node to its end node.
//!
//! Exactly one path is taken: plain nodes follow their first successor in
//! edge creation order, condition nodes follow the branch their expression
//! selects. Expressions are evaluated against the last message node on the
//! path. Conditions whose branch leads to another condition are evaluated
//! in turn.
//!
//! Every message visited counts, including one reached through a condition
//! branch: a condition after it sees that message, not the one before the
//! branch.
//!
//! The walk is a function of `(current node, last message)`; seeing the
//! same pair twice means it would never terminate, so it fails with
//! [`EngineError::CycleDetected`] instead.

use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, instrument};
use uuid::Uuid;

use db::models::Branch;
use expression::{Context, Evaluator};

use crate::graph::{GraphNode, NodeData, WorkflowGraph};
use crate::EngineError;

/// Resolve the single execution path through `graph`.
///
/// # Errors
/// - [`EngineError::MissingStartNode`] / [`EngineError::MissingEndNode`]
///   before any traversal.
/// - [`EngineError::DeadEnd`] when a non-end node has no successor.
/// - [`EngineError::UnresolvableCondition`] for a condition reached before
///   any message node.
/// - [`EngineError::Condition`] when the evaluator fails.
/// - [`EngineError::UnboundBranch`] when the selected branch has no edge.
/// - [`EngineError::CycleDetected`] when the walk would repeat itself.
#[instrument(skip_all, fields(workflow_id = %graph.workflow_id()))]
pub fn resolve_path(
    graph: &WorkflowGraph,
    evaluator: &dyn Evaluator,
) -> Result<Vec<GraphNode>, EngineError> {
    let workflow_id = graph.workflow_id();
    let start = graph
        .start()
        .ok_or(EngineError::MissingStartNode { workflow_id })?;
    let end = graph.end().ok_or(EngineError::MissingEndNode { workflow_id })?;

    let mut walk = Walk::new(graph);
    let mut current = start;

    loop {
        walk.visit(current)?;
        if current == end {
            break;
        }

        let next = graph
            .first_successor(current)
            .ok_or(EngineError::DeadEnd { node_id: current })?;

        current = match walk.node(next)?.data {
            NodeData::Condition { .. } => walk.branch(next, evaluator)?,
            _ => next,
        };
    }

    debug!(steps = walk.path.len(), "path resolved");
    Ok(walk.path)
}

// ---------------------------------------------------------------------------
// Walk state
// ---------------------------------------------------------------------------

struct Walk<'g> {
    graph: &'g WorkflowGraph,
    path: Vec<GraphNode>,
    last_message: Option<&'g GraphNode>,
    seen: HashSet<(Uuid, Option<Uuid>)>,
}

impl<'g> Walk<'g> {
    fn new(graph: &'g WorkflowGraph) -> Self {
        Self {
            graph,
            path: Vec::new(),
            last_message: None,
            seen: HashSet::new(),
        }
    }

    fn node(&self, id: Uuid) -> Result<&'g GraphNode, EngineError> {
        self.graph
            .node(id)
            .ok_or(EngineError::NotFound { entity: "node", id })
    }

    /// Append `id` to the path.
    fn visit(&mut self, id: Uuid) -> Result<(), EngineError> {
        let node = self.node(id)?;
        if matches!(node.data, NodeData::Message { .. }) {
            self.last_message = Some(node);
        }

        let state = (id, self.last_message.map(|message| message.id));
        if !self.seen.insert(state) {
            return Err(EngineError::CycleDetected { node_id: id });
        }

        debug!(node_id = %id, node_type = %node.node_type(), "visit");
        self.path.push(node.clone());
        Ok(())
    }

    /// Evaluate the condition `id`, and any condition its branch lands on,
    /// returning the first non-condition node reached.
    fn branch(&mut self, mut id: Uuid, evaluator: &dyn Evaluator) -> Result<Uuid, EngineError> {
        loop {
            self.visit(id)?;

            let NodeData::Condition {
                expression,
                yes_node_id,
                no_node_id,
            } = &self.node(id)?.data
            else {
                return Ok(id);
            };

            let message = self
                .last_message
                .ok_or(EngineError::UnresolvableCondition { node_id: id })?;

            let outcome = evaluator
                .evaluate(expression, &message_context(message))
                .map_err(|source| EngineError::Condition { node_id: id, source })?;

            let (branch, target) = if outcome {
                (Branch::Yes, *yes_node_id)
            } else {
                (Branch::No, *no_node_id)
            };
            debug!(node_id = %id, %branch, "condition evaluated");

            let target = target.ok_or(EngineError::UnboundBranch { node_id: id, branch })?;
            match self.node(target)?.data {
                NodeData::Condition { .. } => id = target,
                _ => return Ok(target),
            }
        }
    }
}

/// The evaluation context exposed by a message node.
fn message_context(node: &GraphNode) -> Context {
    let mut context = Context::new();
    if let NodeData::Message { status, text } = &node.data {
        context.insert("status".into(), Value::String(status.as_str().to_owned()));
        context.insert("text".into(), Value::String(text.clone()));
    }
    context
}
