//! End-to-end tests for the engine: topology rules, graph building and
//! path resolution, driven through `WorkflowExecutor`.
//!
//! Everything runs against `MemoryStore`, so no Postgres connection is
//! required. `MockEvaluator` stands in for the rule language where a test
//! cares about which conditions were evaluated rather than how.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use db::models::{Branch, Condition, Message, MessageStatus, NodePayload, NodeRow, WorkflowRow, WorkflowSnapshot};
use db::{MemoryStore, Store};
use expression::mock::MockEvaluator;
use expression::{BuiltinEvaluator, Evaluator, ExpressionError};

use crate::models::{NewEdge, NewNode, NodePatch};
use crate::{resolve_path, topology, workflows, EngineError, ErrorKind, WorkflowExecutor, WorkflowGraph};

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

struct Fixture {
    store: Arc<MemoryStore>,
    workflow_id: Uuid,
}

impl Fixture {
    async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let workflow = workflows::create_workflow(store.as_ref(), "fixture")
            .await
            .expect("create workflow");
        Self {
            store,
            workflow_id: workflow.id,
        }
    }

    async fn try_node(&self, node: NewNode) -> Result<NodeRow, EngineError> {
        topology::create_node(self.store.as_ref(), node).await
    }

    async fn start(&self) -> Uuid {
        self.try_node(NewNode::start(self.workflow_id)).await.expect("start").id
    }

    async fn end(&self) -> Uuid {
        self.try_node(NewNode::end(self.workflow_id)).await.expect("end").id
    }

    async fn message(&self, status: MessageStatus, text: &str) -> Uuid {
        self.try_node(NewNode::message(self.workflow_id, status, text))
            .await
            .expect("message")
            .id
    }

    async fn condition(&self, expression: &str) -> Uuid {
        self.try_node(NewNode::condition(self.workflow_id, expression))
            .await
            .expect("condition")
            .id
    }

    async fn edge(&self, source: Uuid, target: Uuid) -> Uuid {
        topology::create_edge(self.store.as_ref(), NewEdge::new(source, target))
            .await
            .expect("edge")
            .id
    }

    async fn branch(&self, source: Uuid, target: Uuid, branch: Branch) -> Uuid {
        topology::create_edge(self.store.as_ref(), NewEdge::branch(source, target, branch))
            .await
            .expect("branch edge")
            .id
    }

    fn executor(&self, evaluator: impl Evaluator + 'static) -> WorkflowExecutor {
        WorkflowExecutor::new(self.store.clone(), Arc::new(evaluator))
    }

    async fn run(&self, evaluator: impl Evaluator + 'static) -> Result<Vec<Uuid>, EngineError> {
        let run = self.executor(evaluator).run(self.workflow_id).await?;
        Ok(run.node_ids())
    }
}

/// The branching example:
///
/// ```text
/// start -> msg1(opened) -> cond1(status == "sent")
///   cond1 yes -> msg2 -> end
///   cond1 no  -> cond2(status == "opened")
///     cond2 yes -> msg3 -> end
///     cond2 no  -> msg4 -> end
/// ```
struct Example {
    fx: Fixture,
    start: Uuid,
    msg1: Uuid,
    cond1: Uuid,
    msg2: Uuid,
    cond2: Uuid,
    msg3: Uuid,
    msg4: Uuid,
    end: Uuid,
}

async fn example() -> Example {
    let fx = Fixture::new().await;
    let start = fx.start().await;
    let msg1 = fx.message(MessageStatus::Opened, "hello").await;
    let cond1 = fx.condition(r#"status == "sent""#).await;
    let msg2 = fx.message(MessageStatus::Pending, "Thanks for reading!").await;
    let cond2 = fx.condition(r#"status == "opened""#).await;
    let msg3 = fx.message(MessageStatus::Pending, "How old are you?").await;
    let msg4 = fx.message(MessageStatus::Pending, "Did you get our message?").await;
    let end = fx.end().await;

    fx.edge(start, msg1).await;
    fx.edge(msg1, cond1).await;
    fx.branch(cond1, msg2, Branch::Yes).await;
    fx.branch(cond1, cond2, Branch::No).await;
    fx.edge(msg2, end).await;
    fx.branch(cond2, msg3, Branch::Yes).await;
    fx.branch(cond2, msg4, Branch::No).await;
    fx.edge(msg3, end).await;
    fx.edge(msg4, end).await;

    Example {
        fx,
        start,
        msg1,
        cond1,
        msg2,
        cond2,
        msg3,
        msg4,
        end,
    }
}

// ============================================================
// Path resolution
// ============================================================

#[tokio::test]
async fn example_takes_no_branch_then_yes_branch() {
    let ex = example().await;
    let path = ex.fx.run(BuiltinEvaluator::new()).await.unwrap();
    assert_eq!(
        path,
        vec![ex.start, ex.msg1, ex.cond1, ex.cond2, ex.msg3, ex.end]
    );
}

#[tokio::test]
async fn run_returns_full_node_records() {
    let ex = example().await;
    let run = ex
        .fx
        .executor(BuiltinEvaluator::new())
        .run(ex.fx.workflow_id)
        .await
        .unwrap();

    assert_eq!(run.workflow_id, ex.fx.workflow_id);
    let json = serde_json::to_value(&run.nodes).unwrap();
    assert_eq!(json[0], json!({ "id": ex.start, "type": "start" }));
    assert_eq!(
        json[1],
        json!({ "id": ex.msg1, "type": "message", "status": "opened", "text": "hello" })
    );
    assert_eq!(
        json[2],
        json!({
            "id": ex.cond1,
            "type": "condition",
            "expression": "status == \"sent\"",
            "yes_node_id": ex.msg2,
            "no_node_id": ex.cond2,
        })
    );
    assert_eq!(json[5], json!({ "id": ex.end, "type": "end" }));
}

#[tokio::test]
async fn repeated_runs_are_identical() {
    let ex = example().await;
    let executor = ex.fx.executor(BuiltinEvaluator::new());

    let first = executor.run(ex.fx.workflow_id).await.unwrap();
    let second = executor.run(ex.fx.workflow_id).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn run_sees_updated_message_status() {
    let ex = example().await;
    let patch = NodePatch {
        status: Some(MessageStatus::Sent),
        ..NodePatch::default()
    };
    topology::update_node(ex.fx.store.as_ref(), ex.msg1, patch)
        .await
        .unwrap();

    let path = ex.fx.run(BuiltinEvaluator::new()).await.unwrap();
    assert_eq!(path, vec![ex.start, ex.msg1, ex.cond1, ex.msg2, ex.end]);
}

#[tokio::test]
async fn conditions_see_the_last_message() {
    let ex = example().await;
    let evaluator = MockEvaluator::table([(r#"status == "opened""#, false)]);
    let path = ex.fx.run(evaluator.clone()).await.unwrap();

    assert_eq!(path, vec![ex.start, ex.msg1, ex.cond1, ex.cond2, ex.msg4, ex.end]);

    let calls = evaluator.recorded_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].0, r#"status == "sent""#);
    assert_eq!(calls[1].0, r#"status == "opened""#);
    for (_, context) in &calls {
        assert_eq!(context["status"], json!("opened"));
        assert_eq!(context["text"], json!("hello"));
    }
}

#[tokio::test]
async fn message_reached_by_branch_becomes_last_message() {
    let fx = Fixture::new().await;
    let start = fx.start().await;
    let first = fx.message(MessageStatus::Sent, "first").await;
    let cond_a = fx.condition("true").await;
    let second = fx.message(MessageStatus::Opened, "second").await;
    let cond_b = fx.condition("check").await;
    let end = fx.end().await;

    fx.edge(start, first).await;
    fx.edge(first, cond_a).await;
    fx.branch(cond_a, second, Branch::Yes).await;
    fx.edge(second, cond_b).await;
    fx.branch(cond_b, end, Branch::Yes).await;

    let evaluator = MockEvaluator::always(true);
    let path = fx.run(evaluator.clone()).await.unwrap();
    assert_eq!(path, vec![start, first, cond_a, second, cond_b, end]);

    let calls = evaluator.recorded_calls();
    assert_eq!(calls[1].1["text"], json!("second"));
}

// ============================================================
// Run failures
// ============================================================

#[tokio::test]
async fn missing_end_node_fails_before_walking() {
    let fx = Fixture::new().await;
    let start = fx.start().await;
    let msg = fx.message(MessageStatus::Sent, "hi").await;
    let cond = fx.condition("true").await;
    fx.edge(start, msg).await;
    fx.edge(msg, cond).await;

    let evaluator = MockEvaluator::always(true);
    let err = fx.run(evaluator.clone()).await.unwrap_err();
    assert!(matches!(err, EngineError::MissingEndNode { workflow_id } if workflow_id == fx.workflow_id));
    assert_eq!(evaluator.call_count(), 0);
}

#[tokio::test]
async fn missing_start_node_fails() {
    let fx = Fixture::new().await;
    fx.end().await;

    let err = fx.run(BuiltinEvaluator::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MissingStartNode);
}

#[tokio::test]
async fn unknown_workflow_is_not_found() {
    let fx = Fixture::new().await;
    let err = fx
        .executor(BuiltinEvaluator::new())
        .run(Uuid::new_v4())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn unbound_no_branch_names_the_condition() {
    let fx = Fixture::new().await;
    let start = fx.start().await;
    let msg = fx.message(MessageStatus::Opened, "hello").await;
    let cond = fx.condition(r#"status == "sent""#).await;
    let end = fx.end().await;
    fx.edge(start, msg).await;
    fx.edge(msg, cond).await;
    fx.branch(cond, end, Branch::Yes).await;

    let err = fx.run(BuiltinEvaluator::new()).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::UnboundBranch { node_id, branch: Branch::No } if node_id == cond
    ));
}

#[tokio::test]
async fn deleting_a_bound_edge_unbinds_the_branch() {
    let ex = example().await;
    let edges = ex.fx.store.list_edges(ex.fx.workflow_id).await.unwrap();
    let no_edge = edges
        .iter()
        .find(|e| e.source_node_id == ex.cond1 && e.target_node_id == ex.cond2)
        .unwrap();
    workflows::delete_edge(ex.fx.store.as_ref(), no_edge.id)
        .await
        .unwrap();

    let err = ex.fx.run(BuiltinEvaluator::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnboundBranch);
}

#[tokio::test]
async fn dead_end_names_the_stuck_node() {
    let fx = Fixture::new().await;
    let start = fx.start().await;
    let msg = fx.message(MessageStatus::Sent, "hi").await;
    fx.end().await;
    fx.edge(start, msg).await;

    let err = fx.run(BuiltinEvaluator::new()).await.unwrap_err();
    assert!(matches!(err, EngineError::DeadEnd { node_id } if node_id == msg));
}

#[tokio::test]
async fn deleting_a_node_breaks_the_path() {
    let ex = example().await;
    workflows::delete_node(ex.fx.store.as_ref(), ex.msg3)
        .await
        .unwrap();

    let err = ex.fx.run(BuiltinEvaluator::new()).await.unwrap_err();
    assert!(matches!(err, EngineError::UnboundBranch { node_id, branch: Branch::Yes } if node_id == ex.cond2));
}

#[tokio::test]
async fn evaluator_failure_is_tagged_with_the_condition() {
    let ex = example().await;
    let evaluator =
        MockEvaluator::failing(ExpressionError::Evaluation("unknown identifier 'age'".into()));

    let err = ex.fx.run(evaluator).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EvaluationError);
    assert!(matches!(err, EngineError::Condition { node_id, .. } if node_id == ex.cond1));
}

#[tokio::test]
async fn unparsable_expression_is_invalid_expression() {
    let fx = Fixture::new().await;
    let start = fx.start().await;
    let msg = fx.message(MessageStatus::Sent, "hi").await;
    let cond = fx.condition("status ==").await;
    let end = fx.end().await;
    fx.edge(start, msg).await;
    fx.edge(msg, cond).await;
    fx.branch(cond, end, Branch::Yes).await;

    let err = fx.run(BuiltinEvaluator::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidExpression);
}

#[tokio::test]
async fn deeply_nested_expression_fails_the_run_cleanly() {
    let fx = Fixture::new().await;
    let start = fx.start().await;
    let msg = fx.message(MessageStatus::Sent, "hi").await;
    let cond = fx.condition(&format!("{}true", "not ".repeat(20_000))).await;
    let end = fx.end().await;
    fx.edge(start, msg).await;
    fx.edge(msg, cond).await;
    fx.branch(cond, end, Branch::Yes).await;

    let err = fx.run(BuiltinEvaluator::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidExpression);
    assert!(matches!(err, EngineError::Condition { node_id, .. } if node_id == cond));
}

#[tokio::test]
async fn loop_back_to_a_message_is_a_cycle() {
    let fx = Fixture::new().await;
    let start = fx.start().await;
    let first = fx.message(MessageStatus::Sent, "first").await;
    let second = fx.message(MessageStatus::Sent, "second").await;
    let cond = fx.condition("again").await;
    let end = fx.end().await;
    fx.edge(start, first).await;
    fx.edge(first, second).await;
    fx.edge(second, cond).await;
    fx.branch(cond, first, Branch::Yes).await;
    fx.branch(cond, end, Branch::No).await;

    let err = fx.run(MockEvaluator::always(true)).await.unwrap_err();
    assert!(matches!(err, EngineError::CycleDetected { node_id } if node_id == first));

    // the other branch leaves the loop
    let path = fx.run(MockEvaluator::always(false)).await.unwrap();
    assert_eq!(path, vec![start, first, second, cond, end]);
}

#[tokio::test]
async fn condition_ring_is_a_cycle() {
    let fx = Fixture::new().await;
    let start = fx.start().await;
    let msg = fx.message(MessageStatus::Sent, "hi").await;
    let c1 = fx.condition("one").await;
    let c2 = fx.condition("two").await;
    let c3 = fx.condition("three").await;
    let end = fx.end().await;
    fx.edge(start, msg).await;
    fx.edge(msg, c1).await;
    fx.branch(c1, c2, Branch::No).await;
    fx.branch(c2, c3, Branch::No).await;
    fx.branch(c3, c1, Branch::No).await;
    fx.branch(c1, end, Branch::Yes).await;

    let evaluator = MockEvaluator::always(false);
    let err = fx.run(evaluator.clone()).await.unwrap_err();
    assert!(matches!(err, EngineError::CycleDetected { node_id } if node_id == c1));
    assert_eq!(evaluator.call_count(), 3);
}

#[test]
fn condition_before_any_message_is_unresolvable() {
    // Topology rules never let a condition follow a start node, so build
    // the snapshot by hand.
    let workflow_id = Uuid::new_v4();
    let row = |payload| NodeRow {
        id: Uuid::new_v4(),
        workflow_id,
        payload,
        created_at: Utc::now(),
    };
    let start = row(NodePayload::Start);
    let cond = row(NodePayload::Condition(Condition::new("true")));
    let end = row(NodePayload::End);
    let edge = db::models::EdgeRow {
        id: Uuid::new_v4(),
        source_node_id: start.id,
        target_node_id: cond.id,
        created_at: Utc::now(),
    };
    let snapshot = WorkflowSnapshot {
        workflow: WorkflowRow {
            id: workflow_id,
            name: "handmade".into(),
            created_at: Utc::now(),
        },
        nodes: vec![start, cond.clone(), end],
        edges: vec![edge],
    };

    let graph = WorkflowGraph::build(&snapshot);
    let err = resolve_path(&graph, &MockEvaluator::always(true)).unwrap_err();
    assert!(matches!(err, EngineError::UnresolvableCondition { node_id } if node_id == cond.id));
}

#[test]
fn start_directly_to_end_resolves() {
    let workflow_id = Uuid::new_v4();
    let start = NodeRow {
        id: Uuid::new_v4(),
        workflow_id,
        payload: NodePayload::Start,
        created_at: Utc::now(),
    };
    let end = NodeRow {
        id: Uuid::new_v4(),
        workflow_id,
        payload: NodePayload::End,
        created_at: Utc::now(),
    };
    let snapshot = WorkflowSnapshot {
        workflow: WorkflowRow {
            id: workflow_id,
            name: "short".into(),
            created_at: Utc::now(),
        },
        edges: vec![db::models::EdgeRow {
            id: Uuid::new_v4(),
            source_node_id: start.id,
            target_node_id: end.id,
            created_at: Utc::now(),
        }],
        nodes: vec![start.clone(), end.clone()],
    };

    let path = resolve_path(&WorkflowGraph::build(&snapshot), &BuiltinEvaluator::new()).unwrap();
    let ids: Vec<Uuid> = path.iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![start.id, end.id]);
}

// ============================================================
// Topology through the fixture
// ============================================================

#[tokio::test]
async fn second_start_node_is_invalid_topology() {
    let fx = Fixture::new().await;
    fx.start().await;
    let err = fx.try_node(NewNode::start(fx.workflow_id)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTopology);

    // same outcome when other nodes come first
    let other = Fixture::new().await;
    other.message(MessageStatus::Sent, "hi").await;
    other.end().await;
    other.start().await;
    let err = other
        .try_node(NewNode::start(other.workflow_id))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTopology);
}

#[tokio::test]
async fn condition_edge_without_branch_is_missing_field() {
    let fx = Fixture::new().await;
    let cond = fx.condition("true").await;
    let end = fx.end().await;

    let err = topology::create_edge(fx.store.as_ref(), NewEdge::new(cond, end))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MissingField);
    assert!(fx.store.list_edges(fx.workflow_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn binding_one_slot_leaves_the_other() {
    let fx = Fixture::new().await;
    let cond = fx.condition("true").await;
    let a = fx.message(MessageStatus::Sent, "a").await;
    let b = fx.message(MessageStatus::Sent, "b").await;

    let no_edge = fx.branch(cond, a, Branch::No).await;
    let yes_edge = fx.branch(cond, b, Branch::Yes).await;

    let node = fx.store.get_node(cond).await.unwrap();
    let condition = node.condition().unwrap();
    assert_eq!(condition.no_edge, Some(no_edge));
    assert_eq!(condition.yes_edge, Some(yes_edge));
}

#[tokio::test]
async fn rebinding_a_slot_keeps_the_old_edge() {
    let fx = Fixture::new().await;
    let cond = fx.condition("true").await;
    let a = fx.message(MessageStatus::Sent, "a").await;
    let b = fx.message(MessageStatus::Sent, "b").await;

    let first = fx.branch(cond, a, Branch::Yes).await;
    let second = fx.branch(cond, b, Branch::Yes).await;

    let node = fx.store.get_node(cond).await.unwrap();
    assert_eq!(
        node.payload,
        NodePayload::Condition(Condition {
            expression: "true".into(),
            yes_edge: Some(second),
            no_edge: None,
        })
    );
    assert!(fx.store.get_edge(first).await.is_ok());
}

#[tokio::test]
async fn message_payload_round_trips_through_update() {
    let fx = Fixture::new().await;
    let msg = fx.message(MessageStatus::Pending, "draft").await;

    let patch = NodePatch {
        status: Some(MessageStatus::Sent),
        text: Some("final".into()),
        expression: None,
    };
    let row = topology::update_node(fx.store.as_ref(), msg, patch)
        .await
        .unwrap();
    assert_eq!(
        row.payload,
        NodePayload::Message(Message {
            status: MessageStatus::Sent,
            text: "final".into(),
        })
    );
}
