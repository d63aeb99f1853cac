//! Engine-level error types.

use thiserror::Error;
use uuid::Uuid;

use db::models::{Branch, NodeType};
use db::DbError;
use expression::ExpressionError;

/// Stable, fieldless classification of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    MissingField,
    InvalidField,
    InvalidTopology,
    InvalidEdge,
    DuplicateEdge,
    CrossWorkflowEdge,
    FanOutExceeded,
    MissingStartNode,
    MissingEndNode,
    DeadEnd,
    UnresolvableCondition,
    UnboundBranch,
    InvalidExpression,
    EvaluationError,
    CycleDetected,
    Database,
}

impl ErrorKind {
    /// Upper-snake-case code used on the wire.
    pub fn code(self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::MissingField => "MISSING_FIELD",
            Self::InvalidField => "INVALID_FIELD",
            Self::InvalidTopology => "INVALID_TOPOLOGY",
            Self::InvalidEdge => "INVALID_EDGE",
            Self::DuplicateEdge => "DUPLICATE_EDGE",
            Self::CrossWorkflowEdge => "CROSS_WORKFLOW_EDGE",
            Self::FanOutExceeded => "FAN_OUT_EXCEEDED",
            Self::MissingStartNode => "MISSING_START_NODE",
            Self::MissingEndNode => "MISSING_END_NODE",
            Self::DeadEnd => "DEAD_END",
            Self::UnresolvableCondition => "UNRESOLVABLE_CONDITION",
            Self::UnboundBranch => "UNBOUND_BRANCH",
            Self::InvalidExpression => "INVALID_EXPRESSION",
            Self::EvaluationError => "EVALUATION_ERROR",
            Self::CycleDetected => "CYCLE_DETECTED",
            Self::Database => "DATABASE",
        }
    }

    /// True for failures raised while walking a graph rather than mutating one.
    pub fn is_run_failure(self) -> bool {
        matches!(
            self,
            Self::MissingStartNode
                | Self::MissingEndNode
                | Self::DeadEnd
                | Self::UnresolvableCondition
                | Self::UnboundBranch
                | Self::InvalidExpression
                | Self::EvaluationError
                | Self::CycleDetected
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Errors produced by the workflow engine (validation + execution).
#[derive(Debug, Error)]
pub enum EngineError {
    /// A referenced workflow, node or edge does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    /// A workflow document referenced a node key it never declared.
    #[error("unknown node key '{0}'")]
    UnknownKey(String),

    // ------ Validation errors ------

    #[error("{owner} requires '{field}'")]
    MissingField { field: &'static str, owner: String },

    #[error("'{field}' does not apply to {node_type} nodes")]
    FieldNotApplicable {
        field: &'static str,
        node_type: NodeType,
    },

    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    #[error("invalid edge: {0}")]
    InvalidEdge(String),

    #[error("an edge already joins {source_node_id} and {target_node_id} ({existing})")]
    DuplicateEdge {
        source_node_id: Uuid,
        target_node_id: Uuid,
        existing: Uuid,
    },

    #[error("nodes {source_node_id} and {target_node_id} belong to different workflows")]
    CrossWorkflowEdge {
        source_node_id: Uuid,
        target_node_id: Uuid,
    },

    #[error("{node_type} node {node_id} already has {limit} outgoing edge(s)")]
    FanOutExceeded {
        node_id: Uuid,
        node_type: NodeType,
        limit: usize,
    },

    // ------ Execution errors ------

    #[error("workflow {workflow_id} has no start node")]
    MissingStartNode { workflow_id: Uuid },

    #[error("workflow {workflow_id} has no end node")]
    MissingEndNode { workflow_id: Uuid },

    #[error("node {node_id} has no outgoing edge")]
    DeadEnd { node_id: Uuid },

    #[error("condition {node_id} reached before any message node")]
    UnresolvableCondition { node_id: Uuid },

    #[error("condition {node_id} has no '{branch}' edge bound")]
    UnboundBranch { node_id: Uuid, branch: Branch },

    /// The evaluator rejected a condition's expression or context.
    #[error("condition {node_id} failed: {source}")]
    Condition {
        node_id: Uuid,
        #[source]
        source: ExpressionError,
    },

    #[error("walk would loop forever at node {node_id}")]
    CycleDetected { node_id: Uuid },

    /// Persistence error from the db crate.
    #[error("database error: {0}")]
    Database(DbError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } | Self::UnknownKey(_) => ErrorKind::NotFound,
            Self::MissingField { .. } => ErrorKind::MissingField,
            Self::FieldNotApplicable { .. } => ErrorKind::InvalidField,
            Self::InvalidTopology(_) => ErrorKind::InvalidTopology,
            Self::InvalidEdge(_) => ErrorKind::InvalidEdge,
            Self::DuplicateEdge { .. } => ErrorKind::DuplicateEdge,
            Self::CrossWorkflowEdge { .. } => ErrorKind::CrossWorkflowEdge,
            Self::FanOutExceeded { .. } => ErrorKind::FanOutExceeded,
            Self::MissingStartNode { .. } => ErrorKind::MissingStartNode,
            Self::MissingEndNode { .. } => ErrorKind::MissingEndNode,
            Self::DeadEnd { .. } => ErrorKind::DeadEnd,
            Self::UnresolvableCondition { .. } => ErrorKind::UnresolvableCondition,
            Self::UnboundBranch { .. } => ErrorKind::UnboundBranch,
            Self::Condition { source, .. } => match source {
                ExpressionError::Invalid { .. } => ErrorKind::InvalidExpression,
                ExpressionError::Evaluation(_) => ErrorKind::EvaluationError,
            },
            Self::CycleDetected { .. } => ErrorKind::CycleDetected,
            Self::Database(_) => ErrorKind::Database,
        }
    }

    pub(crate) fn missing(field: &'static str, owner: impl Into<String>) -> Self {
        Self::MissingField {
            field,
            owner: owner.into(),
        }
    }
}

impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => Self::NotFound { entity, id },
            other => Self::Database(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_not_found_keeps_its_kind() {
        let id = Uuid::new_v4();
        let err: EngineError = DbError::not_found("node", id).into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), format!("node {id} not found"));
    }

    #[test]
    fn condition_kind_follows_evaluator_failure() {
        let node_id = Uuid::new_v4();
        let invalid = EngineError::Condition {
            node_id,
            source: ExpressionError::Invalid {
                expression: "status ==".into(),
                reason: "unexpected end of input".into(),
            },
        };
        let evaluation = EngineError::Condition {
            node_id,
            source: ExpressionError::Evaluation("unknown identifier 'age'".into()),
        };

        assert_eq!(invalid.kind().code(), "INVALID_EXPRESSION");
        assert_eq!(evaluation.kind().code(), "EVALUATION_ERROR");
        assert!(evaluation.kind().is_run_failure());
    }

    #[test]
    fn validation_kinds_are_not_run_failures() {
        assert!(!ErrorKind::DuplicateEdge.is_run_failure());
        assert!(!ErrorKind::NotFound.is_run_failure());
        assert!(ErrorKind::CycleDetected.is_run_failure());
    }
}
