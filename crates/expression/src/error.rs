//! Expression-level error type.

use thiserror::Error;

/// Errors returned by an [`Evaluator`](crate::Evaluator).
///
/// The engine wraps both variants in a single condition error tagged with
/// the offending node, so callers never see these raw.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExpressionError {
    /// The expression string could not be parsed.
    #[error("invalid expression '{expression}': {reason}")]
    Invalid { expression: String, reason: String },

    /// The expression parsed but could not be evaluated against the context.
    #[error("evaluation error: {0}")]
    Evaluation(String),
}

impl ExpressionError {
    pub(crate) fn invalid(expression: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            expression: expression.to_owned(),
            reason: reason.into(),
        }
    }
}
