//! The `Evaluator` trait: the contract every expression backend must fulfil.

use std::collections::HashMap;

use serde_json::Value;

use crate::ExpressionError;

/// Flat key/value state an expression is evaluated against.
///
/// For condition nodes this holds the observable fields of the most
/// recently visited message (`status`, `text`).
pub type Context = HashMap<String, Value>;

/// A pluggable boolean expression backend.
///
/// Implementations must be pure: the same expression and context always
/// yield the same result.
pub trait Evaluator: Send + Sync {
    /// Evaluate `expression` against `context`.
    ///
    /// # Errors
    /// - [`ExpressionError::Invalid`] if the expression cannot be parsed.
    /// - [`ExpressionError::Evaluation`] if evaluation against `context` fails.
    fn evaluate(&self, expression: &str, context: &Context) -> Result<bool, ExpressionError>;
}
