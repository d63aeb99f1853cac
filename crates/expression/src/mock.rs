//! `MockEvaluator`: a test double for `Evaluator`.
//!
//! Useful in engine tests that care about *which* expressions were
//! evaluated and against what, rather than about the rule language itself.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::{Context, Evaluator, ExpressionError};

/// Behaviour injected into `MockEvaluator` at construction time.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Look the expression up in a table; unknown expressions yield `default`.
    Table {
        results: HashMap<String, bool>,
        default: bool,
    },
    /// Fail every call with the given error.
    Fail(ExpressionError),
}

/// A mock evaluator that records every call it receives and returns a
/// programmer-specified result.
#[derive(Debug, Clone)]
pub struct MockEvaluator {
    /// What the evaluator will do when `evaluate` is called.
    pub behaviour: MockBehaviour,
    /// Every `(expression, context)` pair seen, in call order.
    pub calls: Arc<Mutex<Vec<(String, Context)>>>,
}

impl MockEvaluator {
    /// Create a mock that always answers `result`.
    pub fn always(result: bool) -> Self {
        Self::with_behaviour(MockBehaviour::Table {
            results: HashMap::new(),
            default: result,
        })
    }

    /// Create a mock that answers from `results`, `false` for anything else.
    pub fn table<I, S>(results: I) -> Self
    where
        I: IntoIterator<Item = (S, bool)>,
        S: Into<String>,
    {
        Self::with_behaviour(MockBehaviour::Table {
            results: results.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            default: false,
        })
    }

    /// Create a mock that always fails with `error`.
    pub fn failing(error: ExpressionError) -> Self {
        Self::with_behaviour(MockBehaviour::Fail(error))
    }

    fn with_behaviour(behaviour: MockBehaviour) -> Self {
        Self {
            behaviour,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of times `evaluate` has been called.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Snapshot of every recorded call.
    pub fn recorded_calls(&self) -> Vec<(String, Context)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Evaluator for MockEvaluator {
    fn evaluate(&self, expression: &str, context: &Context) -> Result<bool, ExpressionError> {
        self.calls
            .lock()
            .unwrap()
            .push((expression.to_owned(), context.clone()));

        match &self.behaviour {
            MockBehaviour::Table { results, default } => {
                Ok(results.get(expression).copied().unwrap_or(*default))
            }
            MockBehaviour::Fail(error) => Err(error.clone()),
        }
    }
}
