//! `expression` crate: the `Evaluator` trait and the built-in rule language.
//!
//! Condition nodes carry a boolean expression such as `status == "sent"`.
//! The engine never interprets those strings itself; it hands them to an
//! [`Evaluator`] together with a flat [`Context`] built from the last
//! message node on the path. [`BuiltinEvaluator`] is the default
//! implementation, [`mock::MockEvaluator`] a test double.

pub mod builtin;
pub mod error;
pub mod lexer;
pub mod mock;
pub mod parser;
pub mod traits;

pub use builtin::BuiltinEvaluator;
pub use error::ExpressionError;
pub use traits::{Context, Evaluator};
