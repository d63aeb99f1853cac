//! `engine` crate: topology validation, graph building and path resolution.
//!
//! Mutations go through [`topology`]; a run goes through
//! [`WorkflowExecutor::run`], which builds a [`WorkflowGraph`] from a store
//! snapshot and resolves it with [`resolve_path`].

pub mod document;
pub mod error;
pub mod executor;
pub mod graph;
pub mod models;
pub mod resolver;
pub mod topology;
pub mod workflows;

pub use error::{EngineError, ErrorKind};
pub use executor::WorkflowExecutor;
pub use graph::{GraphNode, NodeData, WorkflowGraph};
pub use models::{NewEdge, NewNode, NodePatch, WorkflowDetail, WorkflowRun};
pub use resolver::resolve_path;

#[cfg(test)]
mod executor_tests;
