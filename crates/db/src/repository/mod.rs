//! Repository functions: one function per database operation.
//!
//! Reads accept any `PgExecutor` so they can run on the pool or inside a
//! snapshot transaction; writes that touch several tables open their own
//! transaction. No topology rules, only SQL.

pub mod edges;
pub mod nodes;
pub mod workflows;
