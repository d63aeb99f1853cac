//! `db` crate: the entity model and the record store behind it.
//!
//! Provides typed records, the [`Store`] trait the engine is written
//! against, an in-memory [`MemoryStore`], and a Postgres-backed
//! [`PgStore`].  No topology rules live here: the store accepts whatever
//! the engine has already validated.

pub mod error;
pub mod memory;
pub mod models;
pub mod pool;
pub mod postgres;
pub mod repository;
pub mod store;

pub use error::DbError;
pub use memory::MemoryStore;
pub use pool::DbPool;
pub use postgres::PgStore;
pub use store::Store;
