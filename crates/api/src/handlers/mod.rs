//! Route handlers, one module per resource.

pub mod edges;
pub mod nodes;
pub mod workflows;

use axum::Json;
use serde_json::{json, Value};

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
