//! `api` crate: HTTP REST API over the engine.
//!
//! Exposes:
//!   GET    /api/health
//!   POST   /api/workflows
//!   GET    /api/workflows
//!   GET    /api/workflows/:id
//!   DELETE /api/workflows/:id
//!   GET    /api/workflows/:id/run
//!   POST   /api/nodes
//!   PATCH  /api/nodes/:id
//!   DELETE /api/nodes/:id
//!   POST   /api/edges
//!   DELETE /api/edges/:id

pub mod error;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, patch, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use db::Store;
use engine::WorkflowExecutor;
use expression::Evaluator;

pub use error::{ApiError, ApiResult};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub executor: WorkflowExecutor,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, evaluator: Arc<dyn Evaluator>) -> Self {
        let executor = WorkflowExecutor::new(store.clone(), evaluator);
        Self { store, executor }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route(
            "/api/workflows",
            get(handlers::workflows::list).post(handlers::workflows::create),
        )
        .route(
            "/api/workflows/:id",
            get(handlers::workflows::get).delete(handlers::workflows::delete),
        )
        .route("/api/workflows/:id/run", get(handlers::workflows::run))
        .route("/api/nodes", post(handlers::nodes::create))
        .route(
            "/api/nodes/:id",
            patch(handlers::nodes::update).delete(handlers::nodes::delete),
        )
        .route("/api/edges", post(handlers::edges::create))
        .route("/api/edges/:id", axum::routing::delete(handlers::edges::delete))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `addr` and serve the API until the process is stopped.
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API listening");
    axum::serve(listener, router(state)).await
}
