use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use db::models::NodeRow;
use engine::{topology, workflows, NewNode, NodePatch};

use crate::{ApiResult, AppState};

pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<NewNode>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<NodeRow>)> {
    let Json(node) = payload?;
    let row = topology::create_node(state.store.as_ref(), node).await?;
    Ok((StatusCode::CREATED, Json(row)))
}

pub async fn update(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    payload: Result<Json<NodePatch>, JsonRejection>,
) -> ApiResult<Json<NodeRow>> {
    let Json(patch) = payload?;
    Ok(Json(topology::update_node(state.store.as_ref(), id, patch).await?))
}

pub async fn delete(Path(id): Path<Uuid>, State(state): State<AppState>) -> ApiResult<StatusCode> {
    workflows::delete_node(state.store.as_ref(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}
