use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use engine::{workflows, WorkflowDetail, WorkflowRun};

use crate::{ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct CreateWorkflowDto {
    pub name: String,
}

pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<WorkflowDetail>>> {
    Ok(Json(workflows::list_workflows(state.store.as_ref()).await?))
}

pub async fn get(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> ApiResult<Json<WorkflowDetail>> {
    Ok(Json(workflows::get_workflow(state.store.as_ref(), id).await?))
}

pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<CreateWorkflowDto>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<WorkflowDetail>)> {
    let Json(payload) = payload?;
    let workflow = workflows::create_workflow(state.store.as_ref(), &payload.name).await?;
    let detail = WorkflowDetail {
        workflow,
        nodes: Vec::new(),
        edges: Vec::new(),
    };
    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn delete(Path(id): Path<Uuid>, State(state): State<AppState>) -> ApiResult<StatusCode> {
    workflows::delete_workflow(state.store.as_ref(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn run(Path(id): Path<Uuid>, State(state): State<AppState>) -> ApiResult<Json<WorkflowRun>> {
    Ok(Json(state.executor.run(id).await?))
}
