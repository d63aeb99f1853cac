use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use db::models::{Branch, EdgeRow};
use engine::{topology, workflows, NewEdge};

use crate::{ApiResult, AppState};

/// `is_yes_condition` picks the branch when the source is a condition node.
#[derive(Debug, Deserialize)]
pub struct CreateEdgeDto {
    pub source_node_id: Uuid,
    pub target_node_id: Uuid,
    #[serde(default)]
    pub is_yes_condition: Option<bool>,
}

impl From<CreateEdgeDto> for NewEdge {
    fn from(dto: CreateEdgeDto) -> Self {
        Self {
            source_node_id: dto.source_node_id,
            target_node_id: dto.target_node_id,
            branch: dto
                .is_yes_condition
                .map(|yes| if yes { Branch::Yes } else { Branch::No }),
        }
    }
}

pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<CreateEdgeDto>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<EdgeRow>)> {
    let Json(dto) = payload?;
    let row = topology::create_edge(state.store.as_ref(), dto.into()).await?;
    Ok((StatusCode::CREATED, Json(row)))
}

pub async fn delete(Path(id): Path<Uuid>, State(state): State<AppState>) -> ApiResult<StatusCode> {
    workflows::delete_edge(state.store.as_ref(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}
