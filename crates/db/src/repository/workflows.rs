//! Workflow CRUD operations.

use chrono::Utc;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::{models::WorkflowRow, DbError};

/// Insert a new workflow.
pub async fn create_workflow(pool: &PgPool, name: &str) -> Result<WorkflowRow, DbError> {
    let row = sqlx::query_as::<_, WorkflowRow>(
        r#"
        INSERT INTO workflows (id, name, created_at)
        VALUES ($1, $2, $3)
        RETURNING id, name, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Fetch a single workflow by its primary key.
pub async fn get_workflow<'e>(
    executor: impl PgExecutor<'e>,
    id: Uuid,
) -> Result<WorkflowRow, DbError> {
    sqlx::query_as::<_, WorkflowRow>("SELECT id, name, created_at FROM workflows WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or(DbError::not_found("workflow", id))
}

/// Return all workflows ordered by creation time (newest first).
pub async fn list_workflows(pool: &PgPool) -> Result<Vec<WorkflowRow>, DbError> {
    let rows = sqlx::query_as::<_, WorkflowRow>(
        "SELECT id, name, created_at FROM workflows ORDER BY created_at DESC, id DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Delete a workflow; nodes, payloads and edges go with it (`ON DELETE CASCADE`).
///
/// Returns `DbError::NotFound` if no row was deleted.
pub async fn delete_workflow(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM workflows WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("workflow", id));
    }

    Ok(())
}
