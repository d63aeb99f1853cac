//! Edge CRUD operations.

use chrono::Utc;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::models::{Branch, EdgeRow};
use crate::DbError;

/// Insert an edge and, for condition sources, bind the chosen slot to it.
///
/// Both writes share one transaction so a half-bound edge is never visible.
/// Rebinding a slot moves only the reference; the previous edge row stays.
pub async fn create_edge(
    pool: &PgPool,
    source_node_id: Uuid,
    target_node_id: Uuid,
    branch: Option<Branch>,
) -> Result<EdgeRow, DbError> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, EdgeRow>(
        r#"
        INSERT INTO edges (id, source_node_id, target_node_id, created_at)
        VALUES ($1, $2, $3, $4)
        RETURNING id, source_node_id, target_node_id, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(source_node_id)
    .bind(target_node_id)
    .bind(Utc::now())
    .fetch_one(&mut *tx)
    .await?;

    if let Some(branch) = branch {
        let statement = match branch {
            Branch::Yes => "UPDATE conditions SET yes_edge_id = $1 WHERE node_id = $2",
            Branch::No => "UPDATE conditions SET no_edge_id = $1 WHERE node_id = $2",
        };
        sqlx::query(statement)
            .bind(row.id)
            .bind(source_node_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(row)
}

/// Fetch a single edge by its primary key.
pub async fn get_edge(pool: &PgPool, id: Uuid) -> Result<EdgeRow, DbError> {
    sqlx::query_as::<_, EdgeRow>(
        "SELECT id, source_node_id, target_node_id, created_at FROM edges WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::not_found("edge", id))
}

/// The edge joining `a` and `b` in either direction.
pub async fn find_edge_between(
    pool: &PgPool,
    a: Uuid,
    b: Uuid,
) -> Result<Option<EdgeRow>, DbError> {
    let row = sqlx::query_as::<_, EdgeRow>(
        r#"
        SELECT id, source_node_id, target_node_id, created_at
        FROM edges
        WHERE (source_node_id = $1 AND target_node_id = $2)
           OR (source_node_id = $2 AND target_node_id = $1)
        LIMIT 1
        "#,
    )
    .bind(a)
    .bind(b)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Number of edges leaving `source_node_id`.
pub async fn count_outgoing_edges(pool: &PgPool, source_node_id: Uuid) -> Result<usize, DbError> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM edges WHERE source_node_id = $1")
        .bind(source_node_id)
        .fetch_one(pool)
        .await?;

    Ok(usize::try_from(count).unwrap_or_default())
}

/// Every edge touching a node of the workflow, ordered by `(created_at, id)`.
pub async fn list_edges<'e>(
    executor: impl PgExecutor<'e>,
    workflow_id: Uuid,
) -> Result<Vec<EdgeRow>, DbError> {
    let rows = sqlx::query_as::<_, EdgeRow>(
        r#"
        SELECT e.id, e.source_node_id, e.target_node_id, e.created_at
        FROM edges e
        WHERE e.source_node_id IN (SELECT id FROM nodes WHERE workflow_id = $1)
           OR e.target_node_id IN (SELECT id FROM nodes WHERE workflow_id = $1)
        ORDER BY e.created_at, e.id
        "#,
    )
    .bind(workflow_id)
    .fetch_all(executor)
    .await?;

    Ok(rows)
}

/// Delete an edge; a condition slot bound to it is nulled (`ON DELETE SET NULL`).
pub async fn delete_edge(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM edges WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("edge", id));
    }

    Ok(())
}
