//! Node CRUD operations.
//!
//! A node is spread over `nodes` plus at most one of `messages` /
//! `conditions`; reads join them back into a single [`NodeRow`].

use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::models::{Condition, Message, MessageStatus, NodePayload, NodeRow, NodeType};
use crate::DbError;

const SELECT_NODE: &str = r#"
    SELECT n.id, n.workflow_id, n.node_type, n.created_at,
           m.status, m.text,
           c.expression, c.yes_edge_id, c.no_edge_id
    FROM nodes n
    LEFT JOIN messages m ON m.node_id = n.id
    LEFT JOIN conditions c ON c.node_id = n.id
"#;

/// Flat join result, before the payload is reassembled.
#[derive(Debug, sqlx::FromRow)]
struct NodeRecord {
    id: Uuid,
    workflow_id: Uuid,
    node_type: String,
    created_at: DateTime<Utc>,
    status: Option<String>,
    text: Option<String>,
    expression: Option<String>,
    yes_edge_id: Option<Uuid>,
    no_edge_id: Option<Uuid>,
}

impl TryFrom<NodeRecord> for NodeRow {
    type Error = DbError;

    fn try_from(record: NodeRecord) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| DbError::Corrupt {
            entity: "node",
            id: record.id,
            reason,
        };

        let node_type: NodeType = record.node_type.parse().map_err(corrupt)?;
        let payload = match node_type {
            NodeType::Start => NodePayload::Start,
            NodeType::End => NodePayload::End,
            NodeType::Message => {
                let status: MessageStatus = record
                    .status
                    .as_deref()
                    .ok_or_else(|| corrupt("message row missing".into()))?
                    .parse()
                    .map_err(corrupt)?;
                NodePayload::Message(Message {
                    status,
                    text: record.text.clone().unwrap_or_default(),
                })
            }
            NodeType::Condition => NodePayload::Condition(Condition {
                expression: record
                    .expression
                    .clone()
                    .ok_or_else(|| corrupt("condition row missing".into()))?,
                yes_edge: record.yes_edge_id,
                no_edge: record.no_edge_id,
            }),
        };

        Ok(NodeRow {
            id: record.id,
            workflow_id: record.workflow_id,
            payload,
            created_at: record.created_at,
        })
    }
}

/// Insert a node and its payload row in one transaction.
pub async fn create_node(
    pool: &PgPool,
    workflow_id: Uuid,
    payload: NodePayload,
) -> Result<NodeRow, DbError> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO nodes (id, workflow_id, node_type, created_at) VALUES ($1, $2, $3, $4)",
    )
    .bind(id)
    .bind(workflow_id)
    .bind(payload.node_type().as_str())
    .bind(now)
    .execute(&mut *tx)
    .await?;

    match &payload {
        NodePayload::Message(message) => {
            sqlx::query("INSERT INTO messages (node_id, status, text) VALUES ($1, $2, $3)")
                .bind(id)
                .bind(message.status.as_str())
                .bind(&message.text)
                .execute(&mut *tx)
                .await?;
        }
        NodePayload::Condition(condition) => {
            sqlx::query(
                "INSERT INTO conditions (node_id, expression, yes_edge_id, no_edge_id) \
                 VALUES ($1, $2, NULL, NULL)",
            )
            .bind(id)
            .bind(&condition.expression)
            .execute(&mut *tx)
            .await?;
        }
        NodePayload::Start | NodePayload::End => {}
    }

    tx.commit().await?;

    Ok(NodeRow {
        id,
        workflow_id,
        payload,
        created_at: now,
    })
}

/// Fetch a single node by its primary key.
pub async fn get_node<'e>(executor: impl PgExecutor<'e>, id: Uuid) -> Result<NodeRow, DbError> {
    let query = format!("{SELECT_NODE} WHERE n.id = $1");
    sqlx::query_as::<_, NodeRecord>(&query)
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or(DbError::not_found("node", id))?
        .try_into()
}

/// Nodes of a workflow ordered by `(created_at, id)`.
pub async fn list_nodes<'e>(
    executor: impl PgExecutor<'e>,
    workflow_id: Uuid,
) -> Result<Vec<NodeRow>, DbError> {
    let query = format!("{SELECT_NODE} WHERE n.workflow_id = $1 ORDER BY n.created_at, n.id");
    sqlx::query_as::<_, NodeRecord>(&query)
        .bind(workflow_id)
        .fetch_all(executor)
        .await?
        .into_iter()
        .map(NodeRow::try_from)
        .collect()
}

/// The earliest node of `node_type` in a workflow.
pub async fn find_node_of_type(
    pool: &PgPool,
    workflow_id: Uuid,
    node_type: NodeType,
) -> Result<Option<NodeRow>, DbError> {
    let query = format!(
        "{SELECT_NODE} WHERE n.workflow_id = $1 AND n.node_type = $2 \
         ORDER BY n.created_at, n.id LIMIT 1"
    );
    sqlx::query_as::<_, NodeRecord>(&query)
        .bind(workflow_id)
        .bind(node_type.as_str())
        .fetch_optional(pool)
        .await?
        .map(NodeRow::try_from)
        .transpose()
}

/// Overwrite the payload of a message node.
pub async fn update_message(
    pool: &PgPool,
    id: Uuid,
    status: MessageStatus,
    text: &str,
) -> Result<NodeRow, DbError> {
    let result = sqlx::query("UPDATE messages SET status = $1, text = $2 WHERE node_id = $3")
        .bind(status.as_str())
        .bind(text)
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("message", id));
    }

    get_node(pool, id).await
}

/// Overwrite the expression of a condition node, leaving its edge bindings.
pub async fn update_condition(
    pool: &PgPool,
    id: Uuid,
    expression: &str,
) -> Result<NodeRow, DbError> {
    let result = sqlx::query("UPDATE conditions SET expression = $1 WHERE node_id = $2")
        .bind(expression)
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("condition", id));
    }

    get_node(pool, id).await
}

/// Delete a node; its payload and every touching edge cascade, and condition
/// slots bound to those edges are nulled (`ON DELETE SET NULL`).
pub async fn delete_node(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM nodes WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("node", id));
    }

    Ok(())
}
