use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlConnection;
use sqlx::FromRow;
use uuid::Uuid;

use super::{lock_clause, parse_id, parse_opt_id, parse_text};
use crate::models::{TargetingHistoryEntry, TargetingRelation, TargetingStatus};

const RELATION_COLUMNS: &str = "id, source_swap_id, target_swap_id, proposal_id, status, created_at, updated_at";
const HISTORY_COLUMNS: &str =
    "id, source_swap_id, target_swap_id, proposal_id, action, actor_id, metadata, created_at";

#[derive(Debug, FromRow)]
struct RelationRow {
    id: String,
    source_swap_id: String,
    target_swap_id: String,
    proposal_id: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RelationRow> for TargetingRelation {
    type Error = sqlx::Error;

    fn try_from(row: RelationRow) -> Result<Self, Self::Error> {
        Ok(TargetingRelation {
            id: parse_id(&row.id)?,
            source_swap_id: parse_id(&row.source_swap_id)?,
            target_swap_id: parse_id(&row.target_swap_id)?,
            proposal_id: parse_id(&row.proposal_id)?,
            status: parse_text(&row.status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct HistoryRow {
    id: String,
    source_swap_id: String,
    target_swap_id: String,
    proposal_id: Option<String>,
    action: String,
    actor_id: Option<String>,
    metadata: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for TargetingHistoryEntry {
    type Error = sqlx::Error;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        Ok(TargetingHistoryEntry {
            id: parse_id(&row.id)?,
            source_swap_id: parse_id(&row.source_swap_id)?,
            target_swap_id: parse_id(&row.target_swap_id)?,
            proposal_id: parse_opt_id(row.proposal_id.as_deref())?,
            action: parse_text(&row.action)?,
            actor_id: parse_opt_id(row.actor_id.as_deref())?,
            metadata: serde_json::from_str(&row.metadata).map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            created_at: row.created_at,
        })
    }
}

async fn fetch_relation(
    conn: &mut MySqlConnection,
    filter: &str,
    key: Uuid,
    for_update: bool,
) -> Result<Option<TargetingRelation>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM targeting_relations WHERE {} = ? AND status = 'active' LIMIT 1{}",
        RELATION_COLUMNS,
        filter,
        lock_clause(for_update)
    );
    sqlx::query_as::<_, RelationRow>(&sql)
        .bind(key.to_string())
        .fetch_optional(conn)
        .await?
        .map(TargetingRelation::try_from)
        .transpose()
}

/// Insert a new relation
pub async fn insert_relation(conn: &mut MySqlConnection, relation: &TargetingRelation) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO targeting_relations (id, source_swap_id, target_swap_id, proposal_id, status, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(relation.id.to_string())
    .bind(relation.source_swap_id.to_string())
    .bind(relation.target_swap_id.to_string())
    .bind(relation.proposal_id.to_string())
    .bind(relation.status.as_str())
    .bind(relation.created_at)
    .bind(relation.updated_at)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn set_relation_status(
    conn: &mut MySqlConnection,
    relation_id: Uuid,
    status: TargetingStatus,
    at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE targeting_relations SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(at)
        .bind(relation_id.to_string())
        .execute(conn)
        .await?;

    Ok(())
}

/// The active relation of a source swap
pub async fn get_active_relation(
    conn: &mut MySqlConnection,
    source_swap_id: Uuid,
    for_update: bool,
) -> Result<Option<TargetingRelation>, sqlx::Error> {
    fetch_relation(conn, "source_swap_id", source_swap_id, for_update).await
}

/// The relation carrying a proposal, whatever its status
pub async fn get_relation_for_proposal(
    conn: &mut MySqlConnection,
    proposal_id: Uuid,
    for_update: bool,
) -> Result<Option<TargetingRelation>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM targeting_relations WHERE proposal_id = ?{}",
        RELATION_COLUMNS,
        lock_clause(for_update)
    );
    sqlx::query_as::<_, RelationRow>(&sql)
        .bind(proposal_id.to_string())
        .fetch_optional(conn)
        .await?
        .map(TargetingRelation::try_from)
        .transpose()
}

/// Active relations pointing at a swap, oldest first
pub async fn list_incoming(
    conn: &mut MySqlConnection,
    target_swap_id: Uuid,
) -> Result<Vec<TargetingRelation>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM targeting_relations WHERE target_swap_id = ? AND status = 'active'
         ORDER BY created_at, id",
        RELATION_COLUMNS
    );
    sqlx::query_as::<_, RelationRow>(&sql)
        .bind(target_swap_id.to_string())
        .fetch_all(conn)
        .await?
        .into_iter()
        .map(TargetingRelation::try_from)
        .collect()
}

/// Whether `target_swap_id` currently targets `source_swap_id` back
pub async fn find_circular_targeting(
    conn: &mut MySqlConnection,
    source_swap_id: Uuid,
    target_swap_id: Uuid,
    for_update: bool,
) -> Result<bool, sqlx::Error> {
    let sql = format!(
        "SELECT id FROM targeting_relations
         WHERE source_swap_id = ? AND target_swap_id = ? AND status = 'active' LIMIT 1{}",
        lock_clause(for_update)
    );
    let found: Option<String> = sqlx::query_scalar(&sql)
        .bind(target_swap_id.to_string())
        .bind(source_swap_id.to_string())
        .fetch_optional(conn)
        .await?;

    Ok(found.is_some())
}

/// Append an audit entry
pub async fn append_history(conn: &mut MySqlConnection, entry: &TargetingHistoryEntry) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO targeting_history (id, source_swap_id, target_swap_id, proposal_id, action, actor_id, metadata, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(entry.id.to_string())
    .bind(entry.source_swap_id.to_string())
    .bind(entry.target_swap_id.to_string())
    .bind(entry.proposal_id.map(|id| id.to_string()))
    .bind(entry.action.as_str())
    .bind(entry.actor_id.map(|id| id.to_string()))
    .bind(entry.metadata.to_string())
    .bind(entry.created_at)
    .execute(conn)
    .await?;

    Ok(())
}

/// History of a swap as source or target, newest first
pub async fn list_history(
    conn: &mut MySqlConnection,
    swap_id: Uuid,
    limit: u32,
) -> Result<Vec<TargetingHistoryEntry>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM targeting_history WHERE source_swap_id = ? OR target_swap_id = ?
         ORDER BY created_at DESC, id DESC LIMIT ?",
        HISTORY_COLUMNS
    );
    let id = swap_id.to_string();
    sqlx::query_as::<_, HistoryRow>(&sql)
        .bind(&id)
        .bind(&id)
        .bind(limit)
        .fetch_all(conn)
        .await?
        .into_iter()
        .map(TargetingHistoryEntry::try_from)
        .collect()
}
