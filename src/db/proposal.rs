use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlConnection;
use sqlx::FromRow;
use uuid::Uuid;

use super::{decode_error, lock_clause, parse_id, parse_text};
use crate::models::{CashOffer, Proposal, ProposalPayload, ProposalStatus};

const PROPOSAL_COLUMNS: &str = "id, target_swap_id, source_swap_id, proposer_id, proposal_type, booking_id, \
     CAST(cash_amount AS DOUBLE) AS cash_amount, cash_currency, payment_method_id, status, message, \
     conditions, rejection_reason, submitted_at, responded_at";

#[derive(Debug, FromRow)]
struct ProposalRow {
    id: String,
    target_swap_id: String,
    source_swap_id: String,
    proposer_id: String,
    proposal_type: String,
    booking_id: Option<String>,
    cash_amount: Option<f64>,
    cash_currency: Option<String>,
    payment_method_id: Option<String>,
    status: String,
    message: Option<String>,
    conditions: String,
    rejection_reason: Option<String>,
    submitted_at: DateTime<Utc>,
    responded_at: Option<DateTime<Utc>>,
}

impl TryFrom<ProposalRow> for Proposal {
    type Error = sqlx::Error;

    fn try_from(row: ProposalRow) -> Result<Self, Self::Error> {
        let payload = match (row.proposal_type.as_str(), row.booking_id, row.cash_amount) {
            ("booking", Some(booking_id), _) => ProposalPayload::Booking {
                booking_id: parse_id(&booking_id)?,
            },
            ("cash", _, Some(amount)) => ProposalPayload::Cash {
                cash_offer: CashOffer {
                    amount,
                    currency: row.cash_currency.unwrap_or_default(),
                    payment_method_id: row.payment_method_id.unwrap_or_default(),
                },
            },
            (other, _, _) => {
                return Err(decode_error(format!("malformed {} payload on proposal {}", other, row.id)))
            }
        };
        let conditions: Vec<String> =
            serde_json::from_str(&row.conditions).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        Ok(Proposal {
            id: parse_id(&row.id)?,
            target_swap_id: parse_id(&row.target_swap_id)?,
            source_swap_id: parse_id(&row.source_swap_id)?,
            proposer_id: parse_id(&row.proposer_id)?,
            payload,
            status: parse_text(&row.status)?,
            message: row.message,
            conditions,
            rejection_reason: row.rejection_reason,
            submitted_at: row.submitted_at,
            responded_at: row.responded_at,
        })
    }
}

fn decode_all(rows: Vec<ProposalRow>) -> Result<Vec<Proposal>, sqlx::Error> {
    rows.into_iter().map(Proposal::try_from).collect()
}

/// Insert a proposal. `exclusive` feeds the one-pending-per-first-match-target key.
pub async fn insert_proposal(
    conn: &mut MySqlConnection,
    proposal: &Proposal,
    exclusive: bool,
) -> Result<(), sqlx::Error> {
    let (booking_id, cash) = match &proposal.payload {
        ProposalPayload::Booking { booking_id } => (Some(booking_id.to_string()), None),
        ProposalPayload::Cash { cash_offer } => (None, Some(cash_offer)),
    };
    let conditions = serde_json::to_string(&proposal.conditions).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

    sqlx::query(
        "INSERT INTO proposals (id, target_swap_id, source_swap_id, proposer_id, proposal_type, booking_id,
                                cash_amount, cash_currency, payment_method_id, status, message, conditions,
                                rejection_reason, exclusive_target, submitted_at, responded_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(proposal.id.to_string())
    .bind(proposal.target_swap_id.to_string())
    .bind(proposal.source_swap_id.to_string())
    .bind(proposal.proposer_id.to_string())
    .bind(proposal.payload.kind())
    .bind(booking_id)
    .bind(cash.map(|c| c.amount))
    .bind(cash.map(|c| c.currency.as_str()))
    .bind(cash.map(|c| c.payment_method_id.as_str()))
    .bind(proposal.status.as_str())
    .bind(proposal.message.as_deref())
    .bind(conditions)
    .bind(proposal.rejection_reason.as_deref())
    .bind(exclusive)
    .bind(proposal.submitted_at)
    .bind(proposal.responded_at)
    .execute(conn)
    .await?;

    Ok(())
}

/// Get a proposal by ID, optionally locking the row
pub async fn get_proposal(
    conn: &mut MySqlConnection,
    proposal_id: Uuid,
    for_update: bool,
) -> Result<Option<Proposal>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM proposals WHERE id = ?{}",
        PROPOSAL_COLUMNS,
        lock_clause(for_update)
    );
    sqlx::query_as::<_, ProposalRow>(&sql)
        .bind(proposal_id.to_string())
        .fetch_optional(conn)
        .await?
        .map(Proposal::try_from)
        .transpose()
}

/// Pending proposals against a swap, oldest first
pub async fn list_pending_for_target(
    conn: &mut MySqlConnection,
    swap_id: Uuid,
    for_update: bool,
) -> Result<Vec<Proposal>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM proposals WHERE target_swap_id = ? AND status = 'pending'
         ORDER BY submitted_at, id{}",
        PROPOSAL_COLUMNS,
        lock_clause(for_update)
    );
    decode_all(
        sqlx::query_as::<_, ProposalRow>(&sql)
            .bind(swap_id.to_string())
            .fetch_all(conn)
            .await?,
    )
}

/// Every proposal against a swap, newest first
pub async fn list_for_target(conn: &mut MySqlConnection, swap_id: Uuid) -> Result<Vec<Proposal>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM proposals WHERE target_swap_id = ? ORDER BY submitted_at DESC, id DESC",
        PROPOSAL_COLUMNS
    );
    decode_all(
        sqlx::query_as::<_, ProposalRow>(&sql)
            .bind(swap_id.to_string())
            .fetch_all(conn)
            .await?,
    )
}

/// Pending proposals against a swap other than `excluding`
pub async fn count_pending_excluding(
    conn: &mut MySqlConnection,
    swap_id: Uuid,
    excluding: Uuid,
    for_update: bool,
) -> Result<usize, sqlx::Error> {
    let sql = format!(
        "SELECT COUNT(*) FROM proposals WHERE target_swap_id = ? AND status = 'pending' AND id <> ?{}",
        lock_clause(for_update)
    );
    let count: i64 = sqlx::query_scalar(&sql)
        .bind(swap_id.to_string())
        .bind(excluding.to_string())
        .fetch_one(conn)
        .await?;

    Ok(usize::try_from(count).unwrap_or_default())
}

/// Move a proposal out of `pending`. Keeps any earlier reason when `reason` is `None`.
pub async fn set_status(
    conn: &mut MySqlConnection,
    proposal_id: Uuid,
    status: ProposalStatus,
    reason: Option<&str>,
    at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE proposals SET status = ?, rejection_reason = COALESCE(?, rejection_reason), responded_at = ?
         WHERE id = ?",
    )
    .bind(status.as_str())
    .bind(reason)
    .bind(at)
    .bind(proposal_id.to_string())
    .execute(conn)
    .await?;

    Ok(())
}
