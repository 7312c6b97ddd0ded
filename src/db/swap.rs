use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlConnection;
use sqlx::FromRow;
use uuid::Uuid;

use super::{decode_error, lock_clause, parse_id, parse_text, placeholders};
use crate::models::{AcceptanceStrategy, PaymentTypes, Swap, SwapStatus};

const SWAP_COLUMNS: &str = "id, source_booking_id, owner_id, status, strategy, auction_end_date, \
     auto_select_after_hours, booking_exchange, cash_payment, \
     CAST(minimum_cash_amount AS DOUBLE) AS minimum_cash_amount, \
     CAST(preferred_cash_amount AS DOUBLE) AS preferred_cash_amount, created_at, updated_at";

/// Statuses that still take part in targeting
const OPEN_STATUSES: &str = "('active', 'targeting', 'proposal_pending')";

#[derive(Debug, FromRow)]
struct SwapRow {
    id: String,
    source_booking_id: String,
    owner_id: String,
    status: String,
    strategy: String,
    auction_end_date: Option<DateTime<Utc>>,
    auto_select_after_hours: Option<u32>,
    booking_exchange: bool,
    cash_payment: bool,
    minimum_cash_amount: Option<f64>,
    preferred_cash_amount: Option<f64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SwapRow> for Swap {
    type Error = sqlx::Error;

    fn try_from(row: SwapRow) -> Result<Self, Self::Error> {
        let acceptance_strategy = match (row.strategy.as_str(), row.auction_end_date, row.auto_select_after_hours) {
            ("first_match", _, _) => AcceptanceStrategy::FirstMatch,
            ("auction", Some(auction_end_date), Some(auto_select_after_hours)) => AcceptanceStrategy::Auction {
                auction_end_date,
                auto_select_after_hours,
            },
            (other, _, _) => return Err(decode_error(format!("invalid strategy '{}' on swap {}", other, row.id))),
        };

        Ok(Swap {
            id: parse_id(&row.id)?,
            source_booking_id: parse_id(&row.source_booking_id)?,
            owner_id: parse_id(&row.owner_id)?,
            status: parse_text(&row.status)?,
            acceptance_strategy,
            payment_types: PaymentTypes {
                booking_exchange: row.booking_exchange,
                cash_payment: row.cash_payment,
                minimum_cash_amount: row.minimum_cash_amount,
                preferred_cash_amount: row.preferred_cash_amount,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn decode_all(rows: Vec<SwapRow>) -> Result<Vec<Swap>, sqlx::Error> {
    rows.into_iter().map(Swap::try_from).collect()
}

/// Insert a new swap
pub async fn create_swap(conn: &mut MySqlConnection, swap: &Swap) -> Result<(), sqlx::Error> {
    let (strategy, end_date, hours) = match &swap.acceptance_strategy {
        AcceptanceStrategy::FirstMatch => ("first_match", None, None),
        AcceptanceStrategy::Auction {
            auction_end_date,
            auto_select_after_hours,
        } => ("auction", Some(*auction_end_date), Some(*auto_select_after_hours)),
    };

    sqlx::query(
        "INSERT INTO swaps (id, source_booking_id, owner_id, status, strategy, auction_end_date,
                            auto_select_after_hours, booking_exchange, cash_payment,
                            minimum_cash_amount, preferred_cash_amount, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(swap.id.to_string())
    .bind(swap.source_booking_id.to_string())
    .bind(swap.owner_id.to_string())
    .bind(swap.status.as_str())
    .bind(strategy)
    .bind(end_date)
    .bind(hours)
    .bind(swap.payment_types.booking_exchange)
    .bind(swap.payment_types.cash_payment)
    .bind(swap.payment_types.minimum_cash_amount)
    .bind(swap.payment_types.preferred_cash_amount)
    .bind(swap.created_at)
    .bind(swap.updated_at)
    .execute(conn)
    .await?;

    Ok(())
}

/// Get a swap by ID (no lock)
pub async fn get_swap_by_id(conn: &mut MySqlConnection, swap_id: Uuid) -> Result<Option<Swap>, sqlx::Error> {
    let sql = format!("SELECT {} FROM swaps WHERE id = ?", SWAP_COLUMNS);
    sqlx::query_as::<_, SwapRow>(&sql)
        .bind(swap_id.to_string())
        .fetch_optional(conn)
        .await?
        .map(Swap::try_from)
        .transpose()
}

/// Load several swaps in id order. With `for_update` the rows are locked in
/// that same order, which keeps every transaction's lock order consistent.
pub async fn get_swaps(
    conn: &mut MySqlConnection,
    swap_ids: &[Uuid],
    for_update: bool,
) -> Result<Vec<Swap>, sqlx::Error> {
    let mut ids: Vec<String> = swap_ids.iter().map(Uuid::to_string).collect();
    ids.sort();
    ids.dedup();
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT {} FROM swaps WHERE id IN ({}) ORDER BY id{}",
        SWAP_COLUMNS,
        placeholders(ids.len()),
        lock_clause(for_update)
    );
    let mut query = sqlx::query_as::<_, SwapRow>(&sql);
    for id in &ids {
        query = query.bind(id.as_str());
    }
    decode_all(query.fetch_all(conn).await?)
}

/// The owner's open swap over a booking, if any
pub async fn find_open_swap_for_booking(
    conn: &mut MySqlConnection,
    owner_id: Uuid,
    booking_id: Uuid,
) -> Result<Option<Swap>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM swaps WHERE owner_id = ? AND open_booking_id = ? LIMIT 1",
        SWAP_COLUMNS
    );
    sqlx::query_as::<_, SwapRow>(&sql)
        .bind(owner_id.to_string())
        .bind(booking_id.to_string())
        .fetch_optional(conn)
        .await?
        .map(Swap::try_from)
        .transpose()
}

/// Open swaps whose booking check-in is at or before `now`
pub async fn list_expirable(
    conn: &mut MySqlConnection,
    now: DateTime<Utc>,
    limit: u32,
) -> Result<Vec<Uuid>, sqlx::Error> {
    let sql = format!(
        "SELECT s.id FROM swaps s JOIN bookings b ON b.id = s.source_booking_id
         WHERE s.status IN {} AND b.check_in <= ? ORDER BY s.id LIMIT ?",
        OPEN_STATUSES
    );
    sqlx::query_scalar::<_, String>(&sql)
        .bind(now)
        .bind(limit)
        .fetch_all(conn)
        .await?
        .iter()
        .map(|id| parse_id(id))
        .collect()
}

pub async fn set_status(
    conn: &mut MySqlConnection,
    swap_id: Uuid,
    status: SwapStatus,
    at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE swaps SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(at)
        .bind(swap_id.to_string())
        .execute(conn)
        .await?;

    Ok(())
}

/// Switch an auction swap to first-match
pub async fn convert_to_first_match(
    conn: &mut MySqlConnection,
    swap_id: Uuid,
    at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE swaps SET strategy = 'first_match', auction_end_date = NULL,
                          auto_select_after_hours = NULL, updated_at = ?
         WHERE id = ?",
    )
    .bind(at)
    .bind(swap_id.to_string())
    .execute(conn)
    .await?;

    Ok(())
}
