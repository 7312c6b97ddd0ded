use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlConnection;
use sqlx::FromRow;
use uuid::Uuid;

use super::{lock_clause, parse_id, parse_opt_id, parse_text};
use crate::models::Auction;

const AUCTION_COLUMNS: &str =
    "swap_id, end_date, auto_select_after_hours, status, winning_proposal_id, auto_selected, ended_at";

#[derive(Debug, FromRow)]
struct AuctionRow {
    swap_id: String,
    end_date: DateTime<Utc>,
    auto_select_after_hours: u32,
    status: String,
    winning_proposal_id: Option<String>,
    auto_selected: bool,
    ended_at: Option<DateTime<Utc>>,
}

impl TryFrom<AuctionRow> for Auction {
    type Error = sqlx::Error;

    fn try_from(row: AuctionRow) -> Result<Self, Self::Error> {
        Ok(Auction {
            swap_id: parse_id(&row.swap_id)?,
            end_date: row.end_date,
            auto_select_after_hours: row.auto_select_after_hours,
            status: parse_text(&row.status)?,
            winning_proposal_id: parse_opt_id(row.winning_proposal_id.as_deref())?,
            auto_selected: row.auto_selected,
            ended_at: row.ended_at,
        })
    }
}

/// Get the auction of a swap
pub async fn get_auction(
    conn: &mut MySqlConnection,
    swap_id: Uuid,
    for_update: bool,
) -> Result<Option<Auction>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM auctions WHERE swap_id = ?{}",
        AUCTION_COLUMNS,
        lock_clause(for_update)
    );
    sqlx::query_as::<_, AuctionRow>(&sql)
        .bind(swap_id.to_string())
        .fetch_optional(conn)
        .await?
        .map(Auction::try_from)
        .transpose()
}

/// Insert or overwrite an auction row
pub async fn save_auction(conn: &mut MySqlConnection, auction: &Auction) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO auctions (swap_id, end_date, auto_select_after_hours, status,
                               winning_proposal_id, auto_selected, ended_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         ON DUPLICATE KEY UPDATE status = VALUES(status),
                                 winning_proposal_id = VALUES(winning_proposal_id),
                                 auto_selected = VALUES(auto_selected),
                                 ended_at = VALUES(ended_at)",
    )
    .bind(auction.swap_id.to_string())
    .bind(auction.end_date)
    .bind(auction.auto_select_after_hours)
    .bind(auction.status.as_str())
    .bind(auction.winning_proposal_id.map(|id| id.to_string()))
    .bind(auction.auto_selected)
    .bind(auction.ended_at)
    .execute(conn)
    .await?;

    Ok(())
}

/// Active auctions of open swaps whose end date has passed
pub async fn list_due_to_end(
    conn: &mut MySqlConnection,
    now: DateTime<Utc>,
    limit: u32,
) -> Result<Vec<Uuid>, sqlx::Error> {
    let ids = sqlx::query_scalar::<_, String>(
        "SELECT a.swap_id FROM auctions a JOIN swaps s ON s.id = a.swap_id
         WHERE a.status = 'active' AND a.end_date <= ?
           AND s.status IN ('active', 'targeting', 'proposal_pending')
         ORDER BY a.swap_id LIMIT ?",
    )
    .bind(now)
    .bind(limit)
    .fetch_all(conn)
    .await?;

    ids.iter().map(|id| parse_id(id)).collect()
}

/// Ended auctions of open swaps whose owner let the selection window lapse.
/// Auctions never tried come first, then the ones tried longest ago.
pub async fn list_due_for_selection(
    conn: &mut MySqlConnection,
    now: DateTime<Utc>,
    limit: u32,
) -> Result<Vec<Uuid>, sqlx::Error> {
    let ids = sqlx::query_scalar::<_, String>(
        "SELECT a.swap_id FROM auctions a JOIN swaps s ON s.id = a.swap_id
         WHERE a.status = 'ended'
           AND DATE_ADD(a.ended_at, INTERVAL a.auto_select_after_hours HOUR) <= ?
           AND s.status IN ('active', 'targeting', 'proposal_pending')
         ORDER BY a.selection_attempted_at IS NOT NULL, a.selection_attempted_at, a.swap_id LIMIT ?",
    )
    .bind(now)
    .bind(limit)
    .fetch_all(conn)
    .await?;

    ids.iter().map(|id| parse_id(id)).collect()
}

/// Note a sweep pass that could not auto-select any proposal
pub async fn mark_selection_attempt(
    conn: &mut MySqlConnection,
    swap_id: Uuid,
    at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE auctions SET selection_attempted_at = ? WHERE swap_id = ?")
        .bind(at)
        .bind(swap_id.to_string())
        .execute(conn)
        .await?;

    Ok(())
}
