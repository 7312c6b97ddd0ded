use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlConnection;
use sqlx::FromRow;
use uuid::Uuid;

use super::{lock_clause, parse_id, parse_text};
use crate::models::{Booking, BookingStatus};

const BOOKING_COLUMNS: &str =
    "id, owner_id, booking_type, title, check_in, check_out, status, created_at";

#[derive(Debug, FromRow)]
struct BookingRow {
    id: String,
    owner_id: String,
    booking_type: String,
    title: String,
    check_in: DateTime<Utc>,
    check_out: DateTime<Utc>,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = sqlx::Error;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: parse_id(&row.id)?,
            owner_id: parse_id(&row.owner_id)?,
            booking_type: parse_text(&row.booking_type)?,
            title: row.title,
            check_in: row.check_in,
            check_out: row.check_out,
            status: parse_text(&row.status)?,
            created_at: row.created_at,
        })
    }
}

/// Insert a new booking
pub async fn create_booking(conn: &mut MySqlConnection, booking: &Booking) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO bookings (id, owner_id, booking_type, title, check_in, check_out, status, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(booking.id.to_string())
    .bind(booking.owner_id.to_string())
    .bind(booking.booking_type.as_str())
    .bind(&booking.title)
    .bind(booking.check_in)
    .bind(booking.check_out)
    .bind(booking.status.as_str())
    .bind(booking.created_at)
    .execute(conn)
    .await?;

    Ok(())
}

/// Get a booking by ID, optionally locking the row
pub async fn get_booking_by_id(
    conn: &mut MySqlConnection,
    booking_id: Uuid,
    for_update: bool,
) -> Result<Option<Booking>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM bookings WHERE id = ?{}",
        BOOKING_COLUMNS,
        lock_clause(for_update)
    );
    sqlx::query_as::<_, BookingRow>(&sql)
        .bind(booking_id.to_string())
        .fetch_optional(conn)
        .await?
        .map(Booking::try_from)
        .transpose()
}

/// Check-in dates of the given bookings
pub async fn get_check_ins(
    conn: &mut MySqlConnection,
    booking_ids: &[Uuid],
) -> Result<Vec<(Uuid, DateTime<Utc>)>, sqlx::Error> {
    if booking_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT id, check_in FROM bookings WHERE id IN ({})",
        super::placeholders(booking_ids.len())
    );
    let mut query = sqlx::query_as::<_, (String, DateTime<Utc>)>(&sql);
    for id in booking_ids {
        query = query.bind(id.to_string());
    }
    query
        .fetch_all(conn)
        .await?
        .into_iter()
        .map(|(id, check_in)| Ok((parse_id(&id)?, check_in)))
        .collect()
}

/// Update a booking's availability
pub async fn update_status(
    conn: &mut MySqlConnection,
    booking_id: Uuid,
    status: BookingStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE bookings SET status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(booking_id.to_string())
        .execute(conn)
        .await?;

    Ok(())
}
