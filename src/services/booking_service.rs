use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::db;
use crate::models::{Booking, BookingStatus, CreateBookingRequest};
use crate::state::AppState;
use crate::utils::errors::AppError;

const MAX_TITLE_LEN: usize = 200;

/// Check a booking request before it is stored
pub fn validate_booking(request: &CreateBookingRequest) -> Result<(), AppError> {
    let title = request.title.trim();
    if title.is_empty() {
        return Err(AppError::validation("INVALID_BOOKING", "Title is required"));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(AppError::validation(
            "INVALID_BOOKING",
            format!("Title must be at most {} characters", MAX_TITLE_LEN),
        ));
    }
    if request.check_out <= request.check_in {
        return Err(AppError::validation(
            "INVALID_BOOKING",
            "Check-out must be after check-in",
        ));
    }
    Ok(())
}

pub async fn create_booking(state: &AppState, owner_id: Uuid, request: CreateBookingRequest) -> Result<Booking, AppError> {
    validate_booking(&request)?;

    let booking = Booking {
        id: Uuid::new_v4(),
        owner_id,
        booking_type: request.booking_type,
        title: request.title.trim().to_string(),
        check_in: request.check_in,
        check_out: request.check_out,
        status: BookingStatus::Available,
        created_at: Utc::now(),
    };
    let mut conn = state.pool.acquire().await?;
    db::booking::create_booking(&mut conn, &booking).await?;

    info!(booking_id = %booking.id, owner_id = %owner_id, "Booking created");
    Ok(booking)
}

pub async fn get_booking(state: &AppState, booking_id: Uuid) -> Result<Booking, AppError> {
    let mut conn = state.pool.acquire().await?;
    db::booking::get_booking_by_id(&mut conn, booking_id, false)
        .await?
        .ok_or_else(|| AppError::booking_not_found(booking_id))
}
