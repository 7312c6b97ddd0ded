use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;

use super::identity::CurrentUser;
use super::response::{created, ok};
use crate::models::CreateBookingRequest;
use crate::services::booking_service;
use crate::state::AppState;
use crate::utils::errors::AppError;
use crate::utils::validation::parse_uuid;

/// POST /api/bookings
pub async fn create(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    body: Result<Json<CreateBookingRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = body?;
    let booking = booking_service::create_booking(&state, user_id, request).await?;
    Ok(created(booking))
}

/// GET /api/bookings/{id}
pub async fn get(
    State(state): State<AppState>,
    CurrentUser(_): CurrentUser,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let booking_id = parse_uuid("bookingId", &id)?;
    Ok(ok(booking_service::get_booking(&state, booking_id).await?))
}
