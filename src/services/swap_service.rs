use chrono::Utc;
use sqlx::mysql::MySqlConnection;
use tracing::info;
use uuid::Uuid;

use crate::db;
use crate::machine::lifecycle::{plan_close, plan_new_swap, NewSwap};
use crate::machine::Actor;
use crate::models::{CreateSwapRequest, SwapStatus, SwapView};
use crate::services::effects::{self, Deferred};
use crate::services::snapshot;
use crate::state::AppState;
use crate::utils::errors::{is_unique_violation, AppError, TargetingError};
use crate::utils::validation::parse_uuid;

/// List a booking for swapping
pub async fn create_swap(state: &AppState, owner_id: Uuid, request: CreateSwapRequest) -> Result<SwapView, AppError> {
    let booking_id = parse_uuid("sourceBookingId", &request.source_booking_id)?;
    let new_swap = NewSwap {
        acceptance_strategy: request.acceptance_strategy,
        payment_types: request.payment_types,
    };

    let mut tx = state.pool.begin().await?;
    let booking = db::booking::get_booking_by_id(&mut tx, booking_id, true)
        .await?
        .ok_or_else(|| AppError::booking_not_found(booking_id))?;
    let existing = db::swap::find_open_swap_for_booking(&mut tx, owner_id, booking_id).await?;
    let (swap, auction) = plan_new_swap(&booking, owner_id, new_swap, existing.as_ref(), Utc::now())?;

    db::swap::create_swap(&mut tx, &swap).await.map_err(|e| {
        if is_unique_violation(&e) {
            AppError::from(TargetingError::SwapAlreadyExists)
        } else {
            AppError::from(e)
        }
    })?;
    if let Some(auction) = &auction {
        db::auction::save_auction(&mut tx, auction).await?;
    }
    tx.commit().await?;

    info!(
        swap_id = %swap.id,
        booking_id = %booking_id,
        strategy = swap.acceptance_strategy.kind(),
        "Swap created"
    );
    Ok(SwapView { swap, auction })
}

pub async fn get_swap(state: &AppState, swap_id: Uuid) -> Result<SwapView, AppError> {
    let mut conn = state.pool.acquire().await?;
    let swap = db::swap::get_swap_by_id(&mut conn, swap_id)
        .await?
        .ok_or_else(|| AppError::swap_not_found(swap_id))?;
    let auction = db::auction::get_auction(&mut conn, swap_id, false).await?;

    Ok(SwapView { swap, auction })
}

/// Take an open swap off the market at its owner's request
pub async fn cancel_swap(state: &AppState, swap_id: Uuid, user_id: Uuid) -> Result<SwapView, AppError> {
    let mut tx = state.pool.begin().await?;
    let deferred = close_in_tx(&mut tx, state, swap_id, SwapStatus::Cancelled, Actor::User(user_id))
        .await
        .map_err(AppError::into_contention)?;
    tx.commit().await.map_err(|e| AppError::from(e).into_contention())?;

    effects::dispatch(&state.sinks, deferred);
    info!(swap_id = %swap_id, "Swap cancelled");
    get_swap(state, swap_id).await
}

/// Cancel or expire a swap on an open transaction
pub async fn close_in_tx(
    conn: &mut MySqlConnection,
    state: &AppState,
    swap_id: Uuid,
    status: SwapStatus,
    actor: Actor,
) -> Result<Deferred, AppError> {
    let snapshot = snapshot::closure(conn, swap_id).await?;
    let effects = plan_close(snapshot, status, actor, Utc::now())?;
    Ok(effects::apply(conn, &state.sinks, effects).await?.deferred)
}
