use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use serde_json::json;
use uuid::Uuid;

use super::with_cooldown;
use super::identity::CurrentUser;
use super::response::{created, ok};
use crate::models::{CanTargetQuery, CashOffer, CreateSwapRequest, RemoveTargetRequest, TargetOptions, TargetRequest};
use crate::services::{swap_service, targeting_service};
use crate::state::AppState;
use crate::utils::errors::AppError;
use crate::utils::validation::parse_uuid;

fn swap_id(raw: &str) -> Result<Uuid, AppError> {
    parse_uuid("swapId", raw)
}

/// Split a target body into the source id and the proposal options
fn target_parts(request: TargetRequest) -> Result<(Uuid, TargetOptions), AppError> {
    let source_swap_id = parse_uuid("sourceSwapId", &request.source_swap_id)?;
    Ok((
        source_swap_id,
        TargetOptions {
            message: request.message,
            conditions: request.conditions,
            cash_offer: request.cash_offer,
        },
    ))
}

/// Split a can-target query into the source id and the options a target
/// call with the same offer would carry
fn can_target_parts(query: CanTargetQuery) -> Result<(Option<Uuid>, TargetOptions), AppError> {
    let source_swap_id = query
        .source_swap_id
        .as_deref()
        .map(|raw| parse_uuid("sourceSwapId", raw))
        .transpose()?;

    let cash_offer = match query.cash_amount {
        Some(amount) => Some(CashOffer {
            amount,
            currency: query.currency.unwrap_or_default(),
            payment_method_id: query.payment_method_id.unwrap_or_default(),
        }),
        None if query.currency.is_some() || query.payment_method_id.is_some() => {
            return Err(AppError::validation(
                "INVALID_QUERY",
                "cashAmount is required when describing a cash offer",
            ));
        }
        None => None,
    };

    Ok((
        source_swap_id,
        TargetOptions {
            cash_offer,
            ..TargetOptions::default()
        },
    ))
}

/// POST /api/swaps
pub async fn create(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    body: Result<Json<CreateSwapRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = body?;
    let swap = with_cooldown(&state, user_id, "create_swap", swap_service::create_swap(&state, user_id, request)).await?;
    Ok(created(swap))
}

/// GET /api/swaps/{id}
pub async fn get(
    State(state): State<AppState>,
    CurrentUser(_): CurrentUser,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    Ok(ok(swap_service::get_swap(&state, swap_id(&id)?).await?))
}

/// DELETE /api/swaps/{id}
pub async fn cancel(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let swap_id = swap_id(&id)?;
    let swap = with_cooldown(&state, user_id, "cancel_swap", swap_service::cancel_swap(&state, swap_id, user_id)).await?;
    Ok(ok(swap))
}

/// POST /api/swaps/{id}/target
pub async fn target(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
    body: Result<Json<TargetRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let target_swap_id = swap_id(&id)?;
    let Json(request) = body?;
    let (source_swap_id, options) = target_parts(request)?;
    let result = with_cooldown(
        &state,
        user_id,
        "target",
        targeting_service::target_swap(&state, source_swap_id, target_swap_id, user_id, options),
    )
    .await?;
    Ok(created(result))
}

/// PUT /api/swaps/{id}/retarget
pub async fn retarget(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
    body: Result<Json<TargetRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let target_swap_id = swap_id(&id)?;
    let Json(request) = body?;
    let (source_swap_id, options) = target_parts(request)?;
    let result = with_cooldown(
        &state,
        user_id,
        "target",
        targeting_service::retarget_swap(&state, source_swap_id, target_swap_id, user_id, options),
    )
    .await?;
    Ok(ok(result))
}

/// DELETE /api/swaps/{id}/target
pub async fn remove_target(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
    body: Result<Json<RemoveTargetRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let target_swap_id = swap_id(&id)?;
    let Json(request) = body?;
    let source_swap_id = parse_uuid("sourceSwapId", &request.source_swap_id)?;
    with_cooldown(
        &state,
        user_id,
        "remove_target",
        targeting_service::remove_target(&state, source_swap_id, user_id, Some(target_swap_id)),
    )
    .await?;
    Ok(ok(json!({ "sourceSwapId": source_swap_id, "targetSwapId": target_swap_id })))
}

/// GET /api/swaps/{id}/targeting-status
pub async fn targeting_status(
    State(state): State<AppState>,
    CurrentUser(_): CurrentUser,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    Ok(ok(targeting_service::get_targeting_status(&state, swap_id(&id)?).await?))
}

/// GET /api/swaps/{id}/can-target?sourceSwapId=&cashAmount=&currency=&paymentMethodId=
pub async fn can_target(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
    query: Result<Query<CanTargetQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let target_swap_id = swap_id(&id)?;
    let Query(query) = query?;
    let (source_swap_id, options) = can_target_parts(query)?;

    let result = targeting_service::can_target_swap(&state, target_swap_id, user_id, source_swap_id, &options).await?;
    Ok(ok(result))
}

/// GET /api/swaps/{id}/targeting-history
pub async fn targeting_history(
    State(state): State<AppState>,
    CurrentUser(_): CurrentUser,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    Ok(ok(targeting_service::get_targeting_history(&state, swap_id(&id)?).await?))
}
