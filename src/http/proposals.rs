use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::Response;

use super::with_cooldown;
use super::identity::CurrentUser;
use super::response::ok;
use crate::models::RejectProposalRequest;
use crate::services::proposal_service;
use crate::state::AppState;
use crate::utils::errors::AppError;
use crate::utils::validation::parse_uuid;

/// POST /api/proposals/{id}/accept
pub async fn accept(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let proposal_id = parse_uuid("proposalId", &id)?;
    let result = with_cooldown(
        &state,
        user_id,
        "accept",
        proposal_service::accept_proposal(&state, proposal_id, user_id),
    )
    .await?;
    Ok(ok(result))
}

/// POST /api/proposals/{id}/reject. The body is optional.
pub async fn reject(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Response, AppError> {
    let proposal_id = parse_uuid("proposalId", &id)?;
    let request: RejectProposalRequest = if body.iter().all(u8::is_ascii_whitespace) {
        RejectProposalRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::validation("INVALID_BODY", e.to_string()))?
    };
    let proposal = with_cooldown(
        &state,
        user_id,
        "reject",
        proposal_service::reject_proposal(&state, proposal_id, user_id, request.reason),
    )
    .await?;
    Ok(ok(proposal))
}

/// GET /api/swaps/{id}/proposals
pub async fn list(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let swap_id = parse_uuid("swapId", &id)?;
    Ok(ok(proposal_service::list_proposals(&state, swap_id, user_id).await?))
}
