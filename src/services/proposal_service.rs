use chrono::Utc;
use sqlx::mysql::MySqlConnection;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db;
use crate::machine::acceptance::{plan_accept, plan_reject};
use crate::machine::Actor;
use crate::models::{AcceptanceResult, Proposal};
use crate::services::effects::{self, Deferred};
use crate::services::snapshot;
use crate::state::AppState;
use crate::utils::errors::AppError;

const MAX_REASON_LEN: usize = 500;

/// Accept a pending proposal as the owner of the swap it targets.
pub async fn accept_proposal(state: &AppState, proposal_id: Uuid, user_id: Uuid) -> Result<AcceptanceResult, AppError> {
    let mut tx = state.pool.begin().await?;
    let (result, deferred) = match accept_in_tx(&mut tx, state, proposal_id, Actor::User(user_id)).await {
        Ok(done) => done,
        Err(e) => {
            let e = e.into_contention();
            warn!(proposal_id = %proposal_id, code = e.code(), "Accept refused");
            return Err(e);
        }
    };
    if let Err(e) = tx.commit().await {
        if let Some(escrow_id) = &result.escrow_id {
            warn!(proposal_id = %proposal_id, escrow_id = %escrow_id, "Commit failed after escrow creation");
        }
        return Err(AppError::from(e).into_contention());
    }

    effects::dispatch(&state.sinks, deferred);
    info!(
        proposal_id = %proposal_id,
        target_swap_id = %result.proposal.target_swap_id,
        rejected = result.rejected_proposal_ids.len(),
        escrow_id = ?result.escrow_id,
        "Proposal accepted"
    );
    Ok(result)
}

/// The accept path on an open transaction. The sweep calls this with
/// `Actor::System` for auction auto-selection.
pub async fn accept_in_tx(
    conn: &mut MySqlConnection,
    state: &AppState,
    proposal_id: Uuid,
    actor: Actor,
) -> Result<(AcceptanceResult, Deferred), AppError> {
    let snapshot = snapshot::acceptance(conn, proposal_id).await?;
    let plan = plan_accept(snapshot, actor, Utc::now())?;
    let applied = effects::apply(conn, &state.sinks, plan.effects).await?;

    let mut result = plan.result;
    result.escrow_id = applied.escrow_id;
    Ok((result, applied.deferred))
}

/// Reject a pending proposal as the owner of the swap it targets.
pub async fn reject_proposal(
    state: &AppState,
    proposal_id: Uuid,
    user_id: Uuid,
    reason: Option<String>,
) -> Result<Proposal, AppError> {
    let reason = reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
    if reason.as_ref().is_some_and(|r| r.chars().count() > MAX_REASON_LEN) {
        return Err(AppError::validation(
            "REASON_TOO_LONG",
            format!("Reason must be at most {} characters", MAX_REASON_LEN),
        ));
    }

    let mut tx = state.pool.begin().await?;
    let outcome = async {
        let snapshot = snapshot::rejection(&mut tx, proposal_id).await?;
        let (effects, rejected) = plan_reject(snapshot, user_id, reason, Utc::now())?;
        let applied = effects::apply(&mut tx, &state.sinks, effects).await?;
        Ok::<_, AppError>((rejected, applied.deferred))
    }
    .await;
    let (rejected, deferred) = outcome.map_err(AppError::into_contention)?;
    tx.commit().await.map_err(|e| AppError::from(e).into_contention())?;

    effects::dispatch(&state.sinks, deferred);
    info!(proposal_id = %proposal_id, target_swap_id = %rejected.target_swap_id, "Proposal rejected");
    Ok(rejected)
}

/// Every proposal against a swap, newest first. Owner only.
pub async fn list_proposals(state: &AppState, swap_id: Uuid, user_id: Uuid) -> Result<Vec<Proposal>, AppError> {
    let mut conn = state.pool.acquire().await?;
    let swap = db::swap::get_swap_by_id(&mut conn, swap_id)
        .await?
        .ok_or_else(|| AppError::swap_not_found(swap_id))?;
    if swap.owner_id != user_id {
        return Err(AppError::Authorization(
            "Only the owner can list proposals for this swap".to_string(),
        ));
    }

    Ok(db::proposal::list_for_target(&mut conn, swap_id).await?)
}
