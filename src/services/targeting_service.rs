use chrono::Utc;
use sqlx::mysql::MySqlConnection;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db;
use crate::machine::targeting::{evaluate, evaluate_target_only, plan_remove, plan_retarget, plan_target, TargetingPlan};
use crate::models::{
    CashOffer, TargetOptions, TargetingHistoryEntry, TargetingResult, TargetingStatusView, ValidationResult,
};
use crate::services::effects::{self, Deferred};
use crate::services::snapshot;
use crate::state::AppState;
use crate::utils::errors::{AppError, TargetingError};
use crate::utils::validation::{normalize_proposal_text, validate_cash_offer};

const HISTORY_LIMIT: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Submission {
    Target,
    Retarget,
}

/// Point `source_swap_id` at `target_swap_id` with a new proposal.
/// Replaces the source's current target if it has one.
pub async fn target_swap(
    state: &AppState,
    source_swap_id: Uuid,
    target_swap_id: Uuid,
    user_id: Uuid,
    options: TargetOptions,
) -> Result<TargetingResult, AppError> {
    submit(state, source_swap_id, target_swap_id, user_id, options, Submission::Target).await
}

/// Move the source's proposal to a new target in one transaction.
pub async fn retarget_swap(
    state: &AppState,
    source_swap_id: Uuid,
    target_swap_id: Uuid,
    user_id: Uuid,
    options: TargetOptions,
) -> Result<TargetingResult, AppError> {
    submit(state, source_swap_id, target_swap_id, user_id, options, Submission::Retarget).await
}

async fn submit(
    state: &AppState,
    source_swap_id: Uuid,
    target_swap_id: Uuid,
    user_id: Uuid,
    options: TargetOptions,
    submission: Submission,
) -> Result<TargetingResult, AppError> {
    if source_swap_id == target_swap_id {
        return Err(TargetingError::CannotTargetOwnSwap.into());
    }
    let (message, conditions) = normalize_proposal_text(options.message, options.conditions)?;
    if let Some(offer) = &options.cash_offer {
        validate_cash_offer(offer)?;
    }
    let options = TargetOptions {
        message,
        conditions,
        cash_offer: options.cash_offer,
    };

    let mut tx = state.pool.begin().await?;
    let outcome = submit_in_tx(&mut tx, state, source_swap_id, target_swap_id, user_id, options, submission).await;
    let (result, deferred) = match outcome {
        Ok(done) => done,
        Err(e) => {
            let e = e.into_contention();
            warn!(source_swap_id = %source_swap_id, target_swap_id = %target_swap_id, code = e.code(), "Targeting refused");
            return Err(e);
        }
    };
    tx.commit().await.map_err(|e| AppError::from(e).into_contention())?;

    effects::dispatch(&state.sinks, deferred);
    info!(
        source_swap_id = %source_swap_id,
        target_swap_id = %target_swap_id,
        proposal_id = %result.proposal.id,
        previous_target_swap_id = ?result.previous_target_swap_id,
        "Swap targeted"
    );
    Ok(result)
}

async fn submit_in_tx(
    conn: &mut MySqlConnection,
    state: &AppState,
    source_swap_id: Uuid,
    target_swap_id: Uuid,
    user_id: Uuid,
    options: TargetOptions,
    submission: Submission,
) -> Result<(TargetingResult, Deferred), AppError> {
    let snapshot = snapshot::targeting(conn, source_swap_id, target_swap_id, true).await?;
    let now = Utc::now();
    let TargetingPlan { effects, result } = match submission {
        Submission::Target => plan_target(snapshot, user_id, options, now)?,
        Submission::Retarget => plan_retarget(snapshot, user_id, options, now)?,
    };

    // Rules passed; the payment service gets the last word on cash offers
    if let Some(offer) = result.proposal.payload.cash_offer() {
        state.sinks.payments.validate_cash_offer(user_id, offer).await?;
    }

    let applied = effects::apply(conn, &state.sinks, effects).await?;
    Ok((result, applied.deferred))
}

/// Withdraw the source's proposal. With `expected_target`, the active
/// relation must point at that swap.
pub async fn remove_target(
    state: &AppState,
    source_swap_id: Uuid,
    user_id: Uuid,
    expected_target: Option<Uuid>,
) -> Result<(), AppError> {
    let mut tx = state.pool.begin().await?;
    let deferred = remove_in_tx(&mut tx, state, source_swap_id, user_id, expected_target)
        .await
        .map_err(AppError::into_contention)?;
    tx.commit().await.map_err(|e| AppError::from(e).into_contention())?;

    effects::dispatch(&state.sinks, deferred);
    info!(source_swap_id = %source_swap_id, "Target removed");
    Ok(())
}

async fn remove_in_tx(
    conn: &mut MySqlConnection,
    state: &AppState,
    source_swap_id: Uuid,
    user_id: Uuid,
    expected_target: Option<Uuid>,
) -> Result<Deferred, AppError> {
    let snapshot = snapshot::removal(conn, source_swap_id).await?;
    if let Some(expected) = expected_target {
        let points_there = snapshot
            .current
            .as_ref()
            .is_some_and(|c| c.relation.target_swap_id == expected);
        if snapshot.source.owner_id == user_id && !points_there {
            return Err(TargetingError::NoActiveTarget.into());
        }
    }
    let effects = plan_remove(snapshot, user_id, Utc::now())?;
    Ok(effects::apply(conn, &state.sinks, effects).await?.deferred)
}

/// Full eligibility report for a specific source and target. `options`
/// carries the cash offer the caller intends to make, if any.
pub async fn validate_targeting(
    state: &AppState,
    source_swap_id: Uuid,
    target_swap_id: Uuid,
    user_id: Uuid,
    options: &TargetOptions,
) -> Result<ValidationResult, AppError> {
    if source_swap_id == target_swap_id {
        return Ok(refused(TargetingError::CannotTargetOwnSwap.into()));
    }
    let cash_offer = options.cash_offer.as_ref();
    let mut conn = state.pool.acquire().await?;
    let report = match snapshot::targeting(&mut conn, source_swap_id, target_swap_id, false).await {
        Ok(snapshot) => evaluate(&snapshot, user_id, cash_offer, Utc::now()),
        Err(e @ AppError::NotFound { .. }) => return Ok(refused(e)),
        Err(e) => return Err(e),
    };
    drop(conn);
    confirm_cash_offer(state, user_id, cash_offer, report).await
}

/// Whether the caller may target `target_swap_id`, with or without a source
pub async fn can_target_swap(
    state: &AppState,
    target_swap_id: Uuid,
    user_id: Uuid,
    source_swap_id: Option<Uuid>,
    options: &TargetOptions,
) -> Result<ValidationResult, AppError> {
    if let Some(source_swap_id) = source_swap_id {
        return validate_targeting(state, source_swap_id, target_swap_id, user_id, options).await;
    }

    let mut conn = state.pool.acquire().await?;
    let target = db::swap::get_swap_by_id(&mut conn, target_swap_id)
        .await?
        .ok_or_else(|| AppError::swap_not_found(target_swap_id))?;
    let auction = db::auction::get_auction(&mut conn, target_swap_id, false).await?;
    let pending = db::proposal::list_pending_for_target(&mut conn, target_swap_id, false).await?;
    drop(conn);

    let cash_offer = options.cash_offer.as_ref();
    let report = evaluate_target_only(&target, auction.as_ref(), &pending, user_id, cash_offer, Utc::now());
    confirm_cash_offer(state, user_id, cash_offer, report).await
}

/// Ask the payment service about a cash offer that passed the rules, as
/// targeting does before it writes anything.
async fn confirm_cash_offer(
    state: &AppState,
    user_id: Uuid,
    cash_offer: Option<&CashOffer>,
    mut report: ValidationResult,
) -> Result<ValidationResult, AppError> {
    let Some(offer) = cash_offer.filter(|_| report.can_target) else {
        return Ok(report);
    };
    match state.sinks.payments.validate_cash_offer(user_id, offer).await {
        Ok(()) => {}
        Err(e @ AppError::Validation { .. }) => {
            report.can_target = false;
            report.errors.push(e.detail());
        }
        Err(e) => return Err(e),
    }
    Ok(report)
}

fn refused(error: AppError) -> ValidationResult {
    ValidationResult {
        can_target: false,
        errors: vec![error.detail()],
        warnings: Vec::new(),
    }
}

/// Outgoing and incoming targeting of a swap
pub async fn get_targeting_status(state: &AppState, swap_id: Uuid) -> Result<TargetingStatusView, AppError> {
    let mut conn = state.pool.acquire().await?;
    db::swap::get_swap_by_id(&mut conn, swap_id)
        .await?
        .ok_or_else(|| AppError::swap_not_found(swap_id))?;

    let outgoing = db::targeting::get_active_relation(&mut conn, swap_id, false).await?;
    let incoming = db::targeting::list_incoming(&mut conn, swap_id).await?;
    let pending_proposals = db::proposal::list_pending_for_target(&mut conn, swap_id, false).await?.len();
    let auction = db::auction::get_auction(&mut conn, swap_id, false).await?;

    let mut mutual_with = None;
    if let Some(relation) = &outgoing {
        if db::targeting::find_circular_targeting(&mut conn, swap_id, relation.target_swap_id, false).await? {
            mutual_with = Some(relation.target_swap_id);
        }
    }

    Ok(TargetingStatusView {
        swap_id,
        outgoing,
        incoming,
        pending_proposals,
        mutual_with,
        auction,
    })
}

/// Audit entries where the swap is source or target, newest first
pub async fn get_targeting_history(state: &AppState, swap_id: Uuid) -> Result<Vec<TargetingHistoryEntry>, AppError> {
    let mut conn = state.pool.acquire().await?;
    db::swap::get_swap_by_id(&mut conn, swap_id)
        .await?
        .ok_or_else(|| AppError::swap_not_found(swap_id))?;

    Ok(db::targeting::list_history(&mut conn, swap_id, HISTORY_LIMIT).await?)
}
