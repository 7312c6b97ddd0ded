//! Periodic auction timeout and expiry sweep
//!
//! Every step works one swap per transaction and re-checks the swap under
//! its row lock, so overlapping sweeps (or a sweep racing an owner) do each
//! transition at most once.

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::db;
use crate::machine::auction::{phase, plan_conversion, plan_end, select_winner, AuctionPhase};
use crate::machine::Actor;
use crate::models::SwapStatus;
use crate::services::effects::{self, Deferred};
use crate::services::{proposal_service, swap_service};
use crate::state::AppState;
use crate::utils::errors::{AppError, TargetingError};

/// Swaps handled per step per pass
const SWEEP_BATCH: u32 = 100;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct SweepReport {
    pub ended: usize,
    pub auto_selected: usize,
    pub converted: usize,
    pub expired: usize,
    pub failed: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Resolution {
    Skipped,
    AutoSelected,
    Converted,
    /// Every pending proposal was refused
    Stuck,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Attempt {
    Done(Resolution),
    WinnerFailed(Uuid),
    Exhausted,
}

/// Run the sweep forever on the configured interval.
pub fn spawn(state: AppState) -> JoinHandle<()> {
    let period = state.config.sweep_interval;
    info!("Sweep running every {}s", period.as_secs());

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match run_sweep(&state).await {
                Ok(report) if report.is_empty() => debug!("Sweep found nothing to do"),
                Ok(report) => info!(
                    ended = report.ended,
                    auto_selected = report.auto_selected,
                    converted = report.converted,
                    expired = report.expired,
                    failed = report.failed,
                    "Sweep finished"
                ),
                Err(e) => error!(error = %e, "Sweep failed"),
            }
        }
    })
}

/// One pass: end due auctions, resolve lapsed ones, expire past check-ins.
pub async fn run_sweep(state: &AppState) -> Result<SweepReport, AppError> {
    let mut report = SweepReport::default();

    let due = {
        let mut conn = state.pool.acquire().await?;
        db::auction::list_due_to_end(&mut conn, Utc::now(), SWEEP_BATCH).await?
    };
    for swap_id in due {
        match end_auction(state, swap_id).await {
            Ok(true) => report.ended += 1,
            Ok(false) => {}
            Err(e) => {
                warn!(swap_id = %swap_id, error = %e, "Could not end auction");
                report.failed += 1;
            }
        }
    }

    let due = {
        let mut conn = state.pool.acquire().await?;
        db::auction::list_due_for_selection(&mut conn, Utc::now(), SWEEP_BATCH).await?
    };
    for swap_id in due {
        match resolve_auction(state, swap_id).await {
            Ok(Resolution::AutoSelected) => report.auto_selected += 1,
            Ok(Resolution::Converted) => report.converted += 1,
            Ok(Resolution::Skipped) => {}
            Ok(Resolution::Stuck) => report.failed += 1,
            Err(e) => {
                warn!(swap_id = %swap_id, error = %e, "Could not resolve auction");
                report.failed += 1;
            }
        }
    }

    let due = {
        let mut conn = state.pool.acquire().await?;
        db::swap::list_expirable(&mut conn, Utc::now(), SWEEP_BATCH).await?
    };
    for swap_id in due {
        match expire_swap(state, swap_id).await {
            Ok(true) => report.expired += 1,
            Ok(false) => {}
            Err(e) => {
                warn!(swap_id = %swap_id, error = %e, "Could not expire swap");
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

async fn end_auction(state: &AppState, swap_id: Uuid) -> Result<bool, AppError> {
    let mut tx = state.pool.begin().await?;
    let swaps = db::swap::get_swaps(&mut tx, &[swap_id], true).await?;
    if !swaps.first().is_some_and(|s| s.status.is_open()) {
        return Ok(false);
    }
    let Some(auction) = db::auction::get_auction(&mut tx, swap_id, true).await? else {
        return Ok(false);
    };
    let Some(ended) = plan_end(&auction, Utc::now()) else {
        return Ok(false);
    };
    db::auction::save_auction(&mut tx, &ended).await?;
    tx.commit().await?;

    debug!(swap_id = %swap_id, "Auction ended");
    Ok(true)
}

async fn resolve_auction(state: &AppState, swap_id: Uuid) -> Result<Resolution, AppError> {
    let mut passed_over = Vec::new();
    loop {
        match resolve_once(state, swap_id, &passed_over).await? {
            Attempt::Done(resolution) => return Ok(resolution),
            Attempt::WinnerFailed(proposal_id) => passed_over.push(proposal_id),
            Attempt::Exhausted => {
                // Keep the auction ended for the owner, and move it to the
                // back of the selection queue
                let mut conn = state.pool.acquire().await?;
                db::auction::mark_selection_attempt(&mut conn, swap_id, Utc::now()).await?;
                error!(
                    swap_id = %swap_id,
                    candidates = passed_over.len(),
                    "No auction proposal could be auto-selected"
                );
                return Ok(Resolution::Stuck);
            }
        }
    }
}

/// One selection attempt in its own transaction. A winner that fails to
/// be accepted rolls back and is reported so the next one can be tried.
async fn resolve_once(state: &AppState, swap_id: Uuid, passed_over: &[Uuid]) -> Result<Attempt, AppError> {
    let mut tx = state.pool.begin().await?;
    let swaps = db::swap::get_swaps(&mut tx, &[swap_id], true).await?;
    let Some(swap) = swaps.into_iter().next().filter(|s| s.status.is_open()) else {
        return Ok(Attempt::Done(Resolution::Skipped));
    };
    let Some(auction) = db::auction::get_auction(&mut tx, swap_id, true).await? else {
        return Ok(Attempt::Done(Resolution::Skipped));
    };
    let now = Utc::now();
    if phase(&auction, now) != AuctionPhase::SelectionDue {
        return Ok(Attempt::Done(Resolution::Skipped));
    }

    let pending = db::proposal::list_pending_for_target(&mut tx, swap_id, true).await?;
    let (resolution, deferred): (Resolution, Deferred) = if pending.is_empty() {
        let effects = plan_conversion(&auction, &swap, &pending, now)?;
        let applied = effects::apply(&mut tx, &state.sinks, effects).await?;
        info!(swap_id = %swap_id, "Auction without proposals converted to first-match");
        (Resolution::Converted, applied.deferred)
    } else {
        let Some(winner) = select_winner(&pending, passed_over) else {
            return Ok(Attempt::Exhausted);
        };
        let winner_id = winner.id;
        let (result, deferred) = match proposal_service::accept_in_tx(&mut tx, state, winner_id, Actor::System).await {
            Ok(accepted) => accepted,
            Err(e) => {
                let e = e.into_contention();
                // Contention and storage failures are retried on the next pass
                if matches!(e, AppError::Targeting(TargetingError::ConcurrentTargeting) | AppError::Database(_)) {
                    return Err(e);
                }
                warn!(swap_id = %swap_id, proposal_id = %winner_id, code = e.code(), error = %e, "Auto-selected winner refused");
                return Ok(Attempt::WinnerFailed(winner_id));
            }
        };
        info!(
            swap_id = %swap_id,
            proposal_id = %winner_id,
            rejected = result.rejected_proposal_ids.len(),
            passed_over = passed_over.len(),
            "Auction winner auto-selected"
        );
        (Resolution::AutoSelected, deferred)
    };
    tx.commit().await?;

    effects::dispatch(&state.sinks, deferred);
    Ok(Attempt::Done(resolution))
}

async fn expire_swap(state: &AppState, swap_id: Uuid) -> Result<bool, AppError> {
    let mut tx = state.pool.begin().await?;
    let deferred = match swap_service::close_in_tx(&mut tx, state, swap_id, SwapStatus::Expired, Actor::System).await {
        Ok(deferred) => deferred,
        // Closed by its owner since the listing query ran
        Err(AppError::Targeting(TargetingError::SwapNotOpen(_))) => return Ok(false),
        Err(e) => return Err(e),
    };
    tx.commit().await?;

    effects::dispatch(&state.sinks, deferred);
    info!(swap_id = %swap_id, "Swap expired");
    Ok(true)
}
