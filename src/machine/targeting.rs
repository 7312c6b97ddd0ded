//! Target, retarget and remove-target transitions

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use super::{close_proposal, release_source, release_target, Actor, CurrentTarget, Effect, LedgerRecord, Notice};
use crate::models::{
    AcceptanceStrategy, Auction, CashOffer, PaymentTypes, Proposal, ProposalPayload, ProposalStatus,
    Swap, SwapStatus, TargetOptions, TargetingAction, TargetingRelation, TargetingResult,
    TargetingStatus, ValidationResult,
};
use crate::utils::errors::{AppError, TargetingError};
use crate::utils::validation::validate_cash_offer;

/// Auctions closing sooner than this get a warning in eligibility checks
const AUCTION_ENDING_SOON_HOURS: i64 = 24;

/// Rows a target / retarget decision depends on.
#[derive(Debug, Clone)]
pub struct TargetingSnapshot {
    pub source: Swap,
    pub target: Swap,
    pub target_auction: Option<Auction>,
    /// Pending proposals against the target, excluding the source's own.
    pub target_pending: Vec<Proposal>,
    pub current: Option<CurrentTarget>,
    /// The target currently targets the source.
    pub mutual: bool,
}

/// Rows a remove-target decision depends on.
#[derive(Debug, Clone)]
pub struct RemovalSnapshot {
    pub source: Swap,
    pub current: Option<CurrentTarget>,
    /// Pending proposals against the source.
    pub incoming_pending: usize,
}

#[derive(Debug, Clone)]
pub struct TargetingPlan {
    pub effects: Vec<Effect>,
    pub result: TargetingResult,
}

/// Rules that only depend on the target swap and the caller.
pub fn check_target_side(
    target: &Swap,
    auction: Option<&Auction>,
    pending: &[Proposal],
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    if target.owner_id == user_id {
        return Err(TargetingError::CannotTargetOwnSwap.into());
    }
    if !target.status.is_open() {
        return Err(TargetingError::TargetSwapUnavailable(target.status).into());
    }
    match &target.acceptance_strategy {
        AcceptanceStrategy::Auction { auction_end_date, .. } => {
            let closed = now >= *auction_end_date
                || auction.is_some_and(|a| !a.accepts_proposals(now));
            if closed {
                return Err(TargetingError::AuctionEnded.into());
            }
        }
        AcceptanceStrategy::FirstMatch => {
            if pending.iter().any(Proposal::is_pending) {
                return Err(TargetingError::ProposalPending.into());
            }
        }
    }
    Ok(())
}

/// Whether the target takes this kind of proposal.
pub fn check_payment(payment_types: &PaymentTypes, cash_offer: Option<&CashOffer>) -> Result<(), AppError> {
    match cash_offer {
        Some(offer) => {
            validate_cash_offer(offer)?;
            if !payment_types.cash_payment {
                return Err(TargetingError::PaymentTypeNotAccepted("cash").into());
            }
            if let Some(minimum) = payment_types.minimum_cash_amount {
                if offer.amount < minimum {
                    return Err(TargetingError::CashOfferBelowMinimum {
                        offered: offer.amount,
                        minimum,
                    }
                    .into());
                }
            }
        }
        None => {
            if !payment_types.booking_exchange {
                return Err(TargetingError::PaymentTypeNotAccepted("booking exchange").into());
            }
        }
    }
    Ok(())
}

/// Full rule set for pointing `snapshot.source` at `snapshot.target`.
pub fn check_targeting(
    snapshot: &TargetingSnapshot,
    user_id: Uuid,
    cash_offer: Option<&CashOffer>,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let TargetingSnapshot { source, target, .. } = snapshot;

    if source.id == target.id {
        return Err(TargetingError::CannotTargetOwnSwap.into());
    }
    if source.owner_id != user_id {
        return Err(AppError::Authorization(
            "You can only target with your own swap".to_string(),
        ));
    }
    if !source.status.is_open() {
        return Err(TargetingError::SourceSwapUnavailable(source.status).into());
    }
    if snapshot
        .current
        .as_ref()
        .is_some_and(|c| c.relation.target_swap_id == target.id)
    {
        return Err(TargetingError::AlreadyTargeted.into());
    }
    check_target_side(
        target,
        snapshot.target_auction.as_ref(),
        &snapshot.target_pending,
        user_id,
        now,
    )?;
    check_payment(&target.payment_types, cash_offer)
}

/// Eligibility report built from `check_targeting` plus soft warnings.
pub fn evaluate(
    snapshot: &TargetingSnapshot,
    user_id: Uuid,
    cash_offer: Option<&CashOffer>,
    now: DateTime<Utc>,
) -> ValidationResult {
    let errors = match check_targeting(snapshot, user_id, cash_offer, now) {
        Ok(()) => Vec::new(),
        Err(e) => vec![e.detail()],
    };

    let mut warnings = target_warnings(&snapshot.target, snapshot.target_auction.as_ref(), cash_offer, now);
    if snapshot.mutual {
        warnings.push("This swap is already targeting your swap".to_string());
    }
    if let Some(current) = &snapshot.current {
        if current.relation.target_swap_id != snapshot.target.id {
            warnings.push("Your current proposal will be cancelled".to_string());
        }
    }

    ValidationResult {
        can_target: errors.is_empty(),
        errors,
        warnings,
    }
}

/// Eligibility report when the caller has not picked a source swap yet.
/// Runs every rule that does not need the source.
pub fn evaluate_target_only(
    target: &Swap,
    auction: Option<&Auction>,
    pending: &[Proposal],
    user_id: Uuid,
    cash_offer: Option<&CashOffer>,
    now: DateTime<Utc>,
) -> ValidationResult {
    let checked = check_target_side(target, auction, pending, user_id, now)
        .and_then(|()| check_payment(&target.payment_types, cash_offer));
    let errors = match checked {
        Ok(()) => Vec::new(),
        Err(e) => vec![e.detail()],
    };
    ValidationResult {
        can_target: errors.is_empty(),
        errors,
        warnings: target_warnings(target, auction, cash_offer, now),
    }
}

fn target_warnings(
    target: &Swap,
    auction: Option<&Auction>,
    cash_offer: Option<&CashOffer>,
    now: DateTime<Utc>,
) -> Vec<String> {
    let mut warnings = Vec::new();
    if let (Some(offer), Some(preferred)) = (cash_offer, target.payment_types.preferred_cash_amount) {
        if offer.amount < preferred {
            warnings.push(format!(
                "Offer is below the owner's preferred amount of {:.2}",
                preferred
            ));
        }
    }
    if let Some(auction) = auction {
        let remaining = auction.end_date - now;
        if auction.accepts_proposals(now) && remaining < Duration::hours(AUCTION_ENDING_SOON_HOURS) {
            warnings.push("The auction ends within 24 hours".to_string());
        }
    }
    if target.acceptance_strategy.is_auction() {
        warnings.push("Auction swaps may accept a competing proposal instead of yours".to_string());
    }
    warnings
}

/// Point the source at the target, replacing any current target.
pub fn plan_target(
    snapshot: TargetingSnapshot,
    user_id: Uuid,
    options: TargetOptions,
    now: DateTime<Utc>,
) -> Result<TargetingPlan, AppError> {
    check_targeting(&snapshot, user_id, options.cash_offer.as_ref(), now)?;

    let actor = Actor::User(user_id);
    let TargetingSnapshot { source, target, current, .. } = snapshot;
    let mut effects = Vec::new();

    let previous_target_swap_id = current.as_ref().map(|c| c.target.id);
    let cancelled_proposal_id = current.as_ref().map(|c| c.proposal.id);
    if let Some(current) = &current {
        effects.extend(withdraw_current(&source, current, actor, "retargeted", now));
    }

    let payload = match options.cash_offer {
        Some(cash_offer) => ProposalPayload::Cash { cash_offer },
        None => ProposalPayload::Booking {
            booking_id: source.source_booking_id,
        },
    };
    let proposal = Proposal {
        id: Uuid::new_v4(),
        target_swap_id: target.id,
        source_swap_id: source.id,
        proposer_id: user_id,
        payload,
        status: ProposalStatus::Pending,
        message: options.message,
        conditions: options.conditions,
        rejection_reason: None,
        submitted_at: now,
        responded_at: None,
    };
    let relation = TargetingRelation {
        id: Uuid::new_v4(),
        source_swap_id: source.id,
        target_swap_id: target.id,
        proposal_id: proposal.id,
        status: TargetingStatus::Active,
        created_at: now,
        updated_at: now,
    };
    let exclusive = !target.acceptance_strategy.is_auction();

    effects.push(Effect::InsertProposal {
        proposal: proposal.clone(),
        exclusive,
    });
    effects.push(Effect::InsertRelation(relation.clone()));
    if source.status == SwapStatus::Active {
        effects.push(Effect::swap_status(source.id, SwapStatus::Targeting, now));
    }
    if exclusive && target.status == SwapStatus::Active {
        effects.push(Effect::swap_status(target.id, SwapStatus::ProposalPending, now));
    }

    let action = if previous_target_swap_id.is_some() {
        TargetingAction::Retargeted
    } else {
        TargetingAction::Targeted
    };
    effects.push(Effect::history(
        source.id,
        target.id,
        Some(proposal.id),
        action,
        actor,
        json!({
            "proposalType": proposal.payload.kind(),
            "previousTargetSwapId": previous_target_swap_id,
        }),
        now,
    ));
    effects.push(Effect::Notify(Notice::ProposalReceived {
        recipient_id: target.owner_id,
        proposal_id: proposal.id,
        source_swap_id: source.id,
        target_swap_id: target.id,
    }));
    effects.push(Effect::Notarize(LedgerRecord {
        event: "proposal_created",
        swap_id: target.id,
        proposal_id: Some(proposal.id),
        payload: json!({
            "sourceSwapId": source.id,
            "proposerId": user_id,
            "proposalType": proposal.payload.kind(),
        }),
        recorded_at: now,
    }));

    Ok(TargetingPlan {
        effects,
        result: TargetingResult {
            relation,
            proposal,
            previous_target_swap_id,
            cancelled_proposal_id,
        },
    })
}

/// Replace an existing target. Fails when there is nothing to replace.
pub fn plan_retarget(
    snapshot: TargetingSnapshot,
    user_id: Uuid,
    options: TargetOptions,
    now: DateTime<Utc>,
) -> Result<TargetingPlan, AppError> {
    if snapshot.source.owner_id == user_id && snapshot.current.is_none() {
        return Err(TargetingError::NoActiveTarget.into());
    }
    plan_target(snapshot, user_id, options, now)
}

/// Drop the source's target without picking a new one.
pub fn plan_remove(
    snapshot: RemovalSnapshot,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Vec<Effect>, AppError> {
    if snapshot.source.owner_id != user_id {
        return Err(AppError::Authorization(
            "You can only remove targets from your own swap".to_string(),
        ));
    }
    let current = snapshot.current.ok_or(TargetingError::NoActiveTarget)?;

    let actor = Actor::User(user_id);
    let mut effects = withdraw_current(&snapshot.source, &current, actor, "removed", now);
    effects.extend(release_source(&snapshot.source, snapshot.incoming_pending, now));
    effects.push(Effect::history(
        snapshot.source.id,
        current.target.id,
        Some(current.proposal.id),
        TargetingAction::Removed,
        actor,
        json!({}),
        now,
    ));
    Ok(effects)
}

/// Cancel the source's current proposal and tell the target owner.
fn withdraw_current(
    source: &Swap,
    current: &CurrentTarget,
    actor: Actor,
    reason: &str,
    now: DateTime<Utc>,
) -> Vec<Effect> {
    let mut effects = close_proposal(
        &current.proposal,
        Some(&current.relation),
        ProposalStatus::Cancelled,
        None,
        now,
    );
    effects.extend(release_target(&current.target, current.other_pending, now));
    effects.push(Effect::history(
        source.id,
        current.target.id,
        Some(current.proposal.id),
        TargetingAction::Cancelled,
        actor,
        json!({ "reason": reason }),
        now,
    ));
    effects.push(Effect::Notify(Notice::ProposalCancelled {
        recipient_id: current.target.owner_id,
        proposal_id: current.proposal.id,
        target_swap_id: current.target.id,
    }));
    effects
}
