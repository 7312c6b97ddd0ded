//! Listing, cancelling and expiring swaps

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use super::auction::validate_auction_window;
use super::{close_proposal, release_source, release_target, Actor, Competing, CurrentTarget, Effect, LedgerRecord, Notice};
use crate::models::{
    AcceptanceStrategy, Auction, AuctionStatus, Booking, BookingStatus, PaymentTypes,
    ProposalStatus, Swap, SwapStatus, TargetingAction,
};
use crate::utils::errors::{AppError, TargetingError};

/// Rows a cancel / expire decision depends on.
#[derive(Debug, Clone)]
pub struct ClosureSnapshot {
    pub swap: Swap,
    pub outgoing: Option<CurrentTarget>,
    /// Pending proposals against the swap.
    pub incoming: Vec<Competing>,
}

/// Parsed form of a create-swap request.
#[derive(Debug, Clone)]
pub struct NewSwap {
    pub acceptance_strategy: AcceptanceStrategy,
    pub payment_types: PaymentTypes,
}

fn check_payment_types(payment_types: &PaymentTypes) -> Result<(), AppError> {
    if !payment_types.booking_exchange && !payment_types.cash_payment {
        return Err(AppError::validation(
            "INVALID_PAYMENT_TYPES",
            "At least one payment type must be accepted",
        ));
    }
    let amounts = [payment_types.minimum_cash_amount, payment_types.preferred_cash_amount];
    if amounts.iter().flatten().any(|a| !a.is_finite() || *a < 0.0) {
        return Err(AppError::validation(
            "INVALID_PAYMENT_TYPES",
            "Cash amounts must be non-negative numbers",
        ));
    }
    if let [Some(minimum), Some(preferred)] = amounts {
        if minimum > preferred {
            return Err(AppError::validation(
                "INVALID_PAYMENT_TYPES",
                "Minimum cash amount cannot exceed the preferred amount",
            ));
        }
    }
    Ok(())
}

/// Build a new listing for `booking`.
///
/// `existing` is the owner's open swap for the same booking, if any.
pub fn plan_new_swap(
    booking: &Booking,
    owner_id: Uuid,
    request: NewSwap,
    existing: Option<&Swap>,
    now: DateTime<Utc>,
) -> Result<(Swap, Option<Auction>), AppError> {
    if booking.owner_id != owner_id {
        return Err(AppError::Authorization(
            "You can only list your own bookings".to_string(),
        ));
    }
    if existing.is_some() {
        return Err(TargetingError::SwapAlreadyExists.into());
    }
    if booking.status != BookingStatus::Available {
        return Err(TargetingError::BookingUnavailable(booking.status).into());
    }
    if booking.check_in <= now {
        return Err(AppError::validation(
            "BOOKING_IN_PAST",
            "Bookings whose check-in has passed cannot be listed",
        ));
    }
    check_payment_types(&request.payment_types)?;

    let swap = Swap {
        id: Uuid::new_v4(),
        source_booking_id: booking.id,
        owner_id,
        status: SwapStatus::Active,
        acceptance_strategy: request.acceptance_strategy,
        payment_types: request.payment_types,
        created_at: now,
        updated_at: now,
    };

    let auction = match &swap.acceptance_strategy {
        AcceptanceStrategy::FirstMatch => None,
        AcceptanceStrategy::Auction {
            auction_end_date,
            auto_select_after_hours,
        } => {
            validate_auction_window(*auction_end_date, *auto_select_after_hours, booking.check_in, now)?;
            Some(Auction {
                swap_id: swap.id,
                end_date: *auction_end_date,
                auto_select_after_hours: *auto_select_after_hours,
                status: AuctionStatus::Active,
                winning_proposal_id: None,
                auto_selected: false,
                ended_at: None,
            })
        }
    };

    Ok((swap, auction))
}

/// Take a swap off the market, either by its owner (`Cancelled`) or by the
/// sweep once the booking's check-in has passed (`Expired`).
pub fn plan_close(
    snapshot: ClosureSnapshot,
    status: SwapStatus,
    actor: Actor,
    now: DateTime<Utc>,
) -> Result<Vec<Effect>, AppError> {
    let action = match status {
        SwapStatus::Cancelled => TargetingAction::Cancelled,
        SwapStatus::Expired => TargetingAction::Expired,
        other => return Err(AppError::Internal(format!("cannot close a swap as {}", other))),
    };
    let ClosureSnapshot { swap, outgoing, incoming } = snapshot;

    if let Actor::User(user_id) = actor {
        if user_id != swap.owner_id {
            return Err(AppError::Authorization(
                "Only the owner can cancel a swap".to_string(),
            ));
        }
    }
    if !swap.status.is_open() {
        return Err(TargetingError::SwapNotOpen(swap.status).into());
    }

    let reason = format!("swap_{}", status);
    let mut closing: HashSet<Uuid> = incoming.iter().map(|c| c.proposal.id).collect();
    closing.extend(outgoing.iter().map(|c| c.proposal.id));
    let mut effects = Vec::new();

    if let Some(current) = &outgoing {
        effects.extend(close_proposal(
            &current.proposal,
            Some(&current.relation),
            ProposalStatus::Cancelled,
            None,
            now,
        ));
        effects.extend(release_target(&current.target, current.other_pending, now));
        effects.push(Effect::history(
            swap.id,
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
    }

    for competing in &incoming {
        let proposal = &competing.proposal;
        effects.extend(close_proposal(
            proposal,
            competing.relation.as_ref(),
            ProposalStatus::Cancelled,
            Some(format!("Swap {}", status)),
            now,
        ));
        if let Some(source) = &competing.source {
            effects.extend(release_source(source, competing.source_pending_after(&closing), now));
        }
        effects.push(Effect::history(
            proposal.source_swap_id,
            swap.id,
            Some(proposal.id),
            TargetingAction::Cancelled,
            actor,
            json!({ "reason": reason }),
            now,
        ));
        effects.push(Effect::Notify(Notice::ProposalCancelled {
            recipient_id: proposal.proposer_id,
            proposal_id: proposal.id,
            target_swap_id: swap.id,
        }));
    }

    effects.push(Effect::swap_status(swap.id, status, now));
    effects.push(Effect::history(
        swap.id,
        swap.id,
        None,
        action,
        actor,
        json!({
            "cancelledOutgoing": outgoing.as_ref().map(|c| c.proposal.id),
            "cancelledIncoming": incoming.iter().map(|c| c.proposal.id).collect::<Vec<_>>(),
        }),
        now,
    ));
    if status == SwapStatus::Expired {
        effects.push(Effect::Notify(Notice::SwapExpired {
            recipient_id: swap.owner_id,
            swap_id: swap.id,
        }));
    }
    effects.push(Effect::Notarize(LedgerRecord {
        event: if status == SwapStatus::Expired { "swap_expired" } else { "swap_cancelled" },
        swap_id: swap.id,
        proposal_id: None,
        payload: json!({ "ownerId": swap.owner_id }),
        recorded_at: now,
    }));

    Ok(effects)
}
