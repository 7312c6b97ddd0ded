//! Accepting and rejecting proposals

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use super::{
    close_proposal, release_source, release_target, Actor, Competing, CurrentTarget, Effect,
    EscrowRequest, LedgerRecord, Notice, ACCEPTED_ELSEWHERE,
};
use crate::models::{
    AcceptanceResult, Auction, AuctionStatus, BookingStatus, Proposal, ProposalPayload,
    ProposalStatus, Swap, SwapStatus, TargetingAction, TargetingRelation,
};
use crate::utils::errors::{AppError, TargetingError};

/// Rows an accept decision depends on.
#[derive(Debug, Clone)]
pub struct AcceptanceSnapshot {
    pub proposal: Proposal,
    pub relation: Option<TargetingRelation>,
    pub target: Swap,
    /// The proposer's swap.
    pub source: Swap,
    pub auction: Option<Auction>,
    /// Other pending proposals against the target.
    pub siblings: Vec<Competing>,
    /// Pending proposals against the proposer's swap.
    pub source_incoming: Vec<Competing>,
    /// Where the target swap itself points, if anywhere.
    pub target_outgoing: Option<CurrentTarget>,
}

/// Rows a reject decision depends on.
#[derive(Debug, Clone)]
pub struct RejectionSnapshot {
    pub proposal: Proposal,
    pub relation: Option<TargetingRelation>,
    pub target: Swap,
    pub source: Option<Swap>,
    /// Pending proposals against the target other than this one.
    pub other_pending: usize,
    /// Pending proposals against the proposer's swap.
    pub source_incoming: usize,
}

#[derive(Debug, Clone)]
pub struct AcceptancePlan {
    pub effects: Vec<Effect>,
    pub result: AcceptanceResult,
}

/// Accept a pending proposal. Runs for the owner and for the auction sweep.
pub fn plan_accept(
    snapshot: AcceptanceSnapshot,
    actor: Actor,
    now: DateTime<Utc>,
) -> Result<AcceptancePlan, AppError> {
    let AcceptanceSnapshot {
        proposal,
        relation,
        target,
        source,
        auction,
        siblings,
        source_incoming,
        target_outgoing,
    } = snapshot;

    if let Actor::User(user_id) = actor {
        if user_id != target.owner_id {
            return Err(AppError::Authorization(
                "Only the owner of the target swap can accept proposals".to_string(),
            ));
        }
    }
    if proposal.status != ProposalStatus::Pending {
        return Err(TargetingError::ProposalNotPending(proposal.status).into());
    }
    if !target.status.is_open() {
        return Err(TargetingError::TargetSwapUnavailable(target.status).into());
    }
    if !source.status.is_open() {
        return Err(TargetingError::SourceSwapUnavailable(source.status).into());
    }
    if auction.as_ref().is_some_and(Auction::is_settled) {
        return Err(TargetingError::AuctionEnded.into());
    }

    let takes_booking = matches!(proposal.payload, ProposalPayload::Booking { .. });
    let mut closing: HashSet<Uuid> = HashSet::from([proposal.id]);
    closing.extend(siblings.iter().map(|c| c.proposal.id));
    closing.extend(target_outgoing.iter().map(|c| c.proposal.id));
    if takes_booking {
        closing.extend(source_incoming.iter().map(|c| c.proposal.id));
    }

    let mut effects = close_proposal(&proposal, relation.as_ref(), ProposalStatus::Accepted, None, now);
    let mut rejected_proposal_ids = Vec::new();
    let mut closed: HashSet<Uuid> = HashSet::from([proposal.id]);

    for sibling in &siblings {
        if closed.insert(sibling.proposal.id) {
            effects.extend(reject_competing(sibling, &closing, actor, now));
            rejected_proposal_ids.push(sibling.proposal.id);
        }
    }

    // The accepted swap stops proposing elsewhere
    if let Some(outgoing) = &target_outgoing {
        if closed.insert(outgoing.proposal.id) {
            effects.extend(close_proposal(
                &outgoing.proposal,
                Some(&outgoing.relation),
                ProposalStatus::Cancelled,
                None,
                now,
            ));
            if outgoing.target.id != source.id {
                effects.extend(release_target(&outgoing.target, outgoing.other_pending, now));
            }
            effects.push(Effect::history(
                target.id,
                outgoing.target.id,
                Some(outgoing.proposal.id),
                TargetingAction::Cancelled,
                actor,
                json!({ "reason": "swap_accepted_elsewhere" }),
                now,
            ));
            effects.push(Effect::Notify(Notice::ProposalCancelled {
                recipient_id: outgoing.target.owner_id,
                proposal_id: outgoing.proposal.id,
                target_swap_id: outgoing.target.id,
            }));
        }
    }

    effects.push(Effect::swap_status(target.id, SwapStatus::Accepted, now));

    let mut escrow = None;
    match &proposal.payload {
        ProposalPayload::Booking { booking_id } => {
            effects.push(Effect::swap_status(source.id, SwapStatus::Accepted, now));
            effects.push(Effect::SetBookingStatus {
                booking_id: target.source_booking_id,
                status: BookingStatus::SwapInProgress,
            });
            effects.push(Effect::SetBookingStatus {
                booking_id: *booking_id,
                status: BookingStatus::SwapInProgress,
            });
            // The proposer's booking is gone, so is everything bid on it
            for incoming in &source_incoming {
                if closed.insert(incoming.proposal.id) {
                    effects.extend(reject_competing(incoming, &closing, actor, now));
                    rejected_proposal_ids.push(incoming.proposal.id);
                }
            }
        }
        ProposalPayload::Cash { cash_offer } => {
            let still_pending = source_incoming
                .iter()
                .filter(|c| !closing.contains(&c.proposal.id))
                .count();
            effects.extend(release_source(&source, still_pending, now));
            effects.push(Effect::SetBookingStatus {
                booking_id: target.source_booking_id,
                status: BookingStatus::SaleInProgress,
            });
            escrow = Some(EscrowRequest {
                proposal_id: proposal.id,
                payer_id: proposal.proposer_id,
                payee_id: target.owner_id,
                offer: cash_offer.clone(),
            });
        }
    }

    let auction = auction.map(|mut auction| {
        auction.status = AuctionStatus::Resolved;
        auction.winning_proposal_id = Some(proposal.id);
        auction.auto_selected = actor == Actor::System;
        auction.ended_at = auction.ended_at.or(Some(now));
        effects.push(Effect::SaveAuction(auction.clone()));
        auction
    });

    effects.push(Effect::history(
        source.id,
        target.id,
        Some(proposal.id),
        TargetingAction::Accepted,
        actor,
        json!({
            "autoSelected": actor == Actor::System,
            "rejectedProposalIds": rejected_proposal_ids,
        }),
        now,
    ));
    effects.push(Effect::Notify(Notice::ProposalAccepted {
        recipient_id: proposal.proposer_id,
        proposal_id: proposal.id,
        target_swap_id: target.id,
    }));
    effects.push(Effect::Notarize(LedgerRecord {
        event: "proposal_accepted",
        swap_id: target.id,
        proposal_id: Some(proposal.id),
        payload: json!({
            "sourceSwapId": source.id,
            "proposalType": proposal.payload.kind(),
            "autoSelected": actor == Actor::System,
        }),
        recorded_at: now,
    }));
    // Escrow goes last so every local write has succeeded before money moves
    if let Some(request) = escrow {
        effects.push(Effect::CreateEscrow(request));
    }

    let mut accepted = proposal;
    accepted.status = ProposalStatus::Accepted;
    accepted.responded_at = Some(now);

    Ok(AcceptancePlan {
        effects,
        result: AcceptanceResult {
            proposal: accepted,
            rejected_proposal_ids,
            auction,
            escrow_id: None,
        },
    })
}

/// Reject a pending proposal. Does not end a running auction.
pub fn plan_reject(
    snapshot: RejectionSnapshot,
    user_id: Uuid,
    reason: Option<String>,
    now: DateTime<Utc>,
) -> Result<(Vec<Effect>, Proposal), AppError> {
    let RejectionSnapshot {
        proposal,
        relation,
        target,
        source,
        other_pending,
        source_incoming,
    } = snapshot;

    if user_id != target.owner_id {
        return Err(AppError::Authorization(
            "Only the owner of the target swap can reject proposals".to_string(),
        ));
    }
    if proposal.status != ProposalStatus::Pending {
        return Err(TargetingError::ProposalNotPending(proposal.status).into());
    }

    let mut effects = close_proposal(
        &proposal,
        relation.as_ref(),
        ProposalStatus::Rejected,
        reason.clone(),
        now,
    );
    if let Some(source) = &source {
        effects.extend(release_source(source, source_incoming, now));
    }
    effects.extend(release_target(&target, other_pending, now));
    effects.push(Effect::history(
        proposal.source_swap_id,
        target.id,
        Some(proposal.id),
        TargetingAction::Rejected,
        Actor::User(user_id),
        json!({ "reason": reason }),
        now,
    ));
    effects.push(Effect::Notify(Notice::ProposalRejected {
        recipient_id: proposal.proposer_id,
        proposal_id: proposal.id,
        target_swap_id: target.id,
        reason: reason.clone(),
    }));

    let mut rejected = proposal;
    rejected.status = ProposalStatus::Rejected;
    rejected.rejection_reason = reason;
    rejected.responded_at = Some(now);
    Ok((effects, rejected))
}

/// Reject a proposal that lost to the accepted one.
fn reject_competing(
    competing: &Competing,
    closing: &HashSet<Uuid>,
    actor: Actor,
    now: DateTime<Utc>,
) -> Vec<Effect> {
    let proposal = &competing.proposal;
    let mut effects = close_proposal(
        proposal,
        competing.relation.as_ref(),
        ProposalStatus::Rejected,
        Some(ACCEPTED_ELSEWHERE.to_string()),
        now,
    );
    if let Some(source) = &competing.source {
        effects.extend(release_source(source, competing.source_pending_after(closing), now));
    }
    effects.push(Effect::history(
        proposal.source_swap_id,
        proposal.target_swap_id,
        Some(proposal.id),
        TargetingAction::Rejected,
        actor,
        json!({ "reason": ACCEPTED_ELSEWHERE }),
        now,
    ));
    effects.push(Effect::Notify(Notice::ProposalRejected {
        recipient_id: proposal.proposer_id,
        proposal_id: proposal.id,
        target_swap_id: proposal.target_swap_id,
        reason: Some(ACCEPTED_ELSEWHERE.to_string()),
    }));
    effects
}
