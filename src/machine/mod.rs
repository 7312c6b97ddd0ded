//! Swap targeting and proposal state machine
//!
//! Every operation is split in two: a service loads a snapshot of the rows it
//! touches (under row locks), and a pure function here checks the rules and
//! returns the effects of the transition. The same rule functions back the
//! read-only eligibility checks, so "can I?" and "did it work?" never drift.

pub mod acceptance;
pub mod auction;
pub mod effect;
pub mod lifecycle;
pub mod targeting;

#[cfg(test)]
pub(crate) mod world;

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use effect::{Actor, Effect, EscrowRequest, LedgerRecord, Notice};

use crate::models::{Proposal, ProposalStatus, Swap, SwapStatus, TargetingRelation, TargetingStatus};

/// Reason stored on proposals that lose to an accepted one
pub const ACCEPTED_ELSEWHERE: &str = "Another proposal was accepted";

/// The active relation of a source swap, the proposal it carries and the
/// swap it points at.
#[derive(Debug, Clone)]
pub struct CurrentTarget {
    pub relation: TargetingRelation,
    pub proposal: Proposal,
    pub target: Swap,
    /// Pending proposals against `target` other than `proposal`.
    pub other_pending: usize,
}

/// A pending proposal that is closed as a side effect of another transition.
#[derive(Debug, Clone)]
pub struct Competing {
    pub proposal: Proposal,
    pub relation: Option<TargetingRelation>,
    /// The proposer's swap, if it still exists.
    pub source: Option<Swap>,
    /// Pending proposals against the proposer's swap.
    pub source_incoming: Vec<Uuid>,
}

impl Competing {
    /// Proposals still pending against the proposer's swap once `closing` are gone.
    fn source_pending_after(&self, closing: &HashSet<Uuid>) -> usize {
        self.source_incoming.iter().filter(|id| !closing.contains(id)).count()
    }
}

/// Close a pending proposal and the relation that carries it.
fn close_proposal(
    proposal: &Proposal,
    relation: Option<&TargetingRelation>,
    status: ProposalStatus,
    reason: Option<String>,
    at: DateTime<Utc>,
) -> Vec<Effect> {
    let relation_status = match status {
        ProposalStatus::Accepted => TargetingStatus::Accepted,
        ProposalStatus::Rejected => TargetingStatus::Rejected,
        ProposalStatus::Pending | ProposalStatus::Cancelled => TargetingStatus::Cancelled,
    };

    let mut effects = vec![Effect::SetProposalStatus {
        proposal_id: proposal.id,
        status,
        reason,
        at,
    }];
    if let Some(relation) = relation.filter(|r| r.status == TargetingStatus::Active) {
        effects.push(Effect::SetRelationStatus {
            relation_id: relation.id,
            status: relation_status,
            at,
        });
    }
    effects
}

/// A source swap whose targeting ended goes back to `active`, or to
/// `proposal_pending` when it takes one proposal at a time and one is still
/// pending against it.
fn release_source(source: &Swap, incoming_pending: usize, at: DateTime<Utc>) -> Option<Effect> {
    if source.status != SwapStatus::Targeting {
        return None;
    }
    let status = if incoming_pending > 0 && !source.acceptance_strategy.is_auction() {
        SwapStatus::ProposalPending
    } else {
        SwapStatus::Active
    };
    Some(Effect::swap_status(source.id, status, at))
}

/// A first-match target with nothing left pending goes back to `active`.
fn release_target(target: &Swap, remaining_pending: usize, at: DateTime<Utc>) -> Option<Effect> {
    (target.status == SwapStatus::ProposalPending && remaining_pending == 0)
        .then(|| Effect::swap_status(target.id, SwapStatus::Active, at))
}
