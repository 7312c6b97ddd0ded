//! In-memory marketplace for driving the state machine in tests.
//!
//! Snapshots are built the same way the database loaders build them and
//! effects are applied with the same uniqueness rules the schema enforces,
//! all-or-nothing like a transaction.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::acceptance::{plan_accept, plan_reject, AcceptanceSnapshot, RejectionSnapshot};
use super::auction::{phase, plan_conversion, plan_end, select_winner, AuctionPhase};
use super::lifecycle::{plan_close, plan_new_swap, ClosureSnapshot, NewSwap};
use super::targeting::{evaluate, evaluate_target_only, plan_remove, plan_retarget, plan_target, RemovalSnapshot, TargetingSnapshot};
use super::{Actor, Competing, CurrentTarget, Effect, EscrowRequest, Notice};
use crate::models::{
    AcceptanceResult, AcceptanceStrategy, Auction, AuctionStatus, Booking, BookingStatus,
    BookingType, CashOffer, PaymentTypes, Proposal, ProposalStatus, Swap, SwapStatus,
    TargetOptions, TargetingHistoryEntry, TargetingRelation, TargetingResult, TargetingStatus,
    ValidationResult,
};
use crate::utils::errors::{AppError, TargetingError};

#[derive(Debug, Clone)]
pub(crate) struct World {
    pub now: DateTime<Utc>,
    pub bookings: HashMap<Uuid, Booking>,
    pub swaps: HashMap<Uuid, Swap>,
    pub auctions: HashMap<Uuid, Auction>,
    pub proposals: HashMap<Uuid, Proposal>,
    pub exclusive: HashSet<Uuid>,
    pub relations: HashMap<Uuid, TargetingRelation>,
    pub history: Vec<TargetingHistoryEntry>,
    pub notices: Vec<Notice>,
    pub escrows: Vec<EscrowRequest>,
    pub fail_escrow: bool,
}

pub(crate) fn cash(amount: f64) -> TargetOptions {
    TargetOptions {
        cash_offer: Some(CashOffer {
            amount,
            currency: "USD".to_string(),
            payment_method_id: "pm_card".to_string(),
        }),
        ..TargetOptions::default()
    }
}

pub(crate) fn both_payments() -> PaymentTypes {
    PaymentTypes {
        booking_exchange: true,
        cash_payment: true,
        minimum_cash_amount: None,
        preferred_cash_amount: None,
    }
}

impl World {
    pub fn new() -> Self {
        let now = DateTime::parse_from_rfc3339("2030-03-01T09:00:00Z")
            .map(|t| t.with_timezone(&Utc))
            .unwrap();
        Self {
            now,
            bookings: HashMap::new(),
            swaps: HashMap::new(),
            auctions: HashMap::new(),
            proposals: HashMap::new(),
            exclusive: HashSet::new(),
            relations: HashMap::new(),
            history: Vec::new(),
            notices: Vec::new(),
            escrows: Vec::new(),
            fail_escrow: false,
        }
    }

    pub fn advance(&mut self, by: Duration) {
        self.now += by;
    }

    pub fn add_booking(&mut self, owner_id: Uuid, check_in_days: i64) -> Uuid {
        let booking = Booking {
            id: Uuid::new_v4(),
            owner_id,
            booking_type: BookingType::Hotel,
            title: "Two nights in Porto".to_string(),
            check_in: self.now + Duration::days(check_in_days),
            check_out: self.now + Duration::days(check_in_days + 2),
            status: BookingStatus::Available,
            created_at: self.now,
        };
        let id = booking.id;
        self.bookings.insert(id, booking);
        id
    }

    pub fn create_swap(
        &mut self,
        owner_id: Uuid,
        booking_id: Uuid,
        acceptance_strategy: AcceptanceStrategy,
        payment_types: PaymentTypes,
    ) -> Result<Uuid, AppError> {
        let booking = self.bookings.get(&booking_id).ok_or_else(|| AppError::booking_not_found(booking_id))?;
        let existing = self
            .swaps
            .values()
            .find(|s| s.owner_id == owner_id && s.source_booking_id == booking_id && !s.status.is_terminal());
        let request = NewSwap {
            acceptance_strategy,
            payment_types,
        };
        let (swap, auction) = plan_new_swap(booking, owner_id, request, existing, self.now)?;
        let id = swap.id;
        self.swaps.insert(id, swap);
        if let Some(auction) = auction {
            self.auctions.insert(id, auction);
        }
        Ok(id)
    }

    /// A first-match swap over a fresh booking a month out.
    pub fn first_match(&mut self, owner_id: Uuid) -> Uuid {
        let booking = self.add_booking(owner_id, 30);
        self.create_swap(owner_id, booking, AcceptanceStrategy::FirstMatch, both_payments())
            .unwrap()
    }

    /// An auction swap closing in `end_days`, with the winner picked
    /// `auto_select_after_hours` after that.
    pub fn auction(&mut self, owner_id: Uuid, end_days: i64, auto_select_after_hours: u32) -> Uuid {
        let booking = self.add_booking(owner_id, 60);
        let strategy = AcceptanceStrategy::Auction {
            auction_end_date: self.now + Duration::days(end_days),
            auto_select_after_hours,
        };
        self.create_swap(owner_id, booking, strategy, both_payments()).unwrap()
    }

    pub fn swap(&self, id: Uuid) -> &Swap {
        &self.swaps[&id]
    }

    pub fn proposal(&self, id: Uuid) -> &Proposal {
        &self.proposals[&id]
    }

    fn load_swap(&self, id: Uuid) -> Result<Swap, AppError> {
        self.swaps.get(&id).cloned().ok_or_else(|| AppError::swap_not_found(id))
    }

    pub fn active_relations_from(&self, source_swap_id: Uuid) -> Vec<&TargetingRelation> {
        self.relations
            .values()
            .filter(|r| r.source_swap_id == source_swap_id && r.status == TargetingStatus::Active)
            .collect()
    }

    pub fn pending_against(&self, target_swap_id: Uuid) -> Vec<Proposal> {
        let mut pending: Vec<Proposal> = self
            .proposals
            .values()
            .filter(|p| p.target_swap_id == target_swap_id && p.is_pending())
            .cloned()
            .collect();
        pending.sort_by_key(|p| (p.submitted_at, p.id));
        pending
    }

    fn relation_for(&self, proposal_id: Uuid) -> Option<TargetingRelation> {
        self.relations
            .values()
            .find(|r| r.proposal_id == proposal_id)
            .cloned()
    }

    fn current_target(&self, source_swap_id: Uuid) -> Option<CurrentTarget> {
        let relation = self.active_relations_from(source_swap_id).into_iter().next()?.clone();
        let proposal = self.proposals.get(&relation.proposal_id)?.clone();
        let target = self.swaps.get(&relation.target_swap_id)?.clone();
        let other_pending = self
            .pending_against(target.id)
            .iter()
            .filter(|p| p.id != proposal.id)
            .count();
        Some(CurrentTarget {
            relation,
            proposal,
            target,
            other_pending,
        })
    }

    fn competing(&self, proposal: Proposal) -> Competing {
        Competing {
            relation: self.relation_for(proposal.id),
            source: self.swaps.get(&proposal.source_swap_id).cloned(),
            source_incoming: self.pending_against(proposal.source_swap_id).iter().map(|p| p.id).collect(),
            proposal,
        }
    }

    fn targeting_snapshot(&self, source_id: Uuid, target_id: Uuid) -> Result<TargetingSnapshot, AppError> {
        let source = self.load_swap(source_id)?;
        let target = self.load_swap(target_id)?;
        let target_pending = self
            .pending_against(target_id)
            .into_iter()
            .filter(|p| p.source_swap_id != source_id)
            .collect();
        let mutual = self
            .current_target(target_id)
            .is_some_and(|c| c.relation.target_swap_id == source_id);
        Ok(TargetingSnapshot {
            source,
            current: self.current_target(source_id),
            target_auction: self.auctions.get(&target_id).cloned(),
            target,
            target_pending,
            mutual,
        })
    }

    pub fn target(
        &mut self,
        source_id: Uuid,
        target_id: Uuid,
        user_id: Uuid,
        options: TargetOptions,
    ) -> Result<TargetingResult, AppError> {
        if source_id == target_id {
            return Err(TargetingError::CannotTargetOwnSwap.into());
        }
        let snapshot = self.targeting_snapshot(source_id, target_id)?;
        let plan = plan_target(snapshot, user_id, options, self.now)?;
        self.commit(plan.effects)?;
        Ok(plan.result)
    }

    pub fn retarget(
        &mut self,
        source_id: Uuid,
        target_id: Uuid,
        user_id: Uuid,
        options: TargetOptions,
    ) -> Result<TargetingResult, AppError> {
        if source_id == target_id {
            return Err(TargetingError::CannotTargetOwnSwap.into());
        }
        let snapshot = self.targeting_snapshot(source_id, target_id)?;
        let plan = plan_retarget(snapshot, user_id, options, self.now)?;
        self.commit(plan.effects)?;
        Ok(plan.result)
    }

    pub fn validate(&self, source_id: Uuid, target_id: Uuid, user_id: Uuid, options: &TargetOptions) -> ValidationResult {
        match self.targeting_snapshot(source_id, target_id) {
            Ok(snapshot) => evaluate(&snapshot, user_id, options.cash_offer.as_ref(), self.now),
            Err(e) => ValidationResult {
                can_target: false,
                errors: vec![e.detail()],
                warnings: Vec::new(),
            },
        }
    }

    pub fn validate_target_only(&self, target_id: Uuid, user_id: Uuid, options: &TargetOptions) -> ValidationResult {
        match self.load_swap(target_id) {
            Ok(target) => evaluate_target_only(
                &target,
                self.auctions.get(&target_id),
                &self.pending_against(target_id),
                user_id,
                options.cash_offer.as_ref(),
                self.now,
            ),
            Err(e) => ValidationResult {
                can_target: false,
                errors: vec![e.detail()],
                warnings: Vec::new(),
            },
        }
    }

    pub fn remove(&mut self, source_id: Uuid, user_id: Uuid) -> Result<(), AppError> {
        let snapshot = RemovalSnapshot {
            source: self.load_swap(source_id)?,
            current: self.current_target(source_id),
            incoming_pending: self.pending_against(source_id).len(),
        };
        let effects = plan_remove(snapshot, user_id, self.now)?;
        self.commit(effects)
    }

    pub fn accept(&mut self, proposal_id: Uuid, actor: Actor) -> Result<AcceptanceResult, AppError> {
        let proposal = self
            .proposals
            .get(&proposal_id)
            .cloned()
            .ok_or_else(|| AppError::proposal_not_found(proposal_id))?;
        let target = self.load_swap(proposal.target_swap_id)?;
        let source = self.load_swap(proposal.source_swap_id)?;
        let siblings = self
            .pending_against(target.id)
            .into_iter()
            .filter(|p| p.id != proposal_id)
            .map(|p| self.competing(p))
            .collect();
        let source_incoming = self
            .pending_against(source.id)
            .into_iter()
            .map(|p| self.competing(p))
            .collect();
        let snapshot = AcceptanceSnapshot {
            relation: self.relation_for(proposal_id),
            auction: self.auctions.get(&target.id).cloned(),
            target_outgoing: self.current_target(target.id),
            proposal,
            target,
            source,
            siblings,
            source_incoming,
        };
        let mut plan = plan_accept(snapshot, actor, self.now)?;
        let escrows_before = self.escrows.len();
        self.commit(plan.effects)?;
        if self.escrows.len() > escrows_before {
            plan.result.escrow_id = Some(format!("escrow-{}", self.escrows.len()));
        }
        Ok(plan.result)
    }

    pub fn reject(&mut self, proposal_id: Uuid, user_id: Uuid, reason: Option<&str>) -> Result<Proposal, AppError> {
        let proposal = self
            .proposals
            .get(&proposal_id)
            .cloned()
            .ok_or_else(|| AppError::proposal_not_found(proposal_id))?;
        let target = self.load_swap(proposal.target_swap_id)?;
        let other_pending = self
            .pending_against(target.id)
            .iter()
            .filter(|p| p.id != proposal_id)
            .count();
        let snapshot = RejectionSnapshot {
            relation: self.relation_for(proposal_id),
            source: self.swaps.get(&proposal.source_swap_id).cloned(),
            source_incoming: self.pending_against(proposal.source_swap_id).len(),
            proposal,
            target,
            other_pending,
        };
        let (effects, rejected) = plan_reject(snapshot, user_id, reason.map(str::to_string), self.now)?;
        self.commit(effects)?;
        Ok(rejected)
    }

    pub fn close(&mut self, swap_id: Uuid, status: SwapStatus, actor: Actor) -> Result<(), AppError> {
        let incoming = self
            .pending_against(swap_id)
            .into_iter()
            .map(|p| self.competing(p))
            .collect();
        let snapshot = ClosureSnapshot {
            swap: self.load_swap(swap_id)?,
            outgoing: self.current_target(swap_id),
            incoming,
        };
        let effects = plan_close(snapshot, status, actor, self.now)?;
        self.commit(effects)
    }

    /// One pass of the periodic sweep.
    pub fn sweep(&mut self) -> Result<(), AppError> {
        let mut ids: Vec<Uuid> = self.auctions.keys().copied().collect();
        ids.sort();

        for id in &ids {
            if !self.swap(*id).status.is_open() {
                continue;
            }
            let ended = plan_end(&self.auctions[id], self.now);
            if let Some(ended) = ended {
                self.commit(vec![Effect::SaveAuction(ended)])?;
            }
        }

        for id in &ids {
            let auction = self.auctions[id].clone();
            if !self.swap(*id).status.is_open() || phase(&auction, self.now) != AuctionPhase::SelectionDue {
                continue;
            }
            let pending = self.pending_against(*id);
            if pending.is_empty() {
                let swap = self.swap(*id).clone();
                let effects = plan_conversion(&auction, &swap, &pending, self.now)?;
                self.commit(effects)?;
                continue;
            }
            // A winner that cannot be accepted is passed over for the next one
            let mut passed_over = Vec::new();
            while let Some(winner) = select_winner(&pending, &passed_over) {
                let winner_id = winner.id;
                if self.accept(winner_id, Actor::System).is_ok() {
                    break;
                }
                passed_over.push(winner_id);
            }
        }

        let mut expired: Vec<Uuid> = self
            .swaps
            .values()
            .filter(|s| s.status.is_open() && self.bookings[&s.source_booking_id].check_in <= self.now)
            .map(|s| s.id)
            .collect();
        expired.sort();
        for id in expired {
            self.close(id, SwapStatus::Expired, Actor::System)?;
        }
        Ok(())
    }

    /// Apply effects atomically; any failure leaves the world untouched.
    pub fn commit(&mut self, effects: Vec<Effect>) -> Result<(), AppError> {
        let mut next = self.clone();
        for effect in effects {
            next.apply(effect)?;
        }
        *self = next;
        Ok(())
    }

    fn apply(&mut self, effect: Effect) -> Result<(), AppError> {
        match effect {
            Effect::InsertProposal { proposal, exclusive } => {
                let taken = exclusive
                    && self.proposals.values().any(|p| {
                        p.target_swap_id == proposal.target_swap_id
                            && p.is_pending()
                            && self.exclusive.contains(&p.id)
                    });
                if taken {
                    return Err(TargetingError::ConcurrentTargeting.into());
                }
                if exclusive {
                    self.exclusive.insert(proposal.id);
                }
                self.proposals.insert(proposal.id, proposal);
            }
            Effect::SetProposalStatus { proposal_id, status, reason, at } => {
                let proposal = self
                    .proposals
                    .get_mut(&proposal_id)
                    .ok_or_else(|| AppError::proposal_not_found(proposal_id))?;
                proposal.status = status;
                if reason.is_some() {
                    proposal.rejection_reason = reason;
                }
                proposal.responded_at = Some(at);
            }
            Effect::InsertRelation(relation) => {
                if relation.source_swap_id == relation.target_swap_id
                    || !self.active_relations_from(relation.source_swap_id).is_empty()
                {
                    return Err(TargetingError::ConcurrentTargeting.into());
                }
                self.relations.insert(relation.id, relation);
            }
            Effect::SetRelationStatus { relation_id, status, at } => {
                if let Some(relation) = self.relations.get_mut(&relation_id) {
                    relation.status = status;
                    relation.updated_at = at;
                }
            }
            Effect::SetSwapStatus { swap_id, status, at } => {
                let swap = self.swaps.get_mut(&swap_id).ok_or_else(|| AppError::swap_not_found(swap_id))?;
                swap.status = status;
                swap.updated_at = at;
            }
            Effect::SetBookingStatus { booking_id, status } => {
                if let Some(booking) = self.bookings.get_mut(&booking_id) {
                    booking.status = status;
                }
            }
            Effect::SaveAuction(auction) => {
                self.auctions.insert(auction.swap_id, auction);
            }
            Effect::ConvertToFirstMatch { swap_id, at } => {
                let swap = self.swaps.get_mut(&swap_id).ok_or_else(|| AppError::swap_not_found(swap_id))?;
                swap.acceptance_strategy = AcceptanceStrategy::FirstMatch;
                swap.updated_at = at;
            }
            Effect::AppendHistory(entry) => self.history.push(entry),
            Effect::CreateEscrow(request) => {
                if self.fail_escrow {
                    return Err(AppError::Integration {
                        service: "payment",
                        message: "escrow declined".to_string(),
                    });
                }
                self.escrows.push(request);
            }
            Effect::Notify(notice) => self.notices.push(notice),
            Effect::Notarize(_) => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProposalPayload, TargetingAction};

    fn user() -> Uuid {
        Uuid::new_v4()
    }

    fn pending_count(world: &World, target: Uuid) -> usize {
        world.pending_against(target).len()
    }

    #[test]
    fn test_first_match_allows_one_pending_proposal() {
        let mut world = World::new();
        let (a, b, c) = (user(), user(), user());
        let sa = world.first_match(a);
        let sb = world.first_match(b);
        let sc = world.first_match(c);

        let result = world.target(sa, sb, a, TargetOptions::default()).unwrap();
        assert_eq!(world.swap(sb).status, SwapStatus::ProposalPending);
        assert_eq!(world.swap(sa).status, SwapStatus::Targeting);
        assert!(matches!(result.proposal.payload, ProposalPayload::Booking { .. }));

        let before = world.swap(sb).clone();
        let err = world.target(sc, sb, c, TargetOptions::default()).unwrap_err();
        assert_eq!(err.code(), "PROPOSAL_PENDING");
        assert_eq!(world.swap(sb), &before);
        assert_eq!(pending_count(&world, sb), 1);
        assert_eq!(world.swap(sc).status, SwapStatus::Active);
    }

    #[test]
    fn test_pending_check_holds_even_if_rules_are_skipped() {
        let mut world = World::new();
        let (a, b, c) = (user(), user(), user());
        let sa = world.first_match(a);
        let sb = world.first_match(b);
        let sc = world.first_match(c);
        world.target(sa, sb, a, TargetOptions::default()).unwrap();

        // Two racing writers decided against the same stale snapshot
        let mut stale = world.clone();
        stale.proposals.clear();
        let snapshot = stale.targeting_snapshot(sc, sb).unwrap();
        let plan = plan_target(snapshot, c, TargetOptions::default(), world.now).unwrap();
        let err = world.commit(plan.effects).unwrap_err();
        assert_eq!(err.code(), "CONCURRENT_TARGETING");
        assert_eq!(pending_count(&world, sb), 1);
    }

    #[test]
    fn test_self_target_always_fails() {
        let mut world = World::new();
        let a = user();
        let first = world.first_match(a);
        let auction = world.auction(a, 10, 24);
        let other = world.first_match(a);

        for swap in [first, auction] {
            let err = world.target(swap, swap, a, TargetOptions::default()).unwrap_err();
            assert_eq!(err.code(), "CANNOT_TARGET_OWN_SWAP");
            // Even when someone else asks
            let err = world.target(swap, swap, user(), TargetOptions::default()).unwrap_err();
            assert_eq!(err.code(), "CANNOT_TARGET_OWN_SWAP");
        }

        // Another swap of the same owner counts as self-targeting too
        let err = world.target(first, other, a, TargetOptions::default()).unwrap_err();
        assert_eq!(err.code(), "CANNOT_TARGET_OWN_SWAP");
        assert!(world.relations.is_empty());
    }

    #[test]
    fn test_one_active_relation_per_source() {
        let mut world = World::new();
        let a = user();
        let sa = world.first_match(a);
        let targets: Vec<Uuid> = (0..4).map(|_| world.auction(user(), 10, 24)).collect();

        for target in &targets {
            world.target(sa, *target, a, TargetOptions::default()).unwrap();
            assert_eq!(world.active_relations_from(sa).len(), 1);
        }
        assert_eq!(world.active_relations_from(sa)[0].target_swap_id, targets[3]);

        let cancelled = world
            .proposals
            .values()
            .filter(|p| p.source_swap_id == sa && p.status == ProposalStatus::Cancelled)
            .count();
        assert_eq!(cancelled, 3);
    }

    #[test]
    fn test_retarget_cancels_old_and_creates_one_new() {
        let mut world = World::new();
        let (a, b, c) = (user(), user(), user());
        let sa = world.first_match(a);
        let sb = world.first_match(b);
        let sc = world.first_match(c);

        let first = world.target(sa, sb, a, TargetOptions::default()).unwrap();
        let second = world.retarget(sa, sc, a, TargetOptions::default()).unwrap();
        assert_eq!(second.previous_target_swap_id, Some(sb));
        assert_eq!(second.cancelled_proposal_id, Some(first.proposal.id));

        let mine: Vec<&Proposal> = world.proposals.values().filter(|p| p.proposer_id == a).collect();
        let cancelled: Vec<_> = mine.iter().filter(|p| p.status == ProposalStatus::Cancelled).collect();
        let pending: Vec<_> = mine.iter().filter(|p| p.is_pending()).collect();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].target_swap_id, sb);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].target_swap_id, sc);

        // The old target is free again and its owner was told
        assert_eq!(world.swap(sb).status, SwapStatus::Active);
        assert_eq!(world.swap(sc).status, SwapStatus::ProposalPending);
        assert!(world.notices.iter().any(|n| matches!(
            n,
            Notice::ProposalCancelled { recipient_id, target_swap_id, .. }
                if *recipient_id == b && *target_swap_id == sb
        )));
        assert!(world.history.iter().any(|h| h.action == TargetingAction::Retargeted));
    }

    #[test]
    fn test_failed_retarget_keeps_previous_target() {
        let mut world = World::new();
        let (a, b, c, d) = (user(), user(), user(), user());
        let sa = world.first_match(a);
        let sb = world.first_match(b);
        let sc = world.first_match(c);
        let sd = world.first_match(d);
        world.target(sd, sc, d, TargetOptions::default()).unwrap();
        let original = world.target(sa, sb, a, TargetOptions::default()).unwrap();

        let err = world.retarget(sa, sc, a, TargetOptions::default()).unwrap_err();
        assert_eq!(err.code(), "PROPOSAL_PENDING");
        assert!(world.proposal(original.proposal.id).is_pending());
        assert_eq!(world.active_relations_from(sa)[0].target_swap_id, sb);
        assert_eq!(world.swap(sb).status, SwapStatus::ProposalPending);
    }

    #[test]
    fn test_retarget_without_target_fails() {
        let mut world = World::new();
        let (a, b) = (user(), user());
        let sa = world.first_match(a);
        let sb = world.first_match(b);
        let err = world.retarget(sa, sb, a, TargetOptions::default()).unwrap_err();
        assert_eq!(err.code(), "NO_ACTIVE_TARGET");
    }

    #[test]
    fn test_remove_then_target_round_trip() {
        let mut world = World::new();
        let (a, b) = (user(), user());
        let sa = world.first_match(a);
        let sb = world.first_match(b);

        let first = world.target(sa, sb, a, TargetOptions::default()).unwrap();
        world.remove(sa, a).unwrap();
        assert!(world.active_relations_from(sa).is_empty());
        assert_eq!(world.swap(sa).status, SwapStatus::Active);
        assert_eq!(world.swap(sb).status, SwapStatus::Active);
        assert_eq!(world.proposal(first.proposal.id).status, ProposalStatus::Cancelled);

        let second = world.target(sa, sb, a, TargetOptions::default()).unwrap();
        let (r1, r2) = (&first.relation, &second.relation);
        assert_eq!(
            (r1.source_swap_id, r1.target_swap_id, r1.status),
            (r2.source_swap_id, r2.target_swap_id, r2.status)
        );
        assert_eq!(first.proposal.payload, second.proposal.payload);
        assert_ne!(r1.id, r2.id);
        assert_eq!(world.active_relations_from(sa).len(), 1);

        let err = world.remove(sa, user()).unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");
    }

    /// `sb` targets `sc` when `sa`'s proposal lands on it. Returns the
    /// owners, the swaps and the incoming proposal.
    fn targeting_with_incoming(world: &mut World) -> ([Uuid; 3], [Uuid; 3], Uuid) {
        let (a, b, c) = (user(), user(), user());
        let sa = world.first_match(a);
        let sb = world.first_match(b);
        let sc = world.first_match(c);
        world.target(sb, sc, b, TargetOptions::default()).unwrap();
        let incoming = world.target(sa, sb, a, TargetOptions::default()).unwrap().proposal.id;
        assert_eq!(world.swap(sb).status, SwapStatus::Targeting);
        ([a, b, c], [sa, sb, sc], incoming)
    }

    #[test]
    fn test_released_source_with_incoming_proposal_stays_pending() {
        let mut world = World::new();
        let ([_, b, c], [_, sb, sc], incoming) = targeting_with_incoming(&mut world);
        world.remove(sb, b).unwrap();
        assert_eq!(world.swap(sb).status, SwapStatus::ProposalPending);
        assert_eq!(world.swap(sc).status, SwapStatus::Active);
        let err = world.target(sc, sb, c, TargetOptions::default()).unwrap_err();
        assert_eq!(err.code(), "PROPOSAL_PENDING");

        world.reject(incoming, b, None).unwrap();
        assert_eq!(world.swap(sb).status, SwapStatus::Active);

        // Rejected by the swap it pointed at
        let ([_, _, c], [_, sb, _], _) = targeting_with_incoming(&mut world);
        let outgoing = world.active_relations_from(sb)[0].proposal_id;
        world.reject(outgoing, c, None).unwrap();
        assert_eq!(world.swap(sb).status, SwapStatus::ProposalPending);

        // The swap it pointed at was taken off the market
        let ([_, _, c], [_, sb, sc], _) = targeting_with_incoming(&mut world);
        world.close(sc, SwapStatus::Cancelled, Actor::User(c)).unwrap();
        assert_eq!(world.swap(sb).status, SwapStatus::ProposalPending);

        // Outbid on an auction
        let (a, b, owner, rival) = (user(), user(), user(), user());
        let sa = world.first_match(a);
        let sb = world.first_match(b);
        let auction = world.auction(owner, 10, 24);
        world.target(sb, auction, b, cash(100.0)).unwrap();
        world.target(sa, sb, a, TargetOptions::default()).unwrap();
        let sr = world.first_match(rival);
        let winner = world.target(sr, auction, rival, cash(200.0)).unwrap().proposal.id;
        world.accept(winner, Actor::User(owner)).unwrap();
        assert_eq!(world.swap(sb).status, SwapStatus::ProposalPending);
    }

    #[test]
    fn test_remove_without_target_fails() {
        let mut world = World::new();
        let a = user();
        let sa = world.first_match(a);
        assert_eq!(world.remove(sa, a).unwrap_err().code(), "NO_ACTIVE_TARGET");
    }

    #[test]
    fn test_targeting_same_swap_twice() {
        let mut world = World::new();
        let (a, b) = (user(), user());
        let sa = world.first_match(a);
        let sb = world.auction(b, 10, 24);
        world.target(sa, sb, a, TargetOptions::default()).unwrap();
        let err = world.target(sa, sb, a, TargetOptions::default()).unwrap_err();
        assert_eq!(err.code(), "ALREADY_TARGETED");
    }

    #[test]
    fn test_auction_accept_rejects_every_sibling() {
        for n in 2..=5 {
            let mut world = World::new();
            let owner = user();
            let sb = world.auction(owner, 10, 24);
            let mut ids = Vec::new();
            for i in 0..n {
                let bidder = user();
                let source = world.first_match(bidder);
                let result = world.target(source, sb, bidder, cash(100.0 + i as f64)).unwrap();
                ids.push(result.proposal.id);
                world.advance(Duration::minutes(1));
            }
            assert_eq!(pending_count(&world, sb), n);
            assert_eq!(world.swap(sb).status, SwapStatus::Active);

            let winner = ids[0];
            let result = world.accept(winner, Actor::User(owner)).unwrap();
            assert_eq!(result.rejected_proposal_ids.len(), n - 1);
            assert_eq!(world.proposal(winner).status, ProposalStatus::Accepted);
            for id in &ids[1..] {
                let loser = world.proposal(*id);
                assert_eq!(loser.status, ProposalStatus::Rejected);
                assert_eq!(world.swap(loser.source_swap_id).status, SwapStatus::Active);
            }
            let auction = &world.auctions[&sb];
            assert_eq!(auction.status, AuctionStatus::Resolved);
            assert_eq!(auction.winning_proposal_id, Some(winner));
            assert!(!auction.auto_selected);
            assert_eq!(world.swap(sb).status, SwapStatus::Accepted);
        }
    }

    #[test]
    fn test_accepting_highest_cash_bid() {
        let mut world = World::new();
        let (owner, d, e) = (user(), user(), user());
        let sb = world.auction(owner, 10, 24);
        let sd = world.first_match(d);
        let se = world.first_match(e);
        let p1 = world.target(sd, sb, d, cash(200.0)).unwrap().proposal.id;
        let p2 = world.target(se, sb, e, cash(350.0)).unwrap().proposal.id;

        let result = world.accept(p2, Actor::User(owner)).unwrap();
        assert_eq!(world.proposal(p2).status, ProposalStatus::Accepted);
        assert_eq!(world.proposal(p1).status, ProposalStatus::Rejected);
        let auction = &world.auctions[&sb];
        assert_eq!(auction.status, AuctionStatus::Resolved);
        assert_eq!(auction.winning_proposal_id, Some(p2));
        assert_eq!(auction.ended_at, Some(world.now));

        assert!(result.escrow_id.is_some());
        assert_eq!(world.escrows.len(), 1);
        assert_eq!(world.escrows[0].payee_id, owner);
        let booking = world.swap(sb).source_booking_id;
        assert_eq!(world.bookings[&booking].status, BookingStatus::SaleInProgress);
        // A cash buyer keeps their own listing
        assert_eq!(world.swap(se).status, SwapStatus::Active);
    }

    #[test]
    fn test_escrow_failure_rolls_back_accept() {
        let mut world = World::new();
        let (owner, d) = (user(), user());
        let sb = world.first_match(owner);
        let sd = world.first_match(d);
        let p = world.target(sd, sb, d, cash(150.0)).unwrap().proposal.id;

        world.fail_escrow = true;
        let err = world.accept(p, Actor::User(owner)).unwrap_err();
        assert_eq!(err.code(), "INTEGRATION_ERROR");
        assert!(world.proposal(p).is_pending());
        assert_eq!(world.swap(sb).status, SwapStatus::ProposalPending);
    }

    #[test]
    fn test_booking_exchange_accept() {
        let mut world = World::new();
        let (a, b, c) = (user(), user(), user());
        let sa = world.first_match(a);
        let sb = world.first_match(b);
        // Someone is also bidding on A's swap
        let sx = world.first_match(c);
        let incoming = world.target(sx, sa, c, TargetOptions::default()).unwrap().proposal.id;

        let p = world.target(sa, sb, a, TargetOptions::default()).unwrap().proposal.id;
        world.accept(p, Actor::User(b)).unwrap();

        assert_eq!(world.swap(sa).status, SwapStatus::Accepted);
        assert_eq!(world.swap(sb).status, SwapStatus::Accepted);
        for swap in [sa, sb] {
            let booking = world.swap(swap).source_booking_id;
            assert_eq!(world.bookings[&booking].status, BookingStatus::SwapInProgress);
        }
        assert_eq!(world.proposal(incoming).status, ProposalStatus::Rejected);
        assert_eq!(world.swap(sx).status, SwapStatus::Active);
        assert!(world.escrows.is_empty());
    }

    #[test]
    fn test_accept_is_not_applied_twice() {
        let mut world = World::new();
        let (a, b) = (user(), user());
        let sa = world.first_match(a);
        let sb = world.auction(b, 10, 24);
        let p = world.target(sa, sb, a, TargetOptions::default()).unwrap().proposal.id;

        world.accept(p, Actor::User(b)).unwrap();
        let history_len = world.history.len();
        let err = world.accept(p, Actor::User(b)).unwrap_err();
        assert_eq!(err.code(), "PROPOSAL_NOT_PENDING");
        assert_eq!(world.history.len(), history_len);
    }

    #[test]
    fn test_accept_rejected_proposal_fails() {
        let mut world = World::new();
        let (a, b) = (user(), user());
        let sa = world.first_match(a);
        let sb = world.first_match(b);
        let p = world.target(sa, sb, a, TargetOptions::default()).unwrap().proposal.id;
        world.reject(p, b, Some("dates don't work")).unwrap();
        let err = world.accept(p, Actor::User(b)).unwrap_err();
        assert_eq!(err.code(), "PROPOSAL_NOT_PENDING");
    }

    #[test]
    fn test_only_target_owner_can_accept_or_reject() {
        let mut world = World::new();
        let (a, b) = (user(), user());
        let sa = world.first_match(a);
        let sb = world.first_match(b);
        let p = world.target(sa, sb, a, TargetOptions::default()).unwrap().proposal.id;
        assert_eq!(world.accept(p, Actor::User(a)).unwrap_err().code(), "FORBIDDEN");
        assert_eq!(world.reject(p, a, None).unwrap_err().code(), "FORBIDDEN");
        assert!(world.proposal(p).is_pending());
    }

    #[test]
    fn test_reject_frees_both_swaps_but_keeps_auction_running() {
        let mut world = World::new();
        let (a, b, c) = (user(), user(), user());
        let sa = world.first_match(a);
        let sb = world.first_match(b);
        let p = world.target(sa, sb, a, TargetOptions::default()).unwrap().proposal.id;

        let rejected = world.reject(p, b, Some("Not my dates")).unwrap();
        assert_eq!(rejected.rejection_reason.as_deref(), Some("Not my dates"));
        assert_eq!(world.swap(sa).status, SwapStatus::Active);
        assert_eq!(world.swap(sb).status, SwapStatus::Active);
        assert!(world.active_relations_from(sa).is_empty());
        assert!(world.notices.iter().any(|n| matches!(
            n,
            Notice::ProposalRejected { recipient_id, reason: Some(r), .. } if *recipient_id == a && r == "Not my dates"
        )));

        let auction = world.auction(c, 10, 24);
        let p = world.target(sa, auction, a, TargetOptions::default()).unwrap().proposal.id;
        world.reject(p, c, None).unwrap();
        assert_eq!(world.auctions[&auction].status, AuctionStatus::Active);
        // Free to target elsewhere again
        world.target(sa, sb, a, TargetOptions::default()).unwrap();
    }

    #[test]
    fn test_mutual_targeting_is_allowed() {
        let mut world = World::new();
        let (a, b) = (user(), user());
        let sa = world.auction(a, 10, 24);
        let sb = world.auction(b, 10, 24);

        world.target(sa, sb, a, TargetOptions::default()).unwrap();
        let report = world.validate(sb, sa, b, &TargetOptions::default());
        assert!(report.can_target);
        assert!(report.warnings.iter().any(|w| w.contains("already targeting")));

        let back = world.target(sb, sa, b, TargetOptions::default()).unwrap();
        assert_eq!(world.active_relations_from(sa).len(), 1);
        assert_eq!(world.active_relations_from(sb).len(), 1);

        // Accepting one side closes the other side's proposal
        world.accept(back.proposal.id, Actor::User(a)).unwrap();
        let outgoing = world
            .proposals
            .values()
            .find(|p| p.source_swap_id == sa)
            .unwrap();
        assert_eq!(outgoing.status, ProposalStatus::Cancelled);
        assert_eq!(world.swap(sa).status, SwapStatus::Accepted);
        assert_eq!(world.swap(sb).status, SwapStatus::Accepted);
    }

    #[test]
    fn test_validation_matches_mutation() {
        let mut world = World::new();
        let (a, b, c) = (user(), user(), user());
        let sa = world.first_match(a);
        let sb = world.first_match(b);
        let sc = world.first_match(c);
        world.target(sa, sb, a, TargetOptions::default()).unwrap();

        let report = world.validate(sc, sb, c, &TargetOptions::default());
        let err = world.target(sc, sb, c, TargetOptions::default()).unwrap_err();
        assert!(!report.can_target);
        assert_eq!(report.errors[0].code, err.code());

        let report = world.validate(sc, sa, c, &cash(50.0));
        assert!(report.can_target);
        assert!(world.target(sc, sa, c, cash(50.0)).is_ok());
    }

    #[test]
    fn test_payment_rules() {
        let mut world = World::new();
        let (a, b) = (user(), user());
        let sa = world.first_match(a);
        let booking = world.add_booking(b, 30);
        let cash_only = PaymentTypes {
            booking_exchange: false,
            cash_payment: true,
            minimum_cash_amount: Some(300.0),
            preferred_cash_amount: Some(500.0),
        };
        let sb = world
            .create_swap(b, booking, AcceptanceStrategy::FirstMatch, cash_only)
            .unwrap();

        let err = world.target(sa, sb, a, TargetOptions::default()).unwrap_err();
        assert_eq!(err.code(), "PAYMENT_TYPE_NOT_ACCEPTED");
        let err = world.target(sa, sb, a, cash(250.0)).unwrap_err();
        assert_eq!(err.code(), "CASH_OFFER_BELOW_MINIMUM");

        let report = world.validate(sa, sb, a, &cash(400.0));
        assert!(report.can_target);
        assert!(report.warnings.iter().any(|w| w.contains("preferred")));
    }

    #[test]
    fn test_cash_only_target_checks_agree_with_targeting() {
        let mut world = World::new();
        let (a, b) = (user(), user());
        let sa = world.first_match(a);
        let booking = world.add_booking(b, 30);
        let cash_only = PaymentTypes {
            booking_exchange: false,
            cash_payment: true,
            minimum_cash_amount: Some(300.0),
            preferred_cash_amount: Some(500.0),
        };
        let sb = world
            .create_swap(b, booking, AcceptanceStrategy::FirstMatch, cash_only)
            .unwrap();

        // Booking exchange: both checks refuse, and so does targeting
        let err = world.clone().target(sa, sb, a, TargetOptions::default()).unwrap_err();
        for report in [
            world.validate(sa, sb, a, &TargetOptions::default()),
            world.validate_target_only(sb, a, &TargetOptions::default()),
        ] {
            assert!(!report.can_target);
            assert_eq!(report.errors[0].code, err.code());
        }

        // Under the minimum: refused the same way
        let err = world.clone().target(sa, sb, a, cash(250.0)).unwrap_err();
        assert_eq!(err.code(), "CASH_OFFER_BELOW_MINIMUM");
        assert_eq!(world.validate_target_only(sb, a, &cash(250.0)).errors[0].code, err.code());

        // Valid cash: both checks allow it and warn about the preferred amount
        for report in [world.validate(sa, sb, a, &cash(350.0)), world.validate_target_only(sb, a, &cash(350.0))] {
            assert!(report.can_target);
            assert!(report.warnings.iter().any(|w| w.contains("preferred")));
        }
        assert!(world.target(sa, sb, a, cash(350.0)).is_ok());
    }

    #[test]
    fn test_auction_closed_after_end_date() {
        let mut world = World::new();
        let (a, b) = (user(), user());
        let sa = world.first_match(a);
        let sb = world.auction(b, 5, 24);
        world.advance(Duration::days(5));
        // Not swept yet, the end date alone closes it
        let err = world.target(sa, sb, a, TargetOptions::default()).unwrap_err();
        assert_eq!(err.code(), "AUCTION_ENDED");
        world.sweep().unwrap();
        assert_eq!(world.auctions[&sb].status, AuctionStatus::Ended);
        let err = world.target(sa, sb, a, TargetOptions::default()).unwrap_err();
        assert_eq!(err.code(), "AUCTION_ENDED");
    }

    #[test]
    fn test_last_minute_auction_rejected_at_creation() {
        let mut world = World::new();
        let b = user();
        let booking = world.add_booking(b, 3);
        let strategy = AcceptanceStrategy::Auction {
            auction_end_date: world.now + Duration::days(5),
            auto_select_after_hours: 24,
        };
        let err = world.create_swap(b, booking, strategy, both_payments()).unwrap_err();
        assert_eq!(err.code(), "LAST_MINUTE_RESTRICTION");
        assert!(world.swaps.is_empty());
    }

    #[test]
    fn test_empty_auction_converts_to_first_match() {
        let mut world = World::new();
        let b = user();
        let sb = world.auction(b, 5, 24);

        world.advance(Duration::days(5));
        world.sweep().unwrap();
        assert_eq!(world.auctions[&sb].status, AuctionStatus::Ended);

        world.advance(Duration::hours(23));
        world.sweep().unwrap();
        assert_eq!(world.auctions[&sb].status, AuctionStatus::Ended);

        world.advance(Duration::hours(1));
        world.sweep().unwrap();
        let auction = &world.auctions[&sb];
        assert_eq!(auction.status, AuctionStatus::Converted);
        assert!(auction.winning_proposal_id.is_none());
        assert_eq!(world.swap(sb).acceptance_strategy, AcceptanceStrategy::FirstMatch);
        assert_eq!(world.swap(sb).status, SwapStatus::Active);

        // Running again changes nothing
        let snapshot = world.clone();
        world.sweep().unwrap();
        assert_eq!(world.auctions, snapshot.auctions);
        assert_eq!(world.history.len(), snapshot.history.len());

        // and it now takes first-match proposals
        let a = user();
        let sa = world.first_match(a);
        world.target(sa, sb, a, TargetOptions::default()).unwrap();
        assert_eq!(world.swap(sb).status, SwapStatus::ProposalPending);
    }

    #[test]
    fn test_sweep_auto_selects_best_offer() {
        let mut world = World::new();
        let owner = user();
        let sb = world.auction(owner, 5, 12);
        let bidders: Vec<(Uuid, Uuid)> = (0..3)
            .map(|_| {
                let bidder = user();
                (bidder, world.first_match(bidder))
            })
            .collect();
        let low = world.target(bidders[0].1, sb, bidders[0].0, cash(300.0)).unwrap().proposal.id;
        world.advance(Duration::hours(1));
        let early = world.target(bidders[1].1, sb, bidders[1].0, cash(450.0)).unwrap().proposal.id;
        world.advance(Duration::hours(1));
        let late = world.target(bidders[2].1, sb, bidders[2].0, cash(450.0)).unwrap().proposal.id;

        world.advance(Duration::days(5));
        world.sweep().unwrap();
        world.advance(Duration::hours(12));
        world.sweep().unwrap();

        let auction = &world.auctions[&sb];
        assert_eq!(auction.status, AuctionStatus::Resolved);
        assert_eq!(auction.winning_proposal_id, Some(early));
        assert!(auction.auto_selected);
        assert_eq!(world.proposal(low).status, ProposalStatus::Rejected);
        assert_eq!(world.proposal(late).status, ProposalStatus::Rejected);

        let accepted = world
            .history
            .iter()
            .find(|h| h.action == TargetingAction::Accepted)
            .unwrap();
        assert!(accepted.actor_id.is_none());
    }

    #[test]
    fn test_sweep_passes_over_winner_whose_escrow_fails() {
        let mut world = World::new();
        let owner = user();
        let sb = world.auction(owner, 5, 12);
        let (x, y) = (user(), user());
        let sx = world.first_match(x);
        let sy = world.first_match(y);
        let top_cash = world.target(sx, sb, x, cash(900.0)).unwrap().proposal.id;
        let exchange = world.target(sy, sb, y, TargetOptions::default()).unwrap().proposal.id;

        world.fail_escrow = true;
        world.advance(Duration::days(5));
        world.sweep().unwrap();
        world.advance(Duration::hours(12));
        world.sweep().unwrap();

        let auction = &world.auctions[&sb];
        assert_eq!(auction.status, AuctionStatus::Resolved);
        assert_eq!(auction.winning_proposal_id, Some(exchange));
        assert!(auction.auto_selected);
        assert_eq!(world.proposal(top_cash).status, ProposalStatus::Rejected);
        assert!(world.escrows.is_empty());
    }

    #[test]
    fn test_sweep_keeps_auction_when_no_winner_can_be_accepted() {
        let mut world = World::new();
        let owner = user();
        let sb = world.auction(owner, 5, 12);
        let x = user();
        let sx = world.first_match(x);
        let bid = world.target(sx, sb, x, cash(400.0)).unwrap().proposal.id;

        world.fail_escrow = true;
        world.advance(Duration::days(5));
        world.sweep().unwrap();
        world.advance(Duration::hours(12));
        world.sweep().unwrap();

        // Nothing applied, the sweep itself did not fail
        assert_eq!(world.auctions[&sb].status, AuctionStatus::Ended);
        assert!(world.proposal(bid).is_pending());

        // Recovers once escrow works again
        world.fail_escrow = false;
        world.sweep().unwrap();
        assert_eq!(world.auctions[&sb].winning_proposal_id, Some(bid));
        assert_eq!(world.escrows.len(), 1);
    }

    #[test]
    fn test_owner_can_pick_winner_after_end() {
        let mut world = World::new();
        let (owner, a) = (user(), user());
        let sb = world.auction(owner, 5, 24);
        let sa = world.first_match(a);
        let p = world.target(sa, sb, a, TargetOptions::default()).unwrap().proposal.id;

        world.advance(Duration::days(5));
        world.sweep().unwrap();
        world.accept(p, Actor::User(owner)).unwrap();
        assert_eq!(world.auctions[&sb].status, AuctionStatus::Resolved);
        assert_eq!(world.auctions[&sb].ended_at, Some(world.now));

        world.advance(Duration::days(2));
        world.sweep().unwrap();
        assert_eq!(world.auctions[&sb].winning_proposal_id, Some(p));
    }

    #[test]
    fn test_cancel_swap_withdraws_everything() {
        let mut world = World::new();
        let (a, b, c) = (user(), user(), user());
        let sa = world.first_match(a);
        let sb = world.first_match(b);
        let sc = world.auction(c, 10, 24);
        let incoming = world.target(sb, sa, b, TargetOptions::default()).unwrap().proposal.id;
        let outgoing = world.target(sa, sc, a, TargetOptions::default()).unwrap().proposal.id;
        assert_eq!(world.swap(sa).status, SwapStatus::ProposalPending);

        assert_eq!(world.close(sa, SwapStatus::Cancelled, Actor::User(b)).unwrap_err().code(), "FORBIDDEN");
        world.close(sa, SwapStatus::Cancelled, Actor::User(a)).unwrap();

        assert_eq!(world.swap(sa).status, SwapStatus::Cancelled);
        assert_eq!(world.proposal(incoming).status, ProposalStatus::Cancelled);
        assert_eq!(world.proposal(outgoing).status, ProposalStatus::Cancelled);
        assert_eq!(world.swap(sb).status, SwapStatus::Active);
        assert!(world.active_relations_from(sa).is_empty());
        assert!(world.active_relations_from(sb).is_empty());

        let err = world.close(sa, SwapStatus::Cancelled, Actor::User(a)).unwrap_err();
        assert_eq!(err.code(), "SWAP_NOT_OPEN");
        let err = world.target(sb, sa, b, TargetOptions::default()).unwrap_err();
        assert_eq!(err.code(), "TARGET_SWAP_UNAVAILABLE");
    }

    #[test]
    fn test_relisting_after_cancel() {
        let mut world = World::new();
        let a = user();
        let booking = world.add_booking(a, 30);
        let first = world
            .create_swap(a, booking, AcceptanceStrategy::FirstMatch, both_payments())
            .unwrap();
        let err = world
            .create_swap(a, booking, AcceptanceStrategy::FirstMatch, both_payments())
            .unwrap_err();
        assert_eq!(err.code(), "SWAP_ALREADY_EXISTS");

        world.close(first, SwapStatus::Cancelled, Actor::User(a)).unwrap();
        assert!(world
            .create_swap(a, booking, AcceptanceStrategy::FirstMatch, both_payments())
            .is_ok());
    }

    #[test]
    fn test_sweep_expires_swaps_past_check_in() {
        let mut world = World::new();
        let (a, b) = (user(), user());
        let sa = world.first_match(a);
        let booking = world.add_booking(b, 45);
        let sb = world
            .create_swap(b, booking, AcceptanceStrategy::FirstMatch, both_payments())
            .unwrap();
        let p = world.target(sa, sb, a, TargetOptions::default()).unwrap().proposal.id;

        world.advance(Duration::days(30));
        world.sweep().unwrap();
        assert_eq!(world.swap(sa).status, SwapStatus::Expired);
        assert_eq!(world.proposal(p).status, ProposalStatus::Cancelled);
        assert_eq!(world.swap(sb).status, SwapStatus::Active);
        assert!(world.notices.iter().any(|n| matches!(
            n,
            Notice::SwapExpired { swap_id, .. } if *swap_id == sa
        )));

        let history_len = world.history.len();
        world.sweep().unwrap();
        assert_eq!(world.history.len(), history_len);
    }
}
