//! Effects produced by the state machine
//!
//! The decide functions never touch storage. They return an ordered list of
//! effects; the service layer applies the storage ones inside the request's
//! transaction and hands the deferred ones (notifications, notarization) to
//! the sinks after commit.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{
    Auction, BookingStatus, CashOffer, Proposal, ProposalStatus, SwapStatus, TargetingAction,
    TargetingHistoryEntry, TargetingRelation, TargetingStatus,
};

/// Who performed a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    User(Uuid),
    /// The periodic sweep.
    System,
}

impl Actor {
    pub fn user_id(self) -> Option<Uuid> {
        match self {
            Self::User(id) => Some(id),
            Self::System => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    InsertProposal {
        proposal: Proposal,
        /// Target is first-match: at most one such proposal may be pending.
        exclusive: bool,
    },
    SetProposalStatus {
        proposal_id: Uuid,
        status: ProposalStatus,
        reason: Option<String>,
        at: DateTime<Utc>,
    },
    InsertRelation(TargetingRelation),
    SetRelationStatus {
        relation_id: Uuid,
        status: TargetingStatus,
        at: DateTime<Utc>,
    },
    SetSwapStatus {
        swap_id: Uuid,
        status: SwapStatus,
        at: DateTime<Utc>,
    },
    SetBookingStatus {
        booking_id: Uuid,
        status: BookingStatus,
    },
    SaveAuction(Auction),
    ConvertToFirstMatch {
        swap_id: Uuid,
        at: DateTime<Utc>,
    },
    AppendHistory(TargetingHistoryEntry),
    /// Critical: failure aborts the transaction.
    CreateEscrow(EscrowRequest),
    Notify(Notice),
    Notarize(LedgerRecord),
}

impl Effect {
    pub fn history(
        source_swap_id: Uuid,
        target_swap_id: Uuid,
        proposal_id: Option<Uuid>,
        action: TargetingAction,
        actor: Actor,
        metadata: serde_json::Value,
        at: DateTime<Utc>,
    ) -> Self {
        Effect::AppendHistory(TargetingHistoryEntry {
            id: Uuid::new_v4(),
            source_swap_id,
            target_swap_id,
            proposal_id,
            action,
            actor_id: actor.user_id(),
            metadata,
            created_at: at,
        })
    }

    pub fn swap_status(swap_id: Uuid, status: SwapStatus, at: DateTime<Utc>) -> Self {
        Effect::SetSwapStatus { swap_id, status, at }
    }
}

/// Funds to hold for an accepted cash proposal
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowRequest {
    pub proposal_id: Uuid,
    pub payer_id: Uuid,
    pub payee_id: Uuid,
    pub offer: CashOffer,
}

/// Message for the notification service
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
    #[serde(rename_all = "camelCase")]
    ProposalReceived {
        recipient_id: Uuid,
        proposal_id: Uuid,
        source_swap_id: Uuid,
        target_swap_id: Uuid,
    },
    #[serde(rename_all = "camelCase")]
    ProposalCancelled {
        recipient_id: Uuid,
        proposal_id: Uuid,
        target_swap_id: Uuid,
    },
    #[serde(rename_all = "camelCase")]
    ProposalAccepted {
        recipient_id: Uuid,
        proposal_id: Uuid,
        target_swap_id: Uuid,
    },
    #[serde(rename_all = "camelCase")]
    ProposalRejected {
        recipient_id: Uuid,
        proposal_id: Uuid,
        target_swap_id: Uuid,
        reason: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    AuctionConverted { recipient_id: Uuid, swap_id: Uuid },
    #[serde(rename_all = "camelCase")]
    SwapExpired { recipient_id: Uuid, swap_id: Uuid },
}

impl Notice {
    pub fn recipient(&self) -> Uuid {
        match self {
            Self::ProposalReceived { recipient_id, .. }
            | Self::ProposalCancelled { recipient_id, .. }
            | Self::ProposalAccepted { recipient_id, .. }
            | Self::ProposalRejected { recipient_id, .. }
            | Self::AuctionConverted { recipient_id, .. }
            | Self::SwapExpired { recipient_id, .. } => *recipient_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProposalReceived { .. } => "proposal_received",
            Self::ProposalCancelled { .. } => "proposal_cancelled",
            Self::ProposalAccepted { .. } => "proposal_accepted",
            Self::ProposalRejected { .. } => "proposal_rejected",
            Self::AuctionConverted { .. } => "auction_converted",
            Self::SwapExpired { .. } => "swap_expired",
        }
    }
}

/// Entry for the append-only notarization log
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRecord {
    pub event: &'static str,
    pub swap_id: Uuid,
    pub proposal_id: Option<Uuid>,
    pub payload: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}
