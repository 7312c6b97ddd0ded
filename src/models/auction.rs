//! Auction sub-state of auction-mode swaps, and acceptance results

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::proposal::Proposal;

text_enum! {
    pub enum AuctionStatus {
        Active => "active",
        Ended => "ended",
        Resolved => "resolved",
        Converted => "converted",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Auction {
    pub swap_id: Uuid,
    pub end_date: DateTime<Utc>,
    pub auto_select_after_hours: u32,
    pub status: AuctionStatus,
    pub winning_proposal_id: Option<Uuid>,
    pub auto_selected: bool,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Auction {
    /// Whether new proposals may still be submitted at `now`.
    pub fn accepts_proposals(&self, now: DateTime<Utc>) -> bool {
        self.status == AuctionStatus::Active && now < self.end_date
    }

    /// Moment after which the sweep picks a winner on the owner's behalf.
    pub fn selection_deadline(&self) -> Option<DateTime<Utc>> {
        self.ended_at
            .map(|ended| ended + Duration::hours(i64::from(self.auto_select_after_hours)))
    }

    pub fn is_settled(&self) -> bool {
        matches!(self.status, AuctionStatus::Resolved | AuctionStatus::Converted)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptanceResult {
    pub proposal: Proposal,
    pub rejected_proposal_ids: Vec<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auction: Option<Auction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escrow_id: Option<String>,
}

/// Body of `POST /api/proposals/{id}/reject`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RejectProposalRequest {
    #[serde(default)]
    pub reason: Option<String>,
}
