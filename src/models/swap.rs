//! Swap listings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::auction::Auction;

text_enum! {
    pub enum SwapStatus {
        Active => "active",
        Targeting => "targeting",
        ProposalPending => "proposal_pending",
        Accepted => "accepted",
        Completed => "completed",
        Cancelled => "cancelled",
        Expired => "expired",
    }
}

impl SwapStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Expired)
    }

    /// Whether the swap can still make or receive proposals.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Active | Self::Targeting | Self::ProposalPending)
    }
}

/// How a swap chooses among incoming proposals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AcceptanceStrategy {
    FirstMatch,
    #[serde(rename_all = "camelCase")]
    Auction {
        auction_end_date: DateTime<Utc>,
        auto_select_after_hours: u32,
    },
}

impl AcceptanceStrategy {
    pub fn is_auction(&self) -> bool {
        matches!(self, Self::Auction { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::FirstMatch => "first_match",
            Self::Auction { .. } => "auction",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTypes {
    pub booking_exchange: bool,
    pub cash_payment: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_cash_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_cash_amount: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Swap {
    pub id: Uuid,
    pub source_booking_id: Uuid,
    pub owner_id: Uuid,
    pub status: SwapStatus,
    pub acceptance_strategy: AcceptanceStrategy,
    pub payment_types: PaymentTypes,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A swap together with its auction row, as returned by the API
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapView {
    #[serde(flatten)]
    pub swap: Swap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auction: Option<Auction>,
}

/// Body of `POST /api/swaps`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSwapRequest {
    pub source_booking_id: String,
    pub acceptance_strategy: AcceptanceStrategy,
    pub payment_types: PaymentTypes,
}
