//! Proposals made against a target swap

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

text_enum! {
    pub enum ProposalStatus {
        Pending => "pending",
        Accepted => "accepted",
        Rejected => "rejected",
        Cancelled => "cancelled",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashOffer {
    pub amount: f64,
    pub currency: String,
    pub payment_method_id: String,
}

/// What the proposer puts on the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProposalPayload {
    #[serde(rename_all = "camelCase")]
    Booking { booking_id: Uuid },
    #[serde(rename_all = "camelCase")]
    Cash { cash_offer: CashOffer },
}

impl ProposalPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Booking { .. } => "booking",
            Self::Cash { .. } => "cash",
        }
    }

    pub fn cash_offer(&self) -> Option<&CashOffer> {
        match self {
            Self::Cash { cash_offer } => Some(cash_offer),
            Self::Booking { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub id: Uuid,
    pub target_swap_id: Uuid,
    pub source_swap_id: Uuid,
    pub proposer_id: Uuid,
    pub payload: ProposalPayload,
    pub status: ProposalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub conditions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,
}

impl Proposal {
    pub fn is_pending(&self) -> bool {
        self.status == ProposalStatus::Pending
    }

    pub fn cash_amount(&self) -> Option<f64> {
        self.payload.cash_offer().map(|offer| offer.amount)
    }
}
