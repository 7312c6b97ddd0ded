//! Targeting relations, their audit history and the API shapes around them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::auction::Auction;
use super::proposal::{CashOffer, Proposal};
use crate::utils::errors::ErrorDetail;

text_enum! {
    pub enum TargetingStatus {
        Active => "active",
        Cancelled => "cancelled",
        Accepted => "accepted",
        Rejected => "rejected",
    }
}

text_enum! {
    pub enum TargetingAction {
        Targeted => "targeted",
        Retargeted => "retargeted",
        Removed => "removed",
        Accepted => "accepted",
        Rejected => "rejected",
        Cancelled => "cancelled",
        Expired => "expired",
    }
}

/// "My swap currently proposes against that swap."
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetingRelation {
    pub id: Uuid,
    pub source_swap_id: Uuid,
    pub target_swap_id: Uuid,
    pub proposal_id: Uuid,
    pub status: TargetingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetingHistoryEntry {
    pub id: Uuid,
    pub source_swap_id: Uuid,
    pub target_swap_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal_id: Option<Uuid>,
    pub action: TargetingAction,
    /// `None` when the sweep acted.
    pub actor_id: Option<Uuid>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Optional parts of a proposal supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetOptions {
    pub message: Option<String>,
    pub conditions: Vec<String>,
    pub cash_offer: Option<CashOffer>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetingResult {
    pub relation: TargetingRelation,
    pub proposal: Proposal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_target_swap_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_proposal_id: Option<Uuid>,
}

/// Answer to "can I target this swap?" computed by the same rules as the
/// mutating path.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub can_target: bool,
    pub errors: Vec<ErrorDetail>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetingStatusView {
    pub swap_id: Uuid,
    pub outgoing: Option<TargetingRelation>,
    pub incoming: Vec<TargetingRelation>,
    pub pending_proposals: usize,
    /// Swap that targets this one while this one targets it back.
    pub mutual_with: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auction: Option<Auction>,
}

/// Body of `POST /api/swaps/{id}/target` and `PUT /api/swaps/{id}/retarget`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRequest {
    pub source_swap_id: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub cash_offer: Option<CashOffer>,
}

/// Body of `DELETE /api/swaps/{id}/target`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveTargetRequest {
    pub source_swap_id: String,
}

/// Query of `GET /api/swaps/{id}/can-target`. The cash fields describe the
/// offer the caller intends to make; without `cashAmount` the check is for a
/// booking exchange.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanTargetQuery {
    #[serde(default)]
    pub source_swap_id: Option<String>,
    #[serde(default)]
    pub cash_amount: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub payment_method_id: Option<String>,
}
