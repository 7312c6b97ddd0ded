use serde::{Deserialize, Serialize};

use crate::models::CashOffer;

/// `POST /transactions` response from the notary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    pub transaction_id: String,
}

/// `POST /escrows` response from the payment service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowResponse {
    pub escrow_id: String,
}

/// `POST /cash-offers/validate` request body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CashOfferValidationRequest<'a> {
    pub payer_id: String,
    #[serde(flatten)]
    pub offer: &'a CashOffer,
}

/// `POST /cash-offers/validate` response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashOfferValidation {
    pub valid: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

/// 429 body some services send along with the status
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitResponse {
    #[serde(default)]
    pub message: Option<String>,
    /// Milliseconds
    #[serde(default)]
    pub retry_after: Option<u64>,
}

/// Error from one sink call
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SinkError {
    #[error("{0} service is not configured")]
    Disabled(&'static str),
    #[error("request failed: {0}")]
    Request(String),
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("server error {0}: {1}")]
    ServerError(u16, String),
    #[error("request rejected with {0}: {1}")]
    Rejected(u16, String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl SinkError {
    /// Transport failures, throttling and 5xx are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Request(_) | Self::RateLimited { .. } | Self::ServerError(..)
        )
    }
}
