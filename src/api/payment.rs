use tracing::{error, info};
use uuid::Uuid;

use super::client::SinkClient;
use super::models::{CashOfferValidation, CashOfferValidationRequest, EscrowResponse, SinkError};
use crate::machine::EscrowRequest;
use crate::models::CashOffer;
use crate::utils::errors::AppError;

/// Cash offer checks and escrow creation
pub struct PaymentClient {
    client: SinkClient,
}

impl PaymentClient {
    pub fn new(client: SinkClient) -> Self {
        Self { client }
    }

    fn integration_error(&self, e: SinkError) -> AppError {
        AppError::Integration {
            service: self.client.service(),
            message: e.to_string(),
        }
    }

    /// Ask the payment service whether the payer can honour the offer.
    /// Without a payment service only the local checks apply.
    pub async fn validate_cash_offer(&self, payer_id: Uuid, offer: &CashOffer) -> Result<(), AppError> {
        if !self.client.is_enabled() {
            return Ok(());
        }
        let body = CashOfferValidationRequest {
            payer_id: payer_id.to_string(),
            offer,
        };
        let verdict: CashOfferValidation = self
            .client
            .post_json("/cash-offers/validate", &body)
            .await
            .map_err(|e| self.integration_error(e))?;

        if verdict.valid {
            Ok(())
        } else {
            Err(AppError::validation(
                "INVALID_CASH_OFFER",
                verdict
                    .reason
                    .unwrap_or_else(|| "Cash offer was declined by the payment service".to_string()),
            ))
        }
    }

    /// Hold the offered funds. Failure aborts the acceptance. A proposal is
    /// accepted at most once, so its id keys the escrow on the remote side.
    pub async fn create_escrow(&self, request: &EscrowRequest) -> Result<String, AppError> {
        let idempotency_key = escrow_key(request);
        let response: EscrowResponse = self
            .client
            .post_json_once("/escrows", request, &idempotency_key)
            .await
            .map_err(|e| {
                error!("Escrow for proposal {} failed: {}", request.proposal_id, e);
                self.integration_error(e)
            })?;
        info!("Escrow {} created for proposal {}", response.escrow_id, request.proposal_id);
        Ok(response.escrow_id)
    }
}

fn escrow_key(request: &EscrowRequest) -> String {
    format!("escrow-{}", request.proposal_id)
}
