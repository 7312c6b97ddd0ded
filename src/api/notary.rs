use tracing::debug;

use super::client::SinkClient;
use super::models::{SinkError, TransactionResponse};
use crate::machine::LedgerRecord;

/// Append-only ledger for accepted, converted and closed swaps
pub struct NotaryClient {
    client: SinkClient,
}

impl NotaryClient {
    pub fn new(client: SinkClient) -> Self {
        Self { client }
    }

    /// Record an event; returns the ledger transaction id when the sink is enabled.
    pub async fn record(&self, record: &LedgerRecord) -> Result<Option<String>, SinkError> {
        if !self.client.is_enabled() {
            debug!("Ledger event {} for swap {} not notarized: sink disabled", record.event, record.swap_id);
            return Ok(None);
        }
        let response: TransactionResponse = self.client.post_json("/transactions", record).await?;
        Ok(Some(response.transaction_id))
    }
}
