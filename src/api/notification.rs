use tracing::debug;

use super::client::SinkClient;
use super::models::SinkError;
use crate::machine::Notice;

/// Delivers user-facing notices. Best effort: callers log failures.
pub struct NotificationClient {
    client: SinkClient,
}

impl NotificationClient {
    pub fn new(client: SinkClient) -> Self {
        Self { client }
    }

    pub async fn send(&self, notice: &Notice) -> Result<(), SinkError> {
        if !self.client.is_enabled() {
            debug!("Notification {} for {} dropped: sink disabled", notice.kind(), notice.recipient());
            return Ok(());
        }
        self.client.post("/notifications", notice).await?;
        Ok(())
    }
}
