//! Clients for the external sinks: notifications, notary and payments

pub mod client;
pub mod models;
pub mod notary;
pub mod notification;
pub mod payment;
pub mod ratelimit;
pub mod retry;

use std::sync::Arc;

use crate::config::Config;

pub use client::SinkClient;
pub use models::SinkError;
pub use notary::NotaryClient;
pub use notification::NotificationClient;
pub use payment::PaymentClient;
pub use retry::RetryPolicy;

/// All sinks, shared by request handlers and the sweep
#[derive(Clone)]
pub struct Sinks {
    pub notifications: Arc<NotificationClient>,
    pub notary: Arc<NotaryClient>,
    pub payments: Arc<PaymentClient>,
}

impl Sinks {
    pub fn from_config(config: &Config) -> Self {
        let retry = RetryPolicy::new(config.retry_max_attempts, config.retry_base_delay);
        let client = |service: &'static str, url: &Option<String>| {
            SinkClient::new(service, url.clone(), config.sink_api_token.clone(), retry)
        };

        Self {
            notifications: Arc::new(NotificationClient::new(client(
                "notification",
                &config.notification_service_url,
            ))),
            notary: Arc::new(NotaryClient::new(client("notary", &config.notary_service_url))),
            payments: Arc::new(PaymentClient::new(client("payment", &config.payment_service_url))),
        }
    }

    /// Every sink off; used when nothing is configured and in tests.
    pub fn disabled() -> Self {
        Self {
            notifications: Arc::new(NotificationClient::new(SinkClient::disabled("notification"))),
            notary: Arc::new(NotaryClient::new(SinkClient::disabled("notary"))),
            payments: Arc::new(PaymentClient::new(SinkClient::disabled("payment"))),
        }
    }
}
