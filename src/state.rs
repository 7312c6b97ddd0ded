use std::sync::Arc;

use sqlx::mysql::MySqlPool;

use crate::api::Sinks;
use crate::config::Config;
use crate::utils::ratelimit::InboundLimiter;

/// Shared by every handler and the sweep
#[derive(Clone)]
pub struct AppState {
    pub pool: MySqlPool,
    pub sinks: Sinks,
    pub config: Arc<Config>,
    pub inbound: Arc<InboundLimiter>,
}

impl AppState {
    pub fn new(pool: MySqlPool, sinks: Sinks, config: Config) -> Self {
        Self {
            pool,
            sinks,
            inbound: Arc::new(InboundLimiter::per_second(config.inbound_rate_limit)),
            config: Arc::new(config),
        }
    }
}
