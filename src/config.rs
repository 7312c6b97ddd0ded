//! Process configuration read from the environment (and `.env`)

use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} not set in environment or .env file")]
    Missing(&'static str),
    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    pub database_max_connections: u32,
    pub notification_service_url: Option<String>,
    pub notary_service_url: Option<String>,
    pub payment_service_url: Option<String>,
    pub sink_api_token: Option<String>,
    pub sweep_interval: Duration,
    pub retry_max_attempts: u32,
    pub retry_base_delay: Duration,
    pub action_cooldown_secs: u64,
    /// Inbound API requests per second across all callers
    pub inbound_rate_limit: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Ok(Self {
            database_url: get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            bind_address: get("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            database_max_connections: positive_or(&get, "DATABASE_MAX_CONNECTIONS", 10)?,
            notification_service_url: get("NOTIFICATION_SERVICE_URL").map(trim_slash),
            notary_service_url: get("NOTARY_SERVICE_URL").map(trim_slash),
            payment_service_url: get("PAYMENT_SERVICE_URL").map(trim_slash),
            sink_api_token: get("SINK_API_TOKEN"),
            sweep_interval: Duration::from_secs(positive_or(&get, "SWEEP_INTERVAL_SECS", 60)?),
            retry_max_attempts: parse_or(&get, "RETRY_MAX_ATTEMPTS", 3)?,
            retry_base_delay: Duration::from_millis(parse_or(&get, "RETRY_BASE_DELAY_MS", 200)?),
            action_cooldown_secs: parse_or(&get, "ACTION_COOLDOWN_SECS", 2)?,
            inbound_rate_limit: positive_or(&get, "INBOUND_RATE_LIMIT", 200)?,
        })
    }
}

fn parse_or<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(name) {
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

/// Like `parse_or`, but zero is rejected
fn positive_or<T>(get: &impl Fn(&str) -> Option<String>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialEq + Default,
{
    let value = parse_or(get, name, default)?;
    if value == T::default() {
        return Err(ConfigError::Invalid {
            name,
            value: "0".to_string(),
        });
    }
    Ok(value)
}

fn trim_slash(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
