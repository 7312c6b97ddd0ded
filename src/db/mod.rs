use std::str::FromStr;

use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Config;
use crate::utils::errors::mysql_error_number;

pub mod auction;
pub mod booking;
pub mod proposal;
pub mod swap;
pub mod targeting;

const SCHEMA: &str = include_str!("../../migrations/create_tables.sql");

/// Table, key, foreign key and check constraint already exist
const ALREADY_EXISTS: [u16; 4] = [1050, 1061, 1826, 3822];

/// Initialize the MySQL connection pool and create tables
pub async fn init_db(config: &Config) -> Result<MySqlPool, sqlx::Error> {
    let pool = MySqlPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;

    create_tables(&pool).await?;
    info!("Database ready");

    Ok(pool)
}

/// Run the schema file statement by statement
async fn create_tables(pool: &MySqlPool) -> Result<(), sqlx::Error> {
    for statement in schema_statements() {
        match sqlx::raw_sql(statement).execute(pool).await {
            Ok(_) => {}
            Err(e) if already_exists(mysql_error_number(&e)) => {
                debug!(error = %e, "Schema object already exists");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Statements of the schema file; everything before the first delimiter is the header
fn schema_statements() -> impl Iterator<Item = &'static str> {
    SCHEMA
        .split("//")
        .skip(1)
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "DELIMITER ;")
}

fn already_exists(number: Option<u16>) -> bool {
    number.is_some_and(|n| ALREADY_EXISTS.contains(&n))
}

/// `" FOR UPDATE"` when the read feeds a decision inside a transaction
pub(crate) fn lock_clause(for_update: bool) -> &'static str {
    if for_update {
        " FOR UPDATE"
    } else {
        ""
    }
}

/// Build an `IN (?, ?, ...)` placeholder list
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

pub(crate) fn parse_id(raw: &str) -> Result<Uuid, sqlx::Error> {
    Uuid::parse_str(raw).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

pub(crate) fn parse_opt_id(raw: Option<&str>) -> Result<Option<Uuid>, sqlx::Error> {
    raw.map(parse_id).transpose()
}

/// Decode a text status column into its enum
pub(crate) fn parse_text<T: FromStr<Err = String>>(raw: &str) -> Result<T, sqlx::Error> {
    raw.parse::<T>().map_err(|e| sqlx::Error::Decode(e.into()))
}

pub(crate) fn decode_error(message: impl Into<String>) -> sqlx::Error {
    let message: String = message.into();
    sqlx::Error::Decode(message.into())
}
