//! Input validation shared by the HTTP layer and the rule engine

use lazy_static::lazy_static;
use regex::Regex;
use uuid::Uuid;

use crate::models::CashOffer;
use crate::utils::errors::AppError;

const MAX_MESSAGE_LEN: usize = 1000;
const MAX_CONDITIONS: usize = 10;
const MAX_CONDITION_LEN: usize = 200;
const MAX_CASH_AMOUNT: f64 = 1_000_000_000.0;

lazy_static! {
    // RFC 4122 layout: version nibble 1-5, variant bits 10xx
    static ref UUID_PATTERN: Regex = Regex::new(
        r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[1-5][0-9a-fA-F]{3}-[89abAB][0-9a-fA-F]{3}-[0-9a-fA-F]{12}$"
    )
    .expect("uuid pattern compiles");

    static ref CURRENCY_PATTERN: Regex = Regex::new(r"^[A-Z]{3}$").expect("currency pattern compiles");
}

/// Parse an id, rejecting anything that is not a hyphenated RFC 4122 UUID
pub fn parse_uuid(field: &str, raw: &str) -> Result<Uuid, AppError> {
    if !UUID_PATTERN.is_match(raw) {
        return Err(AppError::validation(
            "INVALID_ID",
            format!("{} must be a valid UUID", field),
        ));
    }
    Uuid::parse_str(raw).map_err(|_| {
        AppError::validation("INVALID_ID", format!("{} must be a valid UUID", field))
    })
}

pub fn validate_cash_offer(offer: &CashOffer) -> Result<(), AppError> {
    if !offer.amount.is_finite() || offer.amount <= 0.0 {
        return Err(AppError::validation(
            "INVALID_CASH_OFFER",
            "Cash offer amount must be positive",
        ));
    }
    if offer.amount > MAX_CASH_AMOUNT {
        return Err(AppError::validation(
            "INVALID_CASH_OFFER",
            "Cash offer amount is too large",
        ));
    }
    if !CURRENCY_PATTERN.is_match(&offer.currency) {
        return Err(AppError::validation(
            "INVALID_CASH_OFFER",
            "Currency must be a three-letter ISO code",
        ));
    }
    let method = offer.payment_method_id.trim();
    if method.is_empty() || method.len() > 64 {
        return Err(AppError::validation(
            "INVALID_CASH_OFFER",
            "A payment method is required for cash offers",
        ));
    }
    Ok(())
}

/// Trim the free-text parts of a proposal and enforce their limits.
pub fn normalize_proposal_text(
    message: Option<String>,
    conditions: Vec<String>,
) -> Result<(Option<String>, Vec<String>), AppError> {
    let message = message
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty());
    if message.as_ref().is_some_and(|m| m.chars().count() > MAX_MESSAGE_LEN) {
        return Err(AppError::validation(
            "MESSAGE_TOO_LONG",
            format!("Message must be at most {} characters", MAX_MESSAGE_LEN),
        ));
    }

    let conditions: Vec<String> = conditions
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    if conditions.len() > MAX_CONDITIONS {
        return Err(AppError::validation(
            "TOO_MANY_CONDITIONS",
            format!("At most {} conditions are allowed", MAX_CONDITIONS),
        ));
    }
    if conditions.iter().any(|c| c.chars().count() > MAX_CONDITION_LEN) {
        return Err(AppError::validation(
            "CONDITION_TOO_LONG",
            format!("Conditions must be at most {} characters", MAX_CONDITION_LEN),
        ));
    }
    Ok((message, conditions))
}
