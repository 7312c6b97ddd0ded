use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use sqlx::mysql::MySqlDatabaseError;
use tracing::error;

use crate::models::{BookingStatus, ProposalStatus, SwapStatus};

/// MySQL error numbers that mean "someone else got there first"
const ER_DUP_ENTRY: u16 = 1062;
const ER_LOCK_WAIT_TIMEOUT: u16 = 1205;
const ER_LOCK_DEADLOCK: u16 = 1213;

/// Coarse class of an error; decides the HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    Authentication,
    Authorization,
    NotFound,
    Conflict,
    RateLimit,
    Integration,
    Server,
}

impl ErrorCategory {
    pub fn status(self) -> StatusCode {
        match self {
            Self::Validation => StatusCode::BAD_REQUEST,
            Self::Authentication => StatusCode::UNAUTHORIZED,
            Self::Authorization => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            Self::Integration => StatusCode::BAD_GATEWAY,
            Self::Server => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Machine-readable code plus human-readable message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// Violations of the targeting / proposal rules
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TargetingError {
    #[error("You cannot target your own swap")]
    CannotTargetOwnSwap,
    #[error("The auction for this swap has ended")]
    AuctionEnded,
    #[error("This swap already has a pending proposal")]
    ProposalPending,
    #[error("Your swap is already targeting this swap")]
    AlreadyTargeted,
    #[error("Target swap is not available (status: {0})")]
    TargetSwapUnavailable(SwapStatus),
    #[error("Your swap cannot make proposals (status: {0})")]
    SourceSwapUnavailable(SwapStatus),
    #[error("This swap is no longer open (status: {0})")]
    SwapNotOpen(SwapStatus),
    #[error("Another operation on this swap is in progress; refresh and try again")]
    ConcurrentTargeting,
    #[error("Target swap does not accept {0} proposals")]
    PaymentTypeNotAccepted(&'static str),
    #[error("Cash offer of {offered:.2} is below the minimum of {minimum:.2}")]
    CashOfferBelowMinimum { offered: f64, minimum: f64 },
    #[error("Auctions must end at least 7 days before check-in")]
    LastMinuteRestriction,
    #[error("Proposal is no longer pending (status: {0})")]
    ProposalNotPending(ProposalStatus),
    #[error("Your swap is not targeting this swap")]
    NoActiveTarget,
    #[error("An open swap already exists for this booking")]
    SwapAlreadyExists,
    #[error("Booking is not available (status: {0})")]
    BookingUnavailable(BookingStatus),
}

impl TargetingError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::CannotTargetOwnSwap => "CANNOT_TARGET_OWN_SWAP",
            Self::AuctionEnded => "AUCTION_ENDED",
            Self::ProposalPending => "PROPOSAL_PENDING",
            Self::AlreadyTargeted => "ALREADY_TARGETED",
            Self::TargetSwapUnavailable(_) => "TARGET_SWAP_UNAVAILABLE",
            Self::SourceSwapUnavailable(_) => "SOURCE_SWAP_UNAVAILABLE",
            Self::SwapNotOpen(_) => "SWAP_NOT_OPEN",
            Self::ConcurrentTargeting => "CONCURRENT_TARGETING",
            Self::PaymentTypeNotAccepted(_) => "PAYMENT_TYPE_NOT_ACCEPTED",
            Self::CashOfferBelowMinimum { .. } => "CASH_OFFER_BELOW_MINIMUM",
            Self::LastMinuteRestriction => "LAST_MINUTE_RESTRICTION",
            Self::ProposalNotPending(_) => "PROPOSAL_NOT_PENDING",
            Self::NoActiveTarget => "NO_ACTIVE_TARGET",
            Self::SwapAlreadyExists => "SWAP_ALREADY_EXISTS",
            Self::BookingUnavailable(_) => "BOOKING_UNAVAILABLE",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::CannotTargetOwnSwap
            | Self::PaymentTypeNotAccepted(_)
            | Self::CashOfferBelowMinimum { .. }
            | Self::LastMinuteRestriction => ErrorCategory::Validation,
            _ => ErrorCategory::Conflict,
        }
    }
}

/// Every error a request can end with
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("{message}")]
    Validation { code: &'static str, message: String },
    #[error(transparent)]
    Targeting(#[from] TargetingError),
    #[error("{message}")]
    NotFound { code: &'static str, message: String },
    #[error("Missing or invalid user identity")]
    Unauthenticated,
    #[error("{0}")]
    Authorization(String),
    #[error("Please wait {0} seconds before trying again")]
    RateLimited(u64),
    #[error("{service} service failed: {message}")]
    Integration { service: &'static str, message: String },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        Self::Validation { code, message: message.into() }
    }

    pub fn swap_not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            code: "SWAP_NOT_FOUND",
            message: format!("Swap {} not found", id),
        }
    }

    pub fn proposal_not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            code: "PROPOSAL_NOT_FOUND",
            message: format!("Proposal {} not found", id),
        }
    }

    pub fn booking_not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            code: "BOOKING_NOT_FOUND",
            message: format!("Booking {} not found", id),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { code, .. } | Self::NotFound { code, .. } => *code,
            Self::Targeting(e) => e.code(),
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Authorization(_) => "FORBIDDEN",
            Self::RateLimited(_) => "RATE_LIMITED",
            Self::Integration { .. } => "INTEGRATION_ERROR",
            Self::Database(_) | Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation { .. } => ErrorCategory::Validation,
            Self::Targeting(e) => e.category(),
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Unauthenticated => ErrorCategory::Authentication,
            Self::Authorization(_) => ErrorCategory::Authorization,
            Self::RateLimited(_) => ErrorCategory::RateLimit,
            Self::Integration { .. } => ErrorCategory::Integration,
            Self::Database(_) | Self::Internal(_) => ErrorCategory::Server,
        }
    }

    /// Message safe to show the caller; server internals stay in the logs.
    pub fn public_message(&self) -> String {
        match self.category() {
            ErrorCategory::Server => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    pub fn detail(&self) -> ErrorDetail {
        ErrorDetail {
            code: self.code(),
            message: self.public_message(),
        }
    }

    /// Re-classify lock contention and unique-key races as
    /// `CONCURRENT_TARGETING` so the caller knows to re-fetch.
    pub fn into_contention(self) -> Self {
        match self {
            Self::Database(ref e) if is_contention(e) => TargetingError::ConcurrentTargeting.into(),
            other => other,
        }
    }
}

/// Whether a database error came from a concurrent writer
pub fn is_contention(error: &sqlx::Error) -> bool {
    mysql_error_number(error)
        .map(|n| matches!(n, ER_DUP_ENTRY | ER_LOCK_WAIT_TIMEOUT | ER_LOCK_DEADLOCK))
        .unwrap_or(false)
}

pub fn is_unique_violation(error: &sqlx::Error) -> bool {
    mysql_error_number(error) == Some(ER_DUP_ENTRY)
}

pub(crate) fn mysql_error_number(error: &sqlx::Error) -> Option<u16> {
    error
        .as_database_error()
        .and_then(|db| db.try_downcast_ref::<MySqlDatabaseError>())
        .map(|e| e.number())
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::validation("INVALID_BODY", rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::validation("INVALID_QUERY", rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    category: ErrorCategory,
}

#[derive(Serialize)]
struct ErrorEnvelope {
    success: bool,
    error: ErrorBody,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let category = self.category();
        if category == ErrorCategory::Server {
            error!(error = %self, "Request failed");
        }

        let body = ErrorEnvelope {
            success: false,
            error: ErrorBody {
                code: self.code(),
                message: self.public_message(),
                category,
            },
        };
        (category.status(), Json(body)).into_response()
    }
}
