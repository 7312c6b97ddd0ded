use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::utils::errors::AppError;
use crate::utils::validation::parse_uuid;

/// Header set by the upstream gateway after authentication
pub const USER_HEADER: &str = "x-user-id";

/// The authenticated caller
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurrentUser(pub Uuid);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|raw| parse_uuid(USER_HEADER, raw.trim()).ok())
            .map(CurrentUser)
            .ok_or(AppError::Unauthenticated)
    }
}
