//! HTTP surface

pub mod bookings;
pub mod identity;
pub mod proposals;
pub mod response;
pub mod swaps;

use std::future::Future;

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;
use uuid::Uuid;

use crate::state::AppState;
use crate::utils::errors::AppError;
use crate::utils::ratelimit::{check_cooldown, record_action};

/// Create the application router.
pub fn create(state: AppState) -> Router {
    let api = Router::new()
        .route("/bookings", post(bookings::create))
        .route("/bookings/{id}", get(bookings::get))
        .route("/swaps", post(swaps::create))
        .route("/swaps/{id}", get(swaps::get).delete(swaps::cancel))
        .route("/swaps/{id}/target", post(swaps::target).delete(swaps::remove_target))
        .route("/swaps/{id}/retarget", put(swaps::retarget))
        .route("/swaps/{id}/targeting-status", get(swaps::targeting_status))
        .route("/swaps/{id}/can-target", get(swaps::can_target))
        .route("/swaps/{id}/targeting-history", get(swaps::targeting_history))
        .route("/swaps/{id}/proposals", get(proposals::list))
        .route("/proposals/{id}/accept", post(proposals::accept))
        .route("/proposals/{id}/reject", post(proposals::reject));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(middleware::from_fn_with_state(state.clone(), global_rate_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

async fn global_rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    match state.inbound.admit().await {
        Ok(()) => next.run(request).await,
        Err(wait) => {
            debug!("Global rate limit hit, {}ms left in window", wait.as_millis());
            AppError::RateLimited(wait.as_secs().max(1)).into_response()
        }
    }
}

/// Run a mutating call under the per-(user, action) cooldown. Only calls
/// that succeed start the cooldown, so a refused attempt can be retried
/// right after a re-fetch.
pub(crate) async fn with_cooldown<T, F>(
    state: &AppState,
    user_id: Uuid,
    action: &'static str,
    call: F,
) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    let cooldown_secs = state.config.action_cooldown_secs;
    check_cooldown(user_id, action, cooldown_secs)
        .await
        .map_err(AppError::RateLimited)?;
    let value = call.await?;
    record_action(user_id, action, cooldown_secs).await;
    Ok(value)
}
