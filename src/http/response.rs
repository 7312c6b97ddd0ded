use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// `{ "success": true, "data": ... }`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

fn envelope<T: Serialize>(status: StatusCode, data: T) -> Response {
    (status, Json(ApiResponse { success: true, data })).into_response()
}

pub fn ok<T: Serialize>(data: T) -> Response {
    envelope(StatusCode::OK, data)
}

pub fn created<T: Serialize>(data: T) -> Response {
    envelope(StatusCode::CREATED, data)
}
