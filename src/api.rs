//! JSON error responses for the REST API.
//!
//! Route handlers under `/api` return [ApiResult] so that errors are sent as
//! `{"error": "..."}` with a matching status code instead of an HTML page.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::Error;

/// An [Error] that is rendered as JSON.
#[derive(Debug, PartialEq)]
pub struct ApiError(pub Error);

/// The result type for JSON route handlers.
pub type ApiResult<T> = Result<T, ApiError>;

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = self.0.status_code();

        let message = if status_code == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("An unexpected error occurred: {}", self.0);
            "An unexpected error occurred, check the server logs for more details.".to_owned()
        } else {
            self.0.to_string()
        };

        (status_code, Json(json!({ "error": message }))).into_response()
    }
}

/// The response for clients that are not logged in.
pub fn unauthenticated_response() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "Authentication credentials were not provided." })),
    )
        .into_response()
}
