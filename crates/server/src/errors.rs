use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use service::StoreError;
use thiserror::Error;

use crate::json::JsonResponse;

/// Any failure behind a `/key/:key` route. Every variant maps to
/// `500 {"error": <message>}`; callers cannot tell them apart by status.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("no key in request path {0:?}")]
    MissingKey(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let msg = self.to_string();
        (StatusCode::INTERNAL_SERVER_ERROR, JsonResponse(json!({ "error": msg }))).into_response()
    }
}
