use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// JSON body with an explicit `charset=utf-8` content type.
#[derive(Debug, Clone)]
pub struct JsonResponse<T>(pub T);

impl<T: Serialize> IntoResponse for JsonResponse<T> {
    fn into_response(self) -> Response {
        let content_type = [(header::CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE))];
        match serde_json::to_vec(&self.0) {
            Ok(body) => (content_type, body).into_response(),
            Err(e) => {
                let body = serde_json::json!({ "error": e.to_string() }).to_string();
                (StatusCode::INTERNAL_SERVER_ERROR, content_type, body).into_response()
            }
        }
    }
}
