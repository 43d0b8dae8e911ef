use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use percent_encoding::percent_decode_str;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{debug, error, Level};

use common::{
    metrics,
    types::{Health, Status, Welcome},
};
use service::{KvStore, StoreError};

use crate::errors::ApiError;
use crate::json::JsonResponse;

/// Shared handler state: the one store every request goes through.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn KvStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }
}

const KEY_PREFIX: &str = "/key/";

/// The key is the raw path segment after `/key/`, percent-decoded to bytes.
/// Decoding never fails, so keys that are not UTF-8 (`/key/%FF`) are accepted.
fn key_from_uri(uri: &Uri) -> Result<Vec<u8>, ApiError> {
    let raw = uri
        .path()
        .strip_prefix(KEY_PREFIX)
        .ok_or_else(|| ApiError::MissingKey(uri.path().to_string()))?;
    Ok(percent_decode_str(raw).collect())
}

/// Count the call, log and count a failure, and lift the error for the response.
fn observe<T>(op: &'static str, key: &[u8], res: Result<T, StoreError>) -> Result<T, ApiError> {
    metrics::record_operation(op);
    res.map_err(|e| {
        metrics::record_error(op);
        error!(op, key = %String::from_utf8_lossy(key), error = %e, "store operation failed");
        ApiError::from(e)
    })
}

pub async fn welcome() -> JsonResponse<Welcome> {
    JsonResponse(Welcome::default())
}

pub async fn health() -> JsonResponse<Health> {
    JsonResponse(Health { status: "ok" })
}

pub async fn metrics_text() -> Response {
    match metrics::encode_metrics() {
        Ok(text) => text.into_response(),
        Err(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response(),
    }
}

/// Raw value bytes as the body; an absent key is an empty 200.
pub async fn get_key(State(state): State<AppState>, uri: Uri) -> Result<Vec<u8>, ApiError> {
    let key = key_from_uri(&uri)?;
    let value = observe("get", &key, state.store.get(&key).await)?;
    debug!(key = %String::from_utf8_lossy(&key), len = value.len(), "value read");
    Ok(value)
}

pub async fn set_key(
    State(state): State<AppState>,
    uri: Uri,
    body: Bytes,
) -> Result<JsonResponse<Status>, ApiError> {
    let key = key_from_uri(&uri)?;
    observe("set", &key, state.store.set(&key, &body).await)?;
    debug!(key = %String::from_utf8_lossy(&key), len = body.len(), "value stored");
    Ok(JsonResponse(Status::success()))
}

pub async fn delete_key(State(state): State<AppState>, uri: Uri) -> Result<JsonResponse<Status>, ApiError> {
    let key = key_from_uri(&uri)?;
    observe("delete", &key, state.store.delete(&key).await)?;
    debug!(key = %String::from_utf8_lossy(&key), "value deleted");
    Ok(JsonResponse(Status::success()))
}

/// Build the full application router
pub fn build_router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/", get(welcome))
        .route("/health", get(health))
        .route("/metrics", get(metrics_text))
        .route("/key/:key", get(get_key).post(set_key).delete(delete_key))
        .with_state(state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO).include_headers(false))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO).include_headers(false))
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        )
}
