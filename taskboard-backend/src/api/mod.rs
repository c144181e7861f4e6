use axum::{
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, put},
    Router,
};
use serde::{Deserialize, Serialize};
use taskboard_core::storage::StorageError;

mod cards;
mod events;

pub(crate) use events::event_or_reload;

use crate::state::AppState;

/// Axum REST API routes.
///
///   GET    /api/cards          -> all cards, sorted (+ ETag)
///   POST   /api/cards          -> create card (201)
///   PUT    /api/cards/reorder  -> commit one column's order
///   PUT    /api/cards/:id      -> update card
///   DELETE /api/cards/:id      -> delete card
///   GET    /api/columns        -> configured columns
///   GET    /events             -> SSE stream of board events
///   GET    /status             -> health check
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/api/cards", get(cards::list_cards).post(cards::create_card))
        .route("/api/cards/reorder", put(cards::reorder_cards))
        .route(
            "/api/cards/{card_id}",
            put(cards::update_card).delete(cards::delete_card),
        )
        .route("/api/columns", get(cards::list_columns))
        .route("/events", get(events::sse_events))
        .route("/status", get(events::status))
}

// ── Shared types and helpers used across sub-modules ────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Card ids a reorder named that the store doesn't hold.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<String>,
}

pub(crate) type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn api_error(status: StatusCode, target: &'static str, error: String) -> ApiError {
    log_api_issue(status, target, &error);
    (
        status,
        Json(ErrorResponse {
            error,
            missing: Vec::new(),
        }),
    )
}

/// Map a store failure onto the HTTP status clients classify by.
pub(crate) fn storage_error(target: &'static str, e: StorageError) -> ApiError {
    let status = match &e {
        StorageError::CardNotFound(_) => StatusCode::NOT_FOUND,
        StorageError::StaleReference { .. } => StatusCode::CONFLICT,
        StorageError::Invalid(_) => StatusCode::BAD_REQUEST,
        StorageError::Io(_) | StorageError::Serialization(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    let error = e.to_string();
    log_api_issue(status, target, &error);
    let missing = match e {
        StorageError::StaleReference { missing, .. } => missing,
        _ => Vec::new(),
    };
    (status, Json(ErrorResponse { error, missing }))
}

/// Check if a user-supplied path segment contains path traversal sequences.
/// Percent-decodes the input first, then checks the decoded string for:
/// "..", "/", "\", "./" prefix, and "/./" in path.
fn has_path_traversal(input: &str) -> bool {
    use percent_encoding::percent_decode_str;
    let decoded = percent_decode_str(input).decode_utf8_lossy();
    decoded.contains("..")
        || decoded.contains('/')
        || decoded.contains('\\')
        || decoded.starts_with("./")
        || decoded.contains("/./")
}

fn insert_header_safe(headers: &mut HeaderMap, name: &'static str, value: &str) {
    match value.parse() {
        Ok(parsed) => {
            headers.insert(name, parsed);
        }
        Err(e) => {
            log::warn!(target: "taskboard.api", "Failed to set header {}={} ({})", name, value, e);
        }
    }
}

fn log_api_issue(status: StatusCode, target: &'static str, message: impl AsRef<str>) {
    let message = message.as_ref();
    if status.is_server_error() {
        log::error!(target: target, "{}", message);
    } else {
        log::warn!(target: target, "{}", message);
    }
}
