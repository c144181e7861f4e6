use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use taskboard_core::config::BoardColumns;
use taskboard_core::types::{Card, CardPatch, NewCard, ReorderRequest};

use super::{api_error, has_path_traversal, insert_header_safe, storage_error, ApiError};
use crate::state::AppState;

fn message(text: &str) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": text }))
}

fn checked_card_id(card_id: &str, target: &'static str) -> Result<(), ApiError> {
    if card_id.is_empty() || has_path_traversal(card_id) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            target,
            format!("Invalid card id: {}", card_id),
        ));
    }
    Ok(())
}

pub async fn list_cards(State(state): State<AppState>, headers: HeaderMap) -> Response {
    // Tag first: a write landing in between only makes the tag stale.
    let etag = format!("\"{}\"", state.gateway.content_hash());

    if let Some(if_none_match) = headers.get("if-none-match") {
        if let Ok(value) = if_none_match.to_str() {
            if value == etag {
                let mut resp_headers = HeaderMap::new();
                insert_header_safe(&mut resp_headers, "etag", &etag);
                return (StatusCode::NOT_MODIFIED, resp_headers).into_response();
            }
        }
    }

    let cards = state.gateway.list();
    let mut resp_headers = HeaderMap::new();
    insert_header_safe(&mut resp_headers, "etag", &etag);
    (StatusCode::OK, resp_headers, Json(cards)).into_response()
}

pub async fn create_card(
    State(state): State<AppState>,
    Json(body): Json<NewCard>,
) -> Result<(StatusCode, Json<Card>), ApiError> {
    let card = state
        .gateway
        .create(body)
        .map_err(|e| storage_error("taskboard.api.create", e))?;
    Ok((StatusCode::CREATED, Json(card)))
}

pub async fn update_card(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
    Json(patch): Json<CardPatch>,
) -> Result<Json<Card>, ApiError> {
    checked_card_id(&card_id, "taskboard.api.update")?;
    let card = state
        .gateway
        .update(&card_id, &patch)
        .map_err(|e| storage_error("taskboard.api.update", e))?;
    Ok(Json(card))
}

pub async fn delete_card(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    checked_card_id(&card_id, "taskboard.api.delete")?;
    state
        .gateway
        .delete(&card_id)
        .map_err(|e| storage_error("taskboard.api.delete", e))?;
    Ok(message("Card deleted"))
}

pub async fn reorder_cards(
    State(state): State<AppState>,
    Json(body): Json<ReorderRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .gateway
        .reorder(&body)
        .map_err(|e| storage_error("taskboard.api.reorder", e))?;
    log::debug!(
        target: "taskboard.api.reorder",
        "Committed {} cards in {}",
        body.card_ids.len(),
        body.column_id
    );
    Ok(message("Cards reordered"))
}

pub async fn list_columns(State(state): State<AppState>) -> Json<BoardColumns> {
    Json(state.gateway.columns().clone())
}
