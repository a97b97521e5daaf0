//! Board REST routes.
//!
//! Reads go to the live board when it is loaded, so an HTTP snapshot never
//! lags behind what websocket clients see.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use canvas::doc::Shape;
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use crate::services::board::{self, BoardError, BoardRow};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateBoardBody {
    pub name: Option<String>,
    pub owner_id: Option<Uuid>,
}

pub(crate) fn board_error_to_status(err: &BoardError) -> StatusCode {
    match err {
        BoardError::NotFound(_) => StatusCode::NOT_FOUND,
        BoardError::Forbidden(_) => StatusCode::FORBIDDEN,
        BoardError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn log_and_map(err: BoardError) -> StatusCode {
    let status = board_error_to_status(&err);
    if status.is_server_error() {
        warn!(error = %err, "board route failed");
    }
    status
}

/// `POST /api/board`: create a new board.
pub async fn create_board_rest(
    State(state): State<AppState>,
    Json(body): Json<CreateBoardBody>,
) -> Result<(StatusCode, Json<BoardRow>), StatusCode> {
    let name = body
        .name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("Untitled Board");
    let row = board::create_board(&state.pool, name, body.owner_id)
        .await
        .map_err(log_and_map)?;
    Ok((StatusCode::CREATED, Json(row)))
}

/// `GET /api/board`: list boards, newest first.
pub async fn list_boards_rest(State(state): State<AppState>) -> Result<Json<Vec<BoardRow>>, StatusCode> {
    let rows = board::list_boards(&state.pool).await.map_err(log_and_map)?;
    Ok(Json(rows))
}

/// `GET /api/board/{id}/objects`: shapes in draw order.
pub async fn list_objects(
    State(state): State<AppState>,
    Path(board_id): Path<Uuid>,
) -> Result<Json<Vec<Shape>>, StatusCode> {
    if let Some(objects) = live_objects(&state, board_id).await {
        return Ok(Json(objects));
    }

    let mut objects = board::load_board_objects(&state.pool, board_id)
        .await
        .map_err(log_and_map)?;
    objects.sort_by(|a, b| a.z_index.cmp(&b.z_index).then_with(|| a.id.cmp(&b.id)));
    Ok(Json(objects))
}

async fn live_objects(state: &AppState, board_id: Uuid) -> Option<Vec<Shape>> {
    let boards = state.boards.read().await;
    let board_state = boards.get(&board_id)?;
    Some(board_state.objects.sorted().into_iter().cloned().collect())
}

#[cfg(test)]
#[path = "boards_test.rs"]
mod tests;
