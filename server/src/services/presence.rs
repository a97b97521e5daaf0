//! Presence service: live cursors.
//!
//! Cursor traffic is the hottest path on a board, so nothing here logs,
//! persists, or errors: moves from clients that have not joined are dropped.

use canvas::presence::Cursor;
use uuid::Uuid;

use crate::state::AppState;

/// Record a cursor move for a joined client. Returns the stored cursor, or
/// `None` when the client is not on the board or the move is out of order.
pub async fn move_cursor(state: &AppState, board_id: Uuid, client_id: Uuid, x: f64, y: f64, now: i64) -> Option<Cursor> {
    let mut boards = state.boards.write().await;
    let board = boards.get_mut(&board_id)?;
    let user = board.users.get(&client_id)?;

    let cursor = Cursor {
        client_id,
        user_id: user.user_id,
        name: user.name.clone(),
        color: user.color.clone(),
        x,
        y,
        updated_at_ms: now,
    };
    board.presence.upsert(cursor.clone()).then_some(cursor)
}

/// Remove a client's cursor. Returns whether one was present.
pub async fn clear_cursor(state: &AppState, board_id: Uuid, client_id: Uuid) -> bool {
    let mut boards = state.boards.write().await;
    boards
        .get_mut(&board_id)
        .is_some_and(|board| board.presence.clear(client_id).is_some())
}

/// Drop idle cursors on every live board. Returns `(board_id, client_ids)`
/// pairs for boards where something was swept.
pub async fn sweep_stale(state: &AppState, now: i64) -> Vec<(Uuid, Vec<Uuid>)> {
    let max_age = state.sync.cursor_stale_ms;
    let mut boards = state.boards.write().await;
    boards
        .iter_mut()
        .filter_map(|(board_id, board)| {
            let stale = board.presence.sweep_stale(now, max_age);
            (!stale.is_empty()).then_some((*board_id, stale))
        })
        .collect()
}

#[cfg(test)]
#[path = "presence_test.rs"]
mod tests;
