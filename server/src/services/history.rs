//! History service: per-user undo/redo on a live board.
//!
//! DESIGN
//! ======
//! Each user has one history per board, fed by every accepted object
//! mutation. Undo/redo refuse to touch shapes another connection has locked
//! (the entry is kept so the user can retry once the lock is released) and
//! discard entries whose shapes were changed by someone else since (see
//! `canvas::history`). Applied results are written to the live board like any
//! other mutation: versions bump, dirty/deleted flags queue persistence.

use canvas::doc::{ObjectId, Shape};
use canvas::history::{self as model, Change, History};
use canvas::lock::LockConflict;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::frame::now_ms;
use crate::state::{Actor, AppState, BoardState};

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("board not loaded: {0}")]
    BoardNotLoaded(Uuid),
    #[error("nothing to {0}")]
    Empty(&'static str),
    #[error("object {0} was changed by another user")]
    Conflict(ObjectId),
    #[error(transparent)]
    Locked(#[from] LockConflict),
}

impl From<model::HistoryError> for HistoryError {
    fn from(err: model::HistoryError) -> Self {
        match err {
            model::HistoryError::Empty(what) => Self::Empty(what),
            model::HistoryError::Conflict(id) => Self::Conflict(id),
        }
    }
}

impl crate::frame::ErrorCode for HistoryError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::BoardNotLoaded(_) => "E_BOARD_NOT_LOADED",
            Self::Empty(_) => "E_HISTORY_EMPTY",
            Self::Conflict(_) => "E_HISTORY_CONFLICT",
            Self::Locked(_) => "E_OBJECT_LOCKED",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Locked(_))
    }
}

/// Shapes written and ids removed by one undo or redo.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HistoryResult {
    pub objects: Vec<Shape>,
    pub deleted: Vec<ObjectId>,
}

#[derive(Clone, Copy)]
enum Direction {
    Undo,
    Redo,
}

/// Revert the user's newest action.
///
/// # Errors
///
/// `Empty`, `Conflict` (entry discarded), or `Locked` (entry kept).
pub async fn undo(state: &AppState, board_id: Uuid, actor: Actor) -> Result<HistoryResult, HistoryError> {
    step(state, board_id, actor, Direction::Undo).await
}

/// Re-apply the user's newest undone action.
///
/// # Errors
///
/// Same contract as [`undo`].
pub async fn redo(state: &AppState, board_id: Uuid, actor: Actor) -> Result<HistoryResult, HistoryError> {
    step(state, board_id, actor, Direction::Redo).await
}

async fn step(state: &AppState, board_id: Uuid, actor: Actor, direction: Direction) -> Result<HistoryResult, HistoryError> {
    let limit = state.sync.history_limit;
    let mut boards = state.boards.write().await;
    let board = boards
        .get_mut(&board_id)
        .ok_or(HistoryError::BoardNotLoaded(board_id))?;

    check_locks(board, actor, limit, direction)?;

    let BoardState { objects, histories, .. } = &mut *board;
    let history = histories
        .entry(actor.user_id)
        .or_insert_with(|| History::new(limit));
    let changes = match direction {
        Direction::Undo => history.undo(objects),
        Direction::Redo => history.redo(objects),
    }?;

    model::apply(objects, &changes);
    let result = settle(board, &changes);
    info!(%board_id, user_id = %actor.user_id, objects = result.objects.len(), deleted = result.deleted.len(), "history step applied");
    Ok(result)
}

/// Refuse before popping so a locked entry survives for a retry.
fn check_locks(board: &mut BoardState, actor: Actor, limit: usize, direction: Direction) -> Result<(), LockConflict> {
    let now = now_ms();
    let history = board.history_mut(actor.user_id, limit);
    let next = match direction {
        Direction::Undo => history.next_undo(),
        Direction::Redo => history.next_redo(),
    };
    let Some(entry) = next else {
        return Ok(());
    };
    let ids: Vec<ObjectId> = entry.object_ids().collect();
    for id in ids {
        board.locks.check_writable(id, actor.client_id, now)?;
    }
    Ok(())
}

/// Queue persistence for applied changes and split them for broadcast.
fn settle(board: &mut BoardState, changes: &[Change]) -> HistoryResult {
    let mut result = HistoryResult::default();
    for change in changes {
        match (&change.after, change.object_id()) {
            (Some(after), _) => {
                board.mark_dirty(after.id);
                result.objects.push(after.clone());
            }
            (None, Some(id)) => {
                board.mark_deleted(id);
                result.deleted.push(id);
            }
            (None, None) => {}
        }
    }
    result
}

#[cfg(test)]
#[path = "history_test.rs"]
mod tests;
