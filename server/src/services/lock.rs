//! Lock service: exclusive interactive control of shapes.
//!
//! DESIGN
//! ======
//! Locks live in the board's `LockTable` and are never persisted. A request
//! for any member of a group locks the whole group, all-or-nothing, so two
//! users can never drag halves of one group. Expiry is enforced lazily on
//! every check and eagerly by the sweeper.

use canvas::doc::ObjectId;
use canvas::group::expand_to_groups;
use canvas::lock::{Lock, LockConflict, LockHolder};
use tracing::info;
use uuid::Uuid;

use crate::frame::now_ms;
use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("board not loaded: {0}")]
    BoardNotLoaded(Uuid),
    #[error("object not found: {0}")]
    NotFound(Uuid),
    #[error("no objects to lock")]
    Empty,
    #[error(transparent)]
    Conflict(#[from] LockConflict),
}

impl crate::frame::ErrorCode for LockError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::BoardNotLoaded(_) => "E_BOARD_NOT_LOADED",
            Self::NotFound(_) => "E_OBJECT_NOT_FOUND",
            Self::Empty => "E_INVALID_REQUEST",
            Self::Conflict(_) => "E_OBJECT_LOCKED",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Lock `ids` (expanded to whole groups) for `holder`.
///
/// # Errors
///
/// Returns `NotFound` for an unknown shape and `Conflict` naming the first
/// live foreign lock; nothing is locked in either case.
pub async fn acquire_locks(
    state: &AppState,
    board_id: Uuid,
    holder: &LockHolder,
    ids: &[ObjectId],
) -> Result<Vec<Lock>, LockError> {
    let mut boards = state.boards.write().await;
    let board = boards
        .get_mut(&board_id)
        .ok_or(LockError::BoardNotLoaded(board_id))?;

    if let Some(missing) = ids.iter().find(|id| !board.objects.contains(id)) {
        return Err(LockError::NotFound(*missing));
    }
    let targets = expand_to_groups(&board.objects, ids);
    if targets.is_empty() {
        return Err(LockError::Empty);
    }

    let granted = board
        .locks
        .try_acquire(&targets, holder, now_ms(), state.sync.lock_ttl_ms)?;
    info!(%board_id, client_id = %holder.client_id, count = granted.len(), "locks acquired");
    Ok(granted)
}

/// Extend the connection's live locks on `ids` (expanded to groups).
/// Locks it does not hold are skipped.
///
/// # Errors
///
/// Returns `BoardNotLoaded` when the board is not live.
pub async fn renew_locks(
    state: &AppState,
    board_id: Uuid,
    client_id: Uuid,
    ids: &[ObjectId],
) -> Result<Vec<Lock>, LockError> {
    let mut boards = state.boards.write().await;
    let board = boards
        .get_mut(&board_id)
        .ok_or(LockError::BoardNotLoaded(board_id))?;

    let targets = expand_to_groups(&board.objects, ids);
    Ok(board
        .locks
        .renew(&targets, client_id, now_ms(), state.sync.lock_ttl_ms))
}

/// Release the connection's locks on `ids` (expanded to groups). Returns the
/// ids actually released.
///
/// # Errors
///
/// Returns `BoardNotLoaded` when the board is not live.
pub async fn release_locks(
    state: &AppState,
    board_id: Uuid,
    client_id: Uuid,
    ids: &[ObjectId],
) -> Result<Vec<ObjectId>, LockError> {
    let mut boards = state.boards.write().await;
    let board = boards
        .get_mut(&board_id)
        .ok_or(LockError::BoardNotLoaded(board_id))?;

    let mut targets = expand_to_groups(&board.objects, ids);
    // Locks on shapes deleted meanwhile are still releasable by id.
    targets.extend(ids.iter().filter(|id| !board.objects.contains(id)));
    let released = board.locks.release(&targets, client_id);
    info!(%board_id, %client_id, count = released.len(), "locks released");
    Ok(released)
}

/// Expire locks on every live board. Returns `(board_id, expired)` pairs
/// for boards where something expired.
pub async fn sweep_expired(state: &AppState, now: i64) -> Vec<(Uuid, Vec<Lock>)> {
    let mut boards = state.boards.write().await;
    boards
        .iter_mut()
        .filter_map(|(board_id, board)| {
            let expired = board.locks.sweep_expired(now);
            (!expired.is_empty()).then_some((*board_id, expired))
        })
        .collect()
}

#[cfg(test)]
#[path = "lock_test.rs"]
mod tests;
