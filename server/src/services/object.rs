//! Object service: create, update, delete, drag, reorder, and grouping.
//!
//! DESIGN
//! ======
//! Object mutations update in-memory state immediately, mark the object as
//! dirty (or deleted) for debounced persistence, record an undo entry for the
//! acting user, and return the resulting shapes for broadcast.
//!
//! Two gates run before any write:
//! - Locks: a shape locked by another live connection is read-only.
//! - LWW: an update's version must be >= the current version, otherwise it was
//!   computed from stale state and is rejected.
//!
//! Every accepted write bumps the shape's version by one.

use canvas::doc::{ObjectId, PartialShape, Shape, ShapeKind, apply_partial_to};
use canvas::group::{self, GroupError};
use canvas::history::{Change, Entry};
use canvas::lock::LockConflict;
use canvas::order::{self, ReorderOp};
use uuid::Uuid;

use crate::frame::now_ms;
use crate::state::{Actor, AppState, BoardState};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    #[error("object not found: {0}")]
    NotFound(Uuid),
    #[error("object already exists: {0}")]
    AlreadyExists(Uuid),
    #[error("board not loaded: {0}")]
    BoardNotLoaded(Uuid),
    #[error("stale update: incoming version {incoming} < current {current}")]
    StaleUpdate { incoming: i64, current: i64 },
    #[error(transparent)]
    Locked(#[from] LockConflict),
    #[error("lock required to drag object {0}")]
    LockRequired(Uuid),
    #[error("invalid object: {0}")]
    Invalid(String),
    #[error(transparent)]
    Group(#[from] GroupError),
}

impl crate::frame::ErrorCode for ObjectError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_OBJECT_NOT_FOUND",
            Self::AlreadyExists(_) => "E_OBJECT_EXISTS",
            Self::BoardNotLoaded(_) => "E_BOARD_NOT_LOADED",
            Self::StaleUpdate { .. } => "E_STALE_UPDATE",
            Self::Locked(_) => "E_OBJECT_LOCKED",
            Self::LockRequired(_) => "E_LOCK_REQUIRED",
            Self::Invalid(_) => "E_INVALID_OBJECT",
            Self::Group(_) => "E_GROUP",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Locked(_) | Self::StaleUpdate { .. })
    }
}

/// Fields of a shape to create. Missing geometry falls back to defaults.
#[derive(Debug, Clone)]
pub struct NewObject {
    /// Client-chosen id so optimistic creates can be acknowledged.
    pub id: Option<Uuid>,
    pub kind: ShapeKind,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub rotation: f64,
    pub z_index: Option<i64>,
    pub props: serde_json::Value,
}

impl NewObject {
    #[must_use]
    pub fn new(kind: ShapeKind, x: f64, y: f64) -> Self {
        Self {
            id: None,
            kind,
            x,
            y,
            width: 100.0,
            height: 100.0,
            rotation: 0.0,
            z_index: None,
            props: serde_json::json!({}),
        }
    }
}

// =============================================================================
// CREATE
// =============================================================================

/// Create a new object on a board, on top of every existing shape unless a
/// z-index is given.
///
/// # Errors
///
/// Returns `BoardNotLoaded`, `AlreadyExists` for a reused id, or `Invalid`
/// when `props` is not an object.
pub async fn create_object(
    state: &AppState,
    board_id: Uuid,
    actor: Actor,
    new: NewObject,
) -> Result<Shape, ObjectError> {
    if !new.props.is_object() {
        return Err(ObjectError::Invalid("props must be an object".into()));
    }
    let mut boards = state.boards.write().await;
    let board = boards
        .get_mut(&board_id)
        .ok_or(ObjectError::BoardNotLoaded(board_id))?;

    let id = new.id.unwrap_or_else(Uuid::new_v4);
    if board.objects.contains(&id) {
        return Err(ObjectError::AlreadyExists(id));
    }

    let z_index = new
        .z_index
        .unwrap_or_else(|| board.objects.max_z_index().map_or(0, |z| z.saturating_add(1)));
    let obj = Shape {
        id,
        board_id,
        kind: new.kind,
        x: new.x,
        y: new.y,
        width: new.width,
        height: new.height,
        rotation: new.rotation,
        z_index,
        props: new.props,
        group_id: None,
        created_by: Some(actor.user_id),
        version: 1,
    };

    commit(board, actor, state.sync.history_limit, vec![Change { before: None, after: Some(obj.clone()) }]);
    Ok(obj)
}

// =============================================================================
// UPDATE
// =============================================================================

/// Update an existing object with LWW conflict resolution.
///
/// # Errors
///
/// Returns `Locked` if another connection holds the shape, `StaleUpdate` if
/// `incoming_version < current.version`, or `Invalid` for a malformed props
/// patch.
pub async fn update_object(
    state: &AppState,
    board_id: Uuid,
    actor: Actor,
    object_id: Uuid,
    partial: &PartialShape,
    incoming_version: i64,
) -> Result<Shape, ObjectError> {
    let mut boards = state.boards.write().await;
    let board = boards
        .get_mut(&board_id)
        .ok_or(ObjectError::BoardNotLoaded(board_id))?;
    let current = board
        .objects
        .get(&object_id)
        .ok_or(ObjectError::NotFound(object_id))?;

    board.locks.check_writable(object_id, actor.client_id, now_ms())?;

    // LWW: reject stale updates.
    if incoming_version < current.version {
        return Err(ObjectError::StaleUpdate { incoming: incoming_version, current: current.version });
    }

    let before = current.clone();
    let mut after = before.clone();
    let sparse = PartialShape { version: None, ..partial.clone() };
    if !apply_partial_to(&mut after, &sparse) {
        return Err(ObjectError::Invalid("props patch must be an object".into()));
    }
    after.version = before.version + 1;

    commit(board, actor, state.sync.history_limit, vec![Change { before: Some(before), after: Some(after.clone()) }]);
    Ok(after)
}

// =============================================================================
// DELETE
// =============================================================================

/// Delete an object from a board. The row is removed by the next flush.
///
/// # Errors
///
/// Returns `NotFound` if the object doesn't exist or `Locked` if another
/// connection holds it.
pub async fn delete_object(state: &AppState, board_id: Uuid, actor: Actor, object_id: Uuid) -> Result<Shape, ObjectError> {
    let mut boards = state.boards.write().await;
    let board = boards
        .get_mut(&board_id)
        .ok_or(ObjectError::BoardNotLoaded(board_id))?;
    let current = board
        .objects
        .get(&object_id)
        .cloned()
        .ok_or(ObjectError::NotFound(object_id))?;

    board.locks.check_writable(object_id, actor.client_id, now_ms())?;

    commit(board, actor, state.sync.history_limit, vec![Change { before: Some(current.clone()), after: None }]);
    Ok(current)
}

// =============================================================================
// DRAG
// =============================================================================

/// Validate an ephemeral drag preview. Nothing is written; peers just see the
/// shape follow the dragging user until the final `object:update`.
///
/// # Errors
///
/// Returns `LockRequired` unless the connection holds a live lock on the shape.
pub async fn drag_object(state: &AppState, board_id: Uuid, actor: Actor, object_id: Uuid) -> Result<(), ObjectError> {
    let boards = state.boards.read().await;
    let board = boards
        .get(&board_id)
        .ok_or(ObjectError::BoardNotLoaded(board_id))?;
    if !board.objects.contains(&object_id) {
        return Err(ObjectError::NotFound(object_id));
    }

    let now = now_ms();
    let holds_lock = board
        .locks
        .get(&object_id)
        .is_some_and(|lock| lock.held_by(actor.client_id) && !lock.is_expired(now));
    if !holds_lock {
        return Err(ObjectError::LockRequired(object_id));
    }
    Ok(())
}

// =============================================================================
// REORDER
// =============================================================================

/// Change stacking order. Returns only the shapes whose z-index changed.
///
/// # Errors
///
/// Returns `Locked` if any affected shape is held by another connection.
pub async fn reorder_objects(
    state: &AppState,
    board_id: Uuid,
    actor: Actor,
    ids: &[ObjectId],
    op: ReorderOp,
) -> Result<Vec<Shape>, ObjectError> {
    let mut boards = state.boards.write().await;
    let board = boards
        .get_mut(&board_id)
        .ok_or(ObjectError::BoardNotLoaded(board_id))?;

    let moves = order::reorder(&board.objects, ids, op);
    let changes = rewrite(board, actor, moves.iter().map(|(id, _)| *id), |shape| {
        if let Some((_, z)) = moves.iter().find(|(id, _)| *id == shape.id) {
            shape.z_index = *z;
        }
    })?;

    let updated = changes.iter().filter_map(|c| c.after.clone()).collect();
    commit(board, actor, state.sync.history_limit, changes);
    Ok(updated)
}

// =============================================================================
// GROUPING
// =============================================================================

/// Group shapes (and whole groups they belong to) under a fresh group id.
///
/// # Errors
///
/// Returns `Group` for fewer than two shapes or unknown ids, `Locked` if a
/// member is held by another connection.
pub async fn group_objects(
    state: &AppState,
    board_id: Uuid,
    actor: Actor,
    ids: &[ObjectId],
) -> Result<(Uuid, Vec<Shape>), ObjectError> {
    let mut boards = state.boards.write().await;
    let board = boards
        .get_mut(&board_id)
        .ok_or(ObjectError::BoardNotLoaded(board_id))?;

    let (group_id, members) = group::group(&board.objects, ids)?;
    let changes = rewrite(board, actor, members.iter().copied(), |shape| shape.group_id = Some(group_id))?;

    let updated = changes.iter().filter_map(|c| c.after.clone()).collect();
    commit(board, actor, state.sync.history_limit, changes);
    Ok((group_id, updated))
}

/// Dissolve a group. Members keep their geometry.
///
/// # Errors
///
/// Returns `Group` for an unknown group id, `Locked` if a member is held by
/// another connection.
pub async fn ungroup_objects(
    state: &AppState,
    board_id: Uuid,
    actor: Actor,
    group_id: Uuid,
) -> Result<Vec<Shape>, ObjectError> {
    let mut boards = state.boards.write().await;
    let board = boards
        .get_mut(&board_id)
        .ok_or(ObjectError::BoardNotLoaded(board_id))?;

    let members = group::ungroup(&board.objects, group_id)?;
    let changes = rewrite(board, actor, members.iter().copied(), |shape| shape.group_id = None)?;

    let updated = changes.iter().filter_map(|c| c.after.clone()).collect();
    commit(board, actor, state.sync.history_limit, changes);
    Ok(updated)
}

// =============================================================================
// HELPERS
// =============================================================================

/// Compute version-bumped rewrites of `ids` after checking every lock first,
/// so a multi-shape edit is all-or-nothing.
fn rewrite(
    board: &BoardState,
    actor: Actor,
    ids: impl Iterator<Item = ObjectId>,
    edit: impl Fn(&mut Shape),
) -> Result<Vec<Change>, ObjectError> {
    let now = now_ms();
    let targets: Vec<&Shape> = ids.filter_map(|id| board.objects.get(&id)).collect();
    for shape in &targets {
        board.locks.check_writable(shape.id, actor.client_id, now)?;
    }
    Ok(targets
        .into_iter()
        .map(|before| {
            let mut after = before.clone();
            edit(&mut after);
            after.version = before.version + 1;
            Change { before: Some(before.clone()), after: Some(after) }
        })
        .collect())
}

/// Apply changes to the live board, queue persistence, and record history.
fn commit(board: &mut BoardState, actor: Actor, history_limit: usize, changes: Vec<Change>) {
    for change in &changes {
        match (&change.after, change.object_id()) {
            (Some(after), _) => {
                board.objects.insert(after.clone());
                board.mark_dirty(after.id);
            }
            (None, Some(id)) => {
                board.objects.remove(&id);
                board.mark_deleted(id);
            }
            (None, None) => {}
        }
    }
    board
        .history_mut(actor.user_id, history_limit)
        .record(Entry::new(changes));
}

#[cfg(test)]
#[path = "object_test.rs"]
mod tests;
