//! Board service: CRUD, join/part, and state hydration.
//!
//! DESIGN
//! ======
//! Boards are created, listed, and deleted via Postgres (dispatched from WS
//! frames or REST). Board state is hydrated from Postgres on first join and
//! kept in memory while any client is connected.
//!
//! Parting a board is also connection cleanup: the client's locks are
//! released and its cursor cleared so peers never see orphaned state.
//!
//! ERROR HANDLING
//! ==============
//! On last-client part, dirty objects are flushed before eviction. If that
//! flush fails, the board is intentionally kept in memory with dirty flags
//! intact so the persistence worker can retry instead of losing edits.

use canvas::doc::{ObjectId, Shape, ShapeKind};
use canvas::lock::Lock;
use canvas::presence::Cursor;
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::frame::{Frame, now_ms};
use crate::state::{AppState, BoardState, ConnectedClient};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("board not found: {0}")]
    NotFound(Uuid),
    #[error("only the owner can delete board {0}")]
    Forbidden(Uuid),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl crate::frame::ErrorCode for BoardError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_BOARD_NOT_FOUND",
            Self::Forbidden(_) => "E_FORBIDDEN",
            Self::Database(_) => "E_DATABASE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

/// Row returned from board queries.
#[derive(Debug, Clone, Serialize)]
pub struct BoardRow {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardUser {
    pub client_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub color: String,
}

/// Everything a client needs to render a board it just joined.
#[derive(Debug, Clone, Serialize)]
pub struct JoinSnapshot {
    /// Shapes in draw order.
    pub objects: Vec<Shape>,
    pub users: Vec<BoardUser>,
    pub locks: Vec<Lock>,
    pub cursors: Vec<Cursor>,
}

/// Connection state dropped when a client leaves a board.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartCleanup {
    pub released_locks: Vec<ObjectId>,
    pub cursor_cleared: bool,
}

// =============================================================================
// CRUD
// =============================================================================

/// Create a new board.
///
/// # Errors
///
/// Returns a database error if the insert fails.
pub async fn create_board(pool: &PgPool, name: &str, owner_id: Option<Uuid>) -> Result<BoardRow, BoardError> {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO boards (id, name, owner_id) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(name)
        .bind(owner_id)
        .execute(pool)
        .await?;

    info!(%id, name, "board created");
    Ok(BoardRow { id, name: name.to_string(), owner_id })
}

/// List all boards, newest first.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn list_boards(pool: &PgPool) -> Result<Vec<BoardRow>, BoardError> {
    let rows = sqlx::query_as::<_, (Uuid, String, Option<Uuid>)>(
        "SELECT id, name, owner_id FROM boards ORDER BY created_at DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, name, owner_id)| BoardRow { id, name, owner_id })
        .collect())
}

/// Delete a board. Only its owner may delete it; ownerless boards are open.
/// Connected clients receive `board:deleted` and the live state is evicted.
///
/// # Errors
///
/// Returns `NotFound`, `Forbidden`, or a database error.
pub async fn delete_board(state: &AppState, board_id: Uuid, user_id: Uuid) -> Result<(), BoardError> {
    // A live board already knows its owner; refuse without a round trip.
    let live_owner = state.boards.read().await.get(&board_id).and_then(|b| b.owner_id);
    if live_owner.is_some_and(|owner| owner != user_id) {
        return Err(BoardError::Forbidden(board_id));
    }

    let owner = board_owner(&state.pool, board_id).await?;
    if owner.is_some_and(|owner| owner != user_id) {
        return Err(BoardError::Forbidden(board_id));
    }

    sqlx::query("DELETE FROM boards WHERE id = $1")
        .bind(board_id)
        .execute(&state.pool)
        .await?;

    let notice = Frame::notice(board_id, "board:deleted")
        .with_data("board_id", board_id.to_string());
    broadcast(state, board_id, &notice, None).await;

    state.boards.write().await.remove(&board_id);
    info!(%board_id, "board deleted and evicted");
    Ok(())
}

// =============================================================================
// JOIN / PART
// =============================================================================

/// Join a board. Hydrates from Postgres if not already in memory.
/// Returns the snapshot the joining client renders from.
///
/// # Errors
///
/// Returns `NotFound` if the board doesn't exist, or a database error if
/// hydration fails.
pub async fn join_board(
    state: &AppState,
    board_id: Uuid,
    client_id: Uuid,
    client: ConnectedClient,
    tx: mpsc::Sender<Frame>,
) -> Result<JoinSnapshot, BoardError> {
    // PHASE: HYDRATE OUTSIDE THE LOCK
    // WHY: a live board is authoritative; only cold boards touch Postgres,
    // and that I/O must not block other boards.
    let mut hydration: Option<(Option<Uuid>, Vec<Shape>)> = None;
    loop {
        let mut boards = state.boards.write().await;
        if !boards.contains_key(&board_id) {
            let Some((owner_id, objects)) = hydration.take() else {
                drop(boards);
                let owner_id = board_owner(&state.pool, board_id).await?;
                hydration = Some((owner_id, fetch_objects(&state.pool, board_id).await?));
                continue;
            };
            info!(%board_id, count = objects.len(), "hydrated board from database");
            let mut fresh = BoardState::new();
            fresh.owner_id = owner_id;
            fresh.objects.load_snapshot(objects);
            boards.insert(board_id, fresh);
        }
        let Some(board_state) = boards.get_mut(&board_id) else {
            continue;
        };

        board_state.clients.insert(client_id, tx);
        board_state.users.insert(client_id, client);

        let snapshot = JoinSnapshot {
            objects: board_state.objects.sorted().into_iter().cloned().collect(),
            users: users_of(board_state),
            locks: board_state.locks.snapshot(now_ms()),
            cursors: board_state.presence.list(),
        };

        info!(%board_id, %client_id, clients = board_state.clients.len(), "client joined board");
        return Ok(snapshot);
    }
}

/// Leave a board. Removes the client, releases its locks, and clears its
/// cursor. If last client, flushes pending writes and evicts the board.
pub async fn part_board(state: &AppState, board_id: Uuid, client_id: Uuid) -> PartCleanup {
    let mut boards = state.boards.write().await;
    let Some(board_state) = boards.get_mut(&board_id) else {
        return PartCleanup::default();
    };

    board_state.clients.remove(&client_id);
    board_state.users.remove(&client_id);
    let cleanup = PartCleanup {
        released_locks: board_state.locks.release_client(client_id),
        cursor_cleared: board_state.presence.clear(client_id).is_some(),
    };
    info!(%board_id, %client_id, remaining = board_state.clients.len(), released = cleanup.released_locks.len(), "client left board");

    if !board_state.clients.is_empty() {
        return cleanup;
    }

    // PHASE: HANDLE CLEAN EVICTION FAST PATH
    // WHY: avoid unnecessary I/O when the board has no pending mutations.
    if board_state.is_clean() {
        boards.remove(&board_id);
        info!(%board_id, "evicted board from memory");
        return cleanup;
    }

    // PHASE: SNAPSHOT PENDING WRITES FOR FINAL FLUSH
    // WHY: perform DB I/O outside the lock and keep dirty flags until the
    // write has actually succeeded.
    let pending = PendingWrites::snapshot(board_state);

    // Release lock before writing to Postgres.
    drop(boards);
    let flush_result = pending.flush(&state.pool).await;

    // PHASE: ACK OR RETAIN DIRTY FLAGS
    let mut boards = state.boards.write().await;
    let Some(bs) = boards.get_mut(&board_id) else {
        return cleanup;
    };
    if !bs.clients.is_empty() {
        return cleanup;
    }

    match flush_result {
        Ok(()) => {
            pending.ack(bs);
            if bs.is_clean() {
                boards.remove(&board_id);
                info!(%board_id, "evicted board from memory");
            } else {
                warn!(%board_id, remaining_dirty = bs.dirty.len(), "retaining board after final flush because newer writes exist");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, %board_id, "final flush failed; board retained for retry");
        }
    }
    cleanup
}

/// List currently connected users for a board keyed by connection.
pub async fn list_board_users(state: &AppState, board_id: Uuid) -> Vec<BoardUser> {
    let boards = state.boards.read().await;
    boards.get(&board_id).map(users_of).unwrap_or_default()
}

fn users_of(board_state: &BoardState) -> Vec<BoardUser> {
    board_state
        .users
        .iter()
        .map(|(client_id, user)| BoardUser {
            client_id: *client_id,
            user_id: user.user_id,
            name: user.name.clone(),
            color: user.color.clone(),
        })
        .collect()
}

// =============================================================================
// BROADCAST
// =============================================================================

/// Broadcast a frame to all clients in a board, optionally excluding one.
pub async fn broadcast(state: &AppState, board_id: Uuid, frame: &Frame, exclude: Option<Uuid>) {
    let boards = state.boards.read().await;
    let Some(board_state) = boards.get(&board_id) else {
        return;
    };

    for (client_id, tx) in &board_state.clients {
        if exclude == Some(*client_id) {
            continue;
        }
        // Best-effort: if a client's channel is full, skip it.
        if tx.try_send(frame.clone()).is_err() {
            warn!(%board_id, %client_id, syscall = %frame.syscall, "client channel full or closed; frame dropped");
        }
    }
}

// =============================================================================
// PENDING WRITES
// =============================================================================

/// Immutable copy of a board's unflushed writes, taken under the lock.
#[derive(Debug, Default)]
pub(crate) struct PendingWrites {
    pub(crate) upserts: Vec<Shape>,
    pub(crate) deletes: Vec<ObjectId>,
}

impl PendingWrites {
    pub(crate) fn snapshot(board_state: &BoardState) -> Self {
        Self {
            upserts: board_state
                .dirty
                .iter()
                .filter_map(|id| board_state.objects.get(id).cloned())
                .collect(),
            deletes: board_state.deleted.iter().copied().collect(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty()
    }

    pub(crate) async fn flush(&self, pool: &PgPool) -> Result<(), sqlx::Error> {
        flush_objects(pool, &self.upserts).await?;
        delete_objects(pool, &self.deletes).await
    }

    /// Clear flags for writes that reached Postgres.
    pub(crate) fn ack(&self, board_state: &mut BoardState) {
        for obj in &self.upserts {
            // EDGE: keep dirty flag if object was updated again after snapshot.
            let can_clear = board_state
                .objects
                .get(&obj.id)
                .is_none_or(|current| current.version == obj.version);
            if can_clear {
                board_state.dirty.remove(&obj.id);
            }
        }
        for id in &self.deletes {
            // EDGE: an undo may have re-created the shape after the snapshot.
            if !board_state.objects.contains(id) {
                board_state.deleted.remove(id);
            }
        }
    }
}

// =============================================================================
// STORAGE
// =============================================================================

type ObjectRow = (
    Uuid,
    Uuid,
    String,
    f64,
    f64,
    f64,
    f64,
    f64,
    i64,
    serde_json::Value,
    Option<Uuid>,
    Option<Uuid>,
    i64,
);

/// Owner of a stored board (`None` for ownerless boards).
///
/// # Errors
///
/// Returns `NotFound` when the board row is missing, or a database error.
pub async fn board_owner(pool: &PgPool, board_id: Uuid) -> Result<Option<Uuid>, BoardError> {
    sqlx::query_scalar::<_, Option<Uuid>>("SELECT owner_id FROM boards WHERE id = $1")
        .bind(board_id)
        .fetch_optional(pool)
        .await?
        .ok_or(BoardError::NotFound(board_id))
}

/// Load a board's persisted shapes.
///
/// # Errors
///
/// Returns `NotFound` when the board row is missing, or a database error.
pub async fn load_board_objects(pool: &PgPool, board_id: Uuid) -> Result<Vec<Shape>, BoardError> {
    board_owner(pool, board_id).await?;
    fetch_objects(pool, board_id).await
}

async fn fetch_objects(pool: &PgPool, board_id: Uuid) -> Result<Vec<Shape>, BoardError> {
    let rows = sqlx::query_as::<_, ObjectRow>(
        "SELECT id, board_id, kind, x, y, width, height, rotation, z_index, props, group_id, created_by, version \
         FROM board_objects WHERE board_id = $1",
    )
    .bind(board_id)
    .fetch_all(pool)
    .await?;

    let mut objects = Vec::with_capacity(rows.len());
    for (id, board_id, kind, x, y, width, height, rotation, z_index, props, group_id, created_by, version) in rows {
        let kind = match kind.parse::<ShapeKind>() {
            Ok(kind) => kind,
            Err(e) => {
                warn!(%id, %board_id, error = %e, "skipping stored object with unknown kind");
                continue;
            }
        };
        objects.push(Shape {
            id,
            board_id,
            kind,
            x,
            y,
            width,
            height,
            rotation,
            z_index,
            props,
            group_id,
            created_by,
            version,
        });
    }
    Ok(objects)
}

/// Batch upsert objects to Postgres.
///
/// # Errors
///
/// Returns the first failing statement's error.
pub async fn flush_objects(pool: &PgPool, objects: &[Shape]) -> Result<(), sqlx::Error> {
    for obj in objects {
        sqlx::query(
            "INSERT INTO board_objects (id, board_id, kind, x, y, width, height, rotation, z_index, props, group_id, created_by, version, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, now()) \
             ON CONFLICT (id) DO UPDATE SET \
                 x = EXCLUDED.x, y = EXCLUDED.y, width = EXCLUDED.width, height = EXCLUDED.height, \
                 rotation = EXCLUDED.rotation, z_index = EXCLUDED.z_index, props = EXCLUDED.props, \
                 group_id = EXCLUDED.group_id, version = EXCLUDED.version, updated_at = now()",
        )
        .bind(obj.id)
        .bind(obj.board_id)
        .bind(obj.kind.as_str())
        .bind(obj.x)
        .bind(obj.y)
        .bind(obj.width)
        .bind(obj.height)
        .bind(obj.rotation)
        .bind(obj.z_index)
        .bind(&obj.props)
        .bind(obj.group_id)
        .bind(obj.created_by)
        .bind(obj.version)
        .execute(pool)
        .await?;
    }
    Ok(())
}

/// Delete object rows by id.
///
/// # Errors
///
/// Returns a database error if the delete fails.
pub async fn delete_objects(pool: &PgPool, ids: &[ObjectId]) -> Result<(), sqlx::Error> {
    if ids.is_empty() {
        return Ok(());
    }
    sqlx::query("DELETE FROM board_objects WHERE id = ANY($1)")
        .bind(ids)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
#[path = "board_test.rs"]
mod tests;
