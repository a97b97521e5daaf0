//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! It holds the database pool and a map of live board states. Each board
//! has its own document, connected clients, lock table, cursor map, per-user
//! undo history, and dirty/deleted sets for debounced persistence.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use canvas::doc::{DocStore, ObjectId};
use canvas::history::History;
use canvas::lock::LockTable;
use canvas::presence::PresenceMap;
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::frame::Frame;

// =============================================================================
// CONNECTIONS
// =============================================================================

/// Identity attached to a websocket connection on a board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectedClient {
    pub user_id: Uuid,
    pub name: String,
    pub color: String,
}

/// Who is performing a mutation: the connection and the user behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub client_id: Uuid,
    pub user_id: Uuid,
}

// =============================================================================
// BOARD STATE
// =============================================================================

/// Per-board live state. Kept in memory for real-time performance.
/// Flushed to Postgres by the persistence task.
#[derive(Default)]
pub struct BoardState {
    /// Owner loaded at hydration; `None` means anyone may delete the board.
    pub owner_id: Option<Uuid>,
    /// Current shapes.
    pub objects: DocStore,
    /// Connected clients: `client_id` -> sender for outgoing frames.
    pub clients: HashMap<Uuid, mpsc::Sender<Frame>>,
    /// Identity of each connected client.
    pub users: HashMap<Uuid, ConnectedClient>,
    pub locks: LockTable,
    pub presence: PresenceMap,
    /// Undo/redo stacks keyed by user id.
    pub histories: HashMap<Uuid, History>,
    /// Object IDs modified since last flush.
    pub dirty: HashSet<ObjectId>,
    /// Object IDs removed since last flush.
    pub deleted: HashSet<ObjectId>,
}

impl BoardState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The user's history on this board, created on first use.
    pub fn history_mut(&mut self, user_id: Uuid, limit: usize) -> &mut History {
        self.histories
            .entry(user_id)
            .or_insert_with(|| History::new(limit))
    }

    /// Queue an upsert for the next flush.
    pub fn mark_dirty(&mut self, id: ObjectId) {
        self.deleted.remove(&id);
        self.dirty.insert(id);
    }

    /// Queue a row delete for the next flush. Also drops any lock on the shape.
    pub fn mark_deleted(&mut self, id: ObjectId) {
        self.dirty.remove(&id);
        self.deleted.insert(id);
        self.locks.forget(id);
    }

    /// Nothing left to write to Postgres.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.dirty.is_empty() && self.deleted.is_empty()
    }
}

// =============================================================================
// APP STATE
// =============================================================================

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped or Clone.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub boards: Arc<RwLock<HashMap<Uuid, BoardState>>>,
    pub sync: SyncConfig,
    /// Queue of frames for the batched frame log writer. `None` disables it.
    pub frame_persist_tx: Option<mpsc::Sender<Frame>>,
}

impl AppState {
    #[must_use]
    pub fn new(pool: PgPool, sync: SyncConfig, frame_persist_tx: Option<mpsc::Sender<Frame>>) -> Self {
        Self { pool, boards: Arc::new(RwLock::new(HashMap::new())), sync, frame_persist_tx }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
#[path = "state_helpers_test.rs"]
pub mod test_helpers;

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
